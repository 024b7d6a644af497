#![allow(clippy::all)]

use tagbits::{Result, TagError, TagOptions, TagStore, TargetId};

fn seeded_store() -> Result<TagStore> {
    let mut store = TagStore::open_in_memory(TagOptions::default().cell_count(2))?;
    for name in ["a", "b", "c"] {
        store.register_tag("order", name)?;
    }
    Ok(store)
}

fn names_of(store: &TagStore, id: u64) -> Result<Vec<String>> {
    let mut session = store.session();
    Ok(store.tags_of(&mut session, "order", TargetId(id))?.names)
}

#[test]
fn add_is_idempotent() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a"])?;
    let once = store.get_record("order", TargetId(1))?;
    store.add_tags("order", TargetId(1), &["a"])?;
    let twice = store.get_record("order", TargetId(1))?;
    assert_eq!(once, twice);
    Ok(())
}

#[test]
fn add_merges_with_existing_bits() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a"])?;
    store.add_tags("order", TargetId(1), &["c", "c"])?;
    assert_eq!(names_of(&store, 1)?, vec!["a", "c"]);
    Ok(())
}

#[test]
fn remove_of_unset_tag_is_a_noop() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a"])?;
    let before = store.get_record("order", TargetId(1))?;
    store.remove_tags("order", TargetId(1), &["b"])?;
    assert_eq!(store.get_record("order", TargetId(1))?, before);

    // absent record stays absent
    store.remove_tags("order", TargetId(9), &["a"])?;
    assert!(matches!(
        store.get_record("order", TargetId(9)),
        Err(TagError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn remove_clears_only_named_bits() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a", "b", "c"])?;
    store.remove_tags("order", TargetId(1), &["b"])?;
    assert_eq!(names_of(&store, 1)?, vec!["a", "c"]);
    Ok(())
}

#[test]
fn set_replaces_instead_of_merging() -> Result<()> {
    let mut store = seeded_store()?;
    store.set_tags_for_targets("order", &[TargetId(5)], &["a"])?;
    store.set_tags_for_targets("order", &[TargetId(5)], &["b"])?;
    assert_eq!(names_of(&store, 5)?, vec!["b"]);
    Ok(())
}

#[test]
fn set_writes_every_target_once() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(2), &["c"])?;
    let written =
        store.set_tags_for_targets("order", &[TargetId(1), TargetId(2), TargetId(1)], &["a", "b"])?;
    assert_eq!(written, 2);
    assert_eq!(names_of(&store, 1)?, vec!["a", "b"]);
    assert_eq!(names_of(&store, 2)?, vec!["a", "b"]);
    Ok(())
}

#[test]
fn set_with_no_names_empties_the_targets() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a"])?;
    let none: [&str; 0] = [];
    store.set_tags_for_targets("order", &[TargetId(1)], &none)?;
    assert!(store.get_record("order", TargetId(1))?.is_clear());
    Ok(())
}

#[test]
fn unknown_name_fails_before_any_write() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a"])?;
    let err = store.add_tags("order", TargetId(1), &["b", "zzz"]).unwrap_err();
    match err {
        TagError::InvalidName(msg) => assert!(msg.contains("zzz")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(names_of(&store, 1)?, vec!["a"]);

    assert!(store.add_tags("order", TargetId(2), &["zzz"]).is_err());
    assert!(matches!(
        store.get_record("order", TargetId(2)),
        Err(TagError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn clear_zeroes_existing_records_only() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a", "b"])?;
    store.add_tags("order", TargetId(2), &["c"])?;
    let cleared = store.clear_tags_for_targets("order", &[TargetId(1), TargetId(3)])?;
    assert_eq!(cleared, 1);
    assert!(store.get_record("order", TargetId(1))?.is_clear());
    assert_eq!(names_of(&store, 2)?, vec!["c"]);
    assert!(matches!(
        store.get_record("order", TargetId(3)),
        Err(TagError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn purge_removes_the_record() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a"])?;
    assert!(store.purge_record("order", TargetId(1))?);
    assert!(!store.purge_record("order", TargetId(1))?);
    assert!(names_of(&store, 1)?.is_empty());
    Ok(())
}

#[test]
fn delete_clears_the_tag_from_every_record() -> Result<()> {
    let mut store = seeded_store()?;
    store.set_tags_for_targets("order", &[TargetId(1), TargetId(2)], &["a", "b"])?;
    store.delete_tag("order", "a")?;
    for id in [1, 2] {
        assert_eq!(names_of(&store, id)?, vec!["b"]);
    }
    assert!(store.tag_ids_by_names("order", &["a"])?.is_empty());
    Ok(())
}

#[test]
fn batches_beyond_the_bind_limit_split_transparently() -> Result<()> {
    const TARGETS: u64 = 40_000;
    let mut store = seeded_store()?;
    let ids: Vec<TargetId> = (1..=TARGETS).map(TargetId).collect();

    assert_eq!(store.set_tags_for_targets("order", &ids, &["a", "c"])?, ids.len());

    let mut session = store.session();
    let decoded = store.tags_of_many(&mut session, "order", &ids)?;
    assert_eq!(decoded.len(), ids.len());
    assert_eq!(decoded.first().map(|(id, _)| *id), Some(TargetId(1)));
    assert_eq!(decoded.last().map(|(id, _)| *id), Some(TargetId(TARGETS)));
    assert!(decoded.iter().all(|(_, tags)| tags.names == ["a", "c"]));

    let mut with_duplicates = ids.clone();
    with_duplicates.extend_from_slice(&ids[..10]);
    assert_eq!(
        store.clear_tags_for_targets("order", &with_duplicates)?,
        ids.len()
    );
    assert!(store.get_record("order", TargetId(TARGETS))?.is_clear());

    let unknown: Vec<String> = (0..40_000).map(|i| format!("missing{i}")).collect();
    assert!(store.tag_ids_by_names("order", &unknown)?.is_empty());
    Ok(())
}

#[test]
fn oversized_batch_with_a_bad_id_leaves_no_trace() -> Result<()> {
    let mut store = seeded_store()?;
    store.add_tags("order", TargetId(1), &["a"])?;
    let mut ids: Vec<TargetId> = (1..=40_000).map(TargetId).collect();
    ids.push(TargetId(u64::MAX));
    assert!(matches!(
        store.clear_tags_for_targets("order", &ids),
        Err(TagError::Invalid(_))
    ));
    assert_eq!(names_of(&store, 1)?, vec!["a"]);
    Ok(())
}
