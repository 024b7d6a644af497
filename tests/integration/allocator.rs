#![allow(clippy::all)]

use std::collections::HashSet;

use tagbits::{Result, Slot, TagError, TagOptions, TagStore, TargetId};

fn store_with_cells(cells: u8) -> Result<TagStore> {
    TagStore::open_in_memory(TagOptions::default().cell_count(cells))
}

#[test]
fn first_fit_follows_the_order_scenario() -> Result<()> {
    let mut store = store_with_cells(2)?;
    let vip = store.register_tag("order", "vip")?;
    let urgent = store.register_tag("order", "urgent")?;
    assert_eq!(vip.slot, Slot::new(1, 1).unwrap());
    assert_eq!(urgent.slot, Slot::new(1, 2).unwrap());

    store.add_tags("order", TargetId(7), &["vip", "urgent"])?;
    let record = store.get_record("order", TargetId(7))?;
    assert_eq!(record.cells[0], 0b11);
    assert!(record.cells[1..].iter().all(|cell| *cell == 0));
    Ok(())
}

#[test]
fn slots_are_scoped_per_target_type() -> Result<()> {
    let mut store = store_with_cells(2)?;
    let order = store.register_tag("order", "vip")?;
    let product = store.register_tag("product", "vip")?;
    assert_eq!(order.slot, product.slot);
    assert_ne!(order.id, product.id);
    Ok(())
}

#[test]
fn duplicate_name_is_rejected() -> Result<()> {
    let mut store = store_with_cells(1)?;
    store.register_tag("order", "vip")?;
    let err = store.register_tag("order", "vip").unwrap_err();
    assert!(matches!(err, TagError::AlreadyExists { ref name, .. } if name == "vip"));
    assert_eq!(store.list_tags("order")?.len(), 1);
    Ok(())
}

#[test]
fn capacity_is_cell_count_times_width() -> Result<()> {
    let mut store = store_with_cells(1)?;
    let mut seen = HashSet::new();
    for i in 0..64 {
        let def = store.register_tag("order", &format!("t{i}"))?;
        assert!(seen.insert(def.slot), "slot {} handed out twice", def.slot);
    }
    let err = store.register_tag("order", "overflow").unwrap_err();
    assert!(matches!(
        err,
        TagError::NoCapacity { capacity: 64, .. }
    ));

    // a different namespace still has room
    store.register_tag("product", "t0")?;
    Ok(())
}

#[test]
fn allocation_spills_into_the_next_cell() -> Result<()> {
    let mut store = store_with_cells(2)?;
    for i in 0..64 {
        store.register_tag("order", &format!("t{i}"))?;
    }
    let spill = store.register_tag("order", "spill")?;
    assert_eq!(spill.slot, Slot::new(2, 1).unwrap());
    Ok(())
}

#[test]
fn deleted_slot_is_reused_without_touching_other_records() -> Result<()> {
    let mut store = store_with_cells(1)?;
    store.register_tag("order", "vip")?;
    store.register_tag("order", "urgent")?;
    store.add_tags("order", TargetId(1), &["vip", "urgent"])?;
    store.add_tags("order", TargetId(2), &["urgent"])?;

    let deleted = store.delete_tag("order", "vip")?;
    assert_eq!(store.get_record("order", TargetId(1))?.cells[0], 0b10);

    let fresh = store.register_tag("order", "fresh")?;
    assert_eq!(fresh.slot, deleted.slot);

    let mut session = store.session();
    assert_eq!(
        store.tags_of(&mut session, "order", TargetId(1))?.names,
        vec!["urgent"]
    );
    assert_eq!(
        store.tags_of(&mut session, "order", TargetId(2))?.names,
        vec!["urgent"]
    );
    Ok(())
}

#[test]
fn delete_of_unknown_tag_is_not_found() -> Result<()> {
    let mut store = store_with_cells(1)?;
    let err = store.delete_tag("order", "ghost").unwrap_err();
    assert!(matches!(err, TagError::NotFound(_)));
    Ok(())
}

#[test]
fn rename_keeps_bits_and_rejects_collisions() -> Result<()> {
    let mut store = store_with_cells(1)?;
    let vip = store.register_tag("order", "vip")?;
    store.register_tag("order", "urgent")?;
    store.add_tags("order", TargetId(3), &["vip"])?;

    let err = store.rename_tag("order", "vip", "urgent").unwrap_err();
    assert!(matches!(err, TagError::AlreadyExists { .. }));

    let gold = store.rename_tag("order", "vip", "gold")?;
    assert_eq!(gold.slot, vip.slot);
    assert_eq!(gold.id, vip.id);
    assert!(store.find_tag("order", "vip")?.is_none());

    let mut session = store.session();
    assert_eq!(
        store.tags_of(&mut session, "order", TargetId(3))?.names,
        vec!["gold"]
    );
    Ok(())
}

#[test]
fn list_reports_usage_counts() -> Result<()> {
    let mut store = store_with_cells(1)?;
    store.register_tag("order", "vip")?;
    store.register_tag("order", "urgent")?;
    store.set_tags_for_targets("order", &[TargetId(1), TargetId(2)], &["vip"])?;
    store.add_tags("order", TargetId(2), &["urgent"])?;

    let usage: Vec<_> = store
        .list_tags("order")?
        .into_iter()
        .map(|u| (u.definition.name, u.usage_count))
        .collect();
    assert_eq!(
        usage,
        vec![("vip".to_string(), 2), ("urgent".to_string(), 1)]
    );
    Ok(())
}

#[test]
fn malformed_names_are_rejected() -> Result<()> {
    let mut store = store_with_cells(1)?;
    assert!(matches!(
        store.register_tag("order", "   "),
        Err(TagError::InvalidName(_))
    ));
    assert!(matches!(
        store.register_tag("order", &"x".repeat(65)),
        Err(TagError::InvalidName(_))
    ));
    assert!(matches!(
        store.register_tag(&"t".repeat(21), "vip"),
        Err(TagError::Invalid(_))
    ));
    Ok(())
}

#[test]
fn decode_follows_registration_order_after_slot_reuse() -> Result<()> {
    let mut store = store_with_cells(1)?;
    store.register_tag("order", "a")?;
    let b = store.register_tag("order", "b")?;
    store.delete_tag("order", "a")?;
    let c = store.register_tag("order", "c")?;
    assert_eq!(c.slot, Slot::new(1, 1).unwrap());
    assert!(c.slot < b.slot);

    store.add_tags("order", TargetId(1), &["b", "c"])?;
    let mut session = store.session();
    let decoded = store.tags_of(&mut session, "order", TargetId(1))?;
    assert_eq!(decoded.names, vec!["b", "c"]);
    assert_eq!(decoded.ids, vec![b.id, c.id]);

    // listing stays in slot order
    let listed: Vec<_> = store
        .list_tags("order")?
        .into_iter()
        .map(|u| u.definition.name)
        .collect();
    assert_eq!(listed, vec!["c", "b"]);
    Ok(())
}
