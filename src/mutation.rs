#![forbid(unsafe_code)]

//! Tag assignment.
//!
//! Two write modes share the record primitives:
//!
//! * incremental ([`add_tags`], [`remove_tags`]) touches only the bits of the
//!   named tags on one target, one `UPDATE` covering every affected cell;
//! * full replace ([`set_tags_for_targets`]) writes a complete cell pattern
//!   over each listed target, discarding whatever was set before.
//!
//! Name resolution happens before the first write, so an unregistered name
//! fails the call without touching any row. Callers run each function inside
//! one transaction; an error anywhere leaves the transaction to roll back.

use rustc_hash::FxHashSet;
use rusqlite::Connection;
use tracing::{debug, trace};

use crate::allocator;
use crate::context::TagContext;
use crate::error::{Result, TagError};
use crate::record;
use crate::types::{CellMasks, TargetId};

/// Resolves every name to its slot, failing with `InvalidName` if any is not
/// registered.
pub fn resolve_masks<S: AsRef<str>>(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    names: &[S],
) -> Result<CellMasks> {
    let resolved = allocator::resolve_names(conn, ctx, target_type, names)?;
    if !resolved.missing.is_empty() {
        return Err(TagError::unregistered(target_type, &resolved.missing));
    }
    Ok(resolved.found.into_iter().map(|def| def.slot).collect())
}

/// Sets the named tags on one target, creating its record when needed.
pub fn add_tags<S: AsRef<str>>(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
    names: &[S],
) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }
    let masks = resolve_masks(conn, ctx, target_type, names)?;
    record::create_record(conn, ctx, target_type, target_id)?;
    record::or_cells(conn, ctx, target_type, target_id, &masks)?;
    trace!(
        target_type,
        target_id = target_id.0,
        tags = names.len(),
        "tags.add"
    );
    Ok(())
}

/// Clears the named tags on one target. Unset bits and absent records are
/// left alone.
pub fn remove_tags<S: AsRef<str>>(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
    names: &[S],
) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }
    let masks = resolve_masks(conn, ctx, target_type, names)?;
    let touched = record::and_not_cells(conn, ctx, target_type, target_id, &masks)?;
    trace!(
        target_type,
        target_id = target_id.0,
        tags = names.len(),
        touched,
        "tags.remove"
    );
    Ok(())
}

/// Replaces the tag set of every listed target with exactly `names`.
///
/// This is not a merge: tags absent from `names` are cleared, including ones
/// set concurrently through [`add_tags`]. Returns the number of targets
/// written.
pub fn set_tags_for_targets<S: AsRef<str>>(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_ids: &[TargetId],
    names: &[S],
) -> Result<usize> {
    if target_ids.is_empty() {
        return Ok(0);
    }
    let pattern = resolve_masks(conn, ctx, target_type, names)?;
    let mut seen = FxHashSet::default();
    let mut written = 0;
    for target_id in target_ids {
        if !seen.insert(*target_id) {
            continue;
        }
        record::overwrite_cells(conn, ctx, target_type, *target_id, pattern.words())?;
        written += 1;
    }
    debug!(target_type, targets = written, tags = names.len(), "tags.set");
    Ok(written)
}

/// Zeroes every cell of the listed targets. Returns the number of records
/// cleared.
pub fn clear_tags_for_targets(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_ids: &[TargetId],
) -> Result<usize> {
    let cleared = record::zero_cells(conn, ctx, target_type, target_ids)?;
    debug!(target_type, targets = target_ids.len(), cleared, "tags.clear");
    Ok(cleared)
}
