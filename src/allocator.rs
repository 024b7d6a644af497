#![forbid(unsafe_code)]

//! Tag registration and slot allocation.
//!
//! Functions here take any `&Connection`, including a `Transaction`, and
//! expect to run inside one. Allocation reads the used slots and inserts the
//! new definition; callers must hold the write lock for the whole span
//! (`BEGIN IMMEDIATE`, as [`TagStore`](crate::store::TagStore) does) so two
//! registrations cannot pick the same slot. The unique slot index rejects the
//! second insert if they ever do.

use rustc_hash::FxHashSet;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, trace};

use crate::context::TagContext;
use crate::error::{Result, TagError};
use crate::record;
use crate::schema::{placeholders, validate_tag_name, validate_target_type, BIND_CHUNK};
use crate::types::{CellMasks, Slot, TagDefinition, TagId, BITS_PER_CELL};

type RawDefinition = (i64, String, String, i64, i64);

fn raw_definition(row: &Row<'_>) -> rusqlite::Result<RawDefinition> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_definition(raw: RawDefinition) -> Result<TagDefinition> {
    let (id, target_type, name, cell, bit) = raw;
    Ok(TagDefinition {
        id: TagId::from_sql(id)?,
        target_type,
        name,
        slot: Slot::from_sql(cell, bit)?,
    })
}

/// Registers `name` in the first free slot of `target_type`.
pub fn register_tag(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    name: &str,
) -> Result<TagDefinition> {
    validate_target_type(target_type)?;
    validate_tag_name(name)?;
    if find_definition(conn, ctx, target_type, name)?.is_some() {
        return Err(TagError::already_exists(target_type, name));
    }

    let used: CellMasks = definitions(conn, ctx, target_type)?
        .into_iter()
        .map(|def| def.slot)
        .collect();
    let slot = first_free_slot(&used, ctx.cell_count()).ok_or_else(|| TagError::NoCapacity {
        target_type: target_type.to_string(),
        capacity: ctx.capacity(),
    })?;

    let sql = format!(
        "INSERT INTO {} (target_type, name, cell, bit) VALUES (?1, ?2, ?3, ?4)",
        ctx.schema().definitions()
    );
    conn.execute(&sql, params![target_type, name, slot.cell(), slot.bit()])?;
    let id = TagId::from_sql(conn.last_insert_rowid())?;
    // TagStore bumps again after commit; keep both.
    ctx.definitions_changed(target_type);
    debug!(target_type, name, cell = slot.cell(), bit = slot.bit(), "tags.register");
    Ok(TagDefinition {
        id,
        target_type: target_type.to_string(),
        name: name.to_string(),
        slot,
    })
}

/// First-fit scan: lowest cell first, lowest bit within the cell.
pub fn first_free_slot(used: &CellMasks, cell_count: u8) -> Option<Slot> {
    (0..cell_count as usize).find_map(|index| {
        let free = !used.word(index);
        if free == 0 {
            return None;
        }
        let bit = free.trailing_zeros() as u8 + 1;
        debug_assert!(bit <= BITS_PER_CELL);
        Slot::new(index as u8 + 1, bit)
    })
}

/// Clears the tag's bit from every record of `target_type`, then removes the
/// definition. Returns the removed definition.
///
/// Both statements must share one transaction: the slot becomes reusable the
/// moment the definition row is gone.
pub fn delete_tag(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    name: &str,
) -> Result<TagDefinition> {
    let def = find_definition(conn, ctx, target_type, name)?
        .ok_or(TagError::NotFound("tag definition"))?;
    let cleared = record::clear_slot(conn, ctx, target_type, def.slot)?;
    let sql = format!("DELETE FROM {} WHERE id = ?1", ctx.schema().definitions());
    conn.execute(&sql, params![def.id.to_sql()?])?;
    ctx.definitions_changed(target_type);
    debug!(
        target_type,
        name,
        cell = def.slot.cell(),
        bit = def.slot.bit(),
        records = cleared,
        "tags.delete"
    );
    Ok(def)
}

/// Renames a tag in place. The slot, and therefore every record, is untouched.
pub fn rename_tag(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    old_name: &str,
    new_name: &str,
) -> Result<TagDefinition> {
    validate_tag_name(new_name)?;
    let mut def = find_definition(conn, ctx, target_type, old_name)?
        .ok_or(TagError::NotFound("tag definition"))?;
    if old_name == new_name {
        return Ok(def);
    }
    if find_definition(conn, ctx, target_type, new_name)?.is_some() {
        return Err(TagError::already_exists(target_type, new_name));
    }
    let sql = format!("UPDATE {} SET name = ?1 WHERE id = ?2", ctx.schema().definitions());
    conn.execute(&sql, params![new_name, def.id.to_sql()?])?;
    ctx.definitions_changed(target_type);
    debug!(target_type, old_name, new_name, "tags.rename");
    def.name = new_name.to_string();
    Ok(def)
}

/// Looks up one definition by name.
pub fn find_definition(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    name: &str,
) -> Result<Option<TagDefinition>> {
    let sql = format!(
        "SELECT id, target_type, name, cell, bit FROM {} WHERE target_type = ?1 AND name = ?2",
        ctx.schema().definitions()
    );
    conn.query_row(&sql, params![target_type, name], raw_definition)
        .optional()?
        .map(into_definition)
        .transpose()
}

/// Every definition of `target_type`, by cell and then registration order.
pub fn definitions(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
) -> Result<Vec<TagDefinition>> {
    let sql = format!(
        "SELECT id, target_type, name, cell, bit FROM {} WHERE target_type = ?1 ORDER BY cell, id",
        ctx.schema().definitions()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params![target_type], raw_definition)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(into_definition(row?)?);
    }
    trace!(target_type, count = out.len(), "tags.definitions.scan");
    Ok(out)
}

/// Outcome of resolving a list of names.
#[derive(Clone, Debug, Default)]
pub struct Resolved {
    /// Definitions found, in slot order, without duplicates.
    pub found: Vec<TagDefinition>,
    /// Requested names with no definition, in request order.
    pub missing: Vec<String>,
}

/// Resolves names to definitions, one query per [`BIND_CHUNK`] names.
/// Duplicate names collapse.
pub fn resolve_names<S: AsRef<str>>(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    names: &[S],
) -> Result<Resolved> {
    let mut seen = FxHashSet::default();
    let mut requested: Vec<&str> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        if seen.insert(name) {
            requested.push(name);
        }
    }

    let mut found = Vec::with_capacity(requested.len());
    for chunk in requested.chunks(BIND_CHUNK) {
        let sql = format!(
            "SELECT id, target_type, name, cell, bit FROM {} \
             WHERE target_type = ?1 AND name IN ({})",
            ctx.schema().definitions(),
            placeholders(2, chunk.len())
        );
        let mut bind: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
        bind.push(Value::Text(target_type.to_string()));
        bind.extend(chunk.iter().map(|name| Value::Text(name.to_string())));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), raw_definition)?;
        for row in rows {
            found.push(into_definition(row?)?);
        }
    }
    found.sort_by_key(|def| def.slot);

    let known: FxHashSet<&str> = found.iter().map(|def| def.name.as_str()).collect();
    let missing = requested
        .iter()
        .filter(|name| !known.contains(**name))
        .map(|name| name.to_string())
        .collect();
    Ok(Resolved { found, missing })
}
