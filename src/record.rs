#![forbid(unsafe_code)]

//! Bitmap record rows.
//!
//! Record-level CRUD plus the raw cell-update primitives the mutation engine
//! builds on. No tag semantics live here.

use std::fmt::Write as _;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::trace;

use crate::context::TagContext;
use crate::error::{Result, TagError};
use crate::schema::{placeholders, BIND_CHUNK};
use crate::types::{
    word_from_sql, word_to_sql, BitmapRecord, CellMasks, CellWord, Slot, TargetId, CELL_COLUMNS,
    MAX_CELLS,
};

fn cell_list() -> String {
    CELL_COLUMNS.join(", ")
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<(String, i64, [i64; MAX_CELLS])> {
    let mut cells = [0i64; MAX_CELLS];
    for (index, cell) in cells.iter_mut().enumerate() {
        *cell = row.get(index + 2)?;
    }
    Ok((row.get(0)?, row.get(1)?, cells))
}

fn into_record(raw: (String, i64, [i64; MAX_CELLS])) -> Result<BitmapRecord> {
    let (target_type, target_id, cells) = raw;
    Ok(BitmapRecord {
        target_type,
        target_id: TargetId::from_sql(target_id)?,
        cells: cells.map(word_from_sql),
    })
}

/// Loads a record, failing with `NotFound` when the target was never tagged.
pub fn get_record(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
) -> Result<BitmapRecord> {
    find_record(conn, ctx, target_type, target_id)?.ok_or(TagError::NotFound("bitmap record"))
}

/// Loads a record if present.
pub fn find_record(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
) -> Result<Option<BitmapRecord>> {
    let sql = format!(
        "SELECT target_type, target_id, {} FROM {} WHERE target_type = ?1 AND target_id = ?2",
        cell_list(),
        ctx.schema().bitmaps()
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.query_row(params![target_type, target_id.to_sql()?], read_record)
        .optional()?
        .map(into_record)
        .transpose()
}

/// Loads the records of several targets, in ascending target order. Targets
/// without a record are skipped, duplicates collapse.
pub fn find_records(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_ids: &[TargetId],
) -> Result<Vec<BitmapRecord>> {
    let ids = distinct_targets(target_ids);
    let mut out = Vec::new();
    for chunk in ids.chunks(BIND_CHUNK) {
        let (placeholders, bind) = target_binding(target_type, chunk)?;
        let sql = format!(
            "SELECT target_type, target_id, {} FROM {} \
             WHERE target_type = ?1 AND target_id IN ({placeholders}) ORDER BY target_id",
            cell_list(),
            ctx.schema().bitmaps()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), read_record)?;
        for row in rows {
            out.push(into_record(row?)?);
        }
    }
    Ok(out)
}

/// Inserts an all-zero record unless one exists, and returns the stored row.
pub fn create_record(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
) -> Result<BitmapRecord> {
    let sql = format!(
        "INSERT INTO {} (target_type, target_id) VALUES (?1, ?2) \
         ON CONFLICT (target_type, target_id) DO NOTHING",
        ctx.schema().bitmaps()
    );
    let inserted = conn.execute(&sql, params![target_type, target_id.to_sql()?])?;
    if inserted > 0 {
        trace!(target_type, target_id = target_id.0, "tags.record.create");
    }
    get_record(conn, ctx, target_type, target_id)
}

/// `cell = cell | mask` for every nonzero cell of `masks`. Returns the number
/// of rows touched (0 when the record is absent).
pub fn or_cells(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
    masks: &CellMasks,
) -> Result<usize> {
    update_cells(conn, ctx, target_type, target_id, masks, "|")
}

/// `cell = cell & ~mask` for every nonzero cell of `masks`.
pub fn and_not_cells(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
    masks: &CellMasks,
) -> Result<usize> {
    update_cells(conn, ctx, target_type, target_id, masks, "& ~")
}

fn update_cells(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
    masks: &CellMasks,
    op: &str,
) -> Result<usize> {
    if masks.is_empty() {
        return Ok(0);
    }
    let mut assignments = String::new();
    let mut bind: Vec<Value> = vec![
        Value::Text(target_type.to_string()),
        Value::Integer(target_id.to_sql()?),
    ];
    for (index, mask) in masks.nonzero() {
        if !assignments.is_empty() {
            assignments.push_str(", ");
        }
        let column = CELL_COLUMNS[index];
        let _ = write!(assignments, "{column} = {column} {op} ?{}", bind.len() + 1);
        bind.push(Value::Integer(word_to_sql(mask)));
    }
    let sql = format!(
        "UPDATE {} SET {assignments} WHERE target_type = ?1 AND target_id = ?2",
        ctx.schema().bitmaps()
    );
    Ok(conn.execute(&sql, params_from_iter(bind))?)
}

/// Writes `cells` as the complete state of the record, creating it if absent.
pub fn overwrite_cells(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
    cells: &[CellWord; MAX_CELLS],
) -> Result<()> {
    let columns = cell_list();
    let values = (0..MAX_CELLS)
        .map(|i| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = CELL_COLUMNS
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} (target_type, target_id, {columns}) VALUES (?1, ?2, {values}) \
         ON CONFLICT (target_type, target_id) DO UPDATE SET {updates}",
        ctx.schema().bitmaps()
    );
    let mut bind: Vec<Value> = Vec::with_capacity(MAX_CELLS + 2);
    bind.push(Value::Text(target_type.to_string()));
    bind.push(Value::Integer(target_id.to_sql()?));
    bind.extend(cells.iter().map(|word| Value::Integer(word_to_sql(*word))));
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.execute(params_from_iter(bind))?;
    Ok(())
}

/// Zeroes every cell of the listed targets. Targets without a record stay
/// without one. Long lists run as several statements in the caller's
/// transaction.
pub fn zero_cells(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_ids: &[TargetId],
) -> Result<usize> {
    let zeroes = CELL_COLUMNS
        .iter()
        .map(|column| format!("{column} = 0"))
        .collect::<Vec<_>>()
        .join(", ");
    let ids = distinct_targets(target_ids);
    let mut cleared = 0;
    for chunk in ids.chunks(BIND_CHUNK) {
        let (placeholders, bind) = target_binding(target_type, chunk)?;
        let sql = format!(
            "UPDATE {} SET {zeroes} WHERE target_type = ?1 AND target_id IN ({placeholders})",
            ctx.schema().bitmaps()
        );
        cleared += conn.execute(&sql, params_from_iter(bind))?;
    }
    Ok(cleared)
}

/// Clears one slot across every record of `target_type`.
pub fn clear_slot(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    slot: Slot,
) -> Result<usize> {
    let column = slot.column();
    let sql = format!(
        "UPDATE {} SET {column} = {column} & ~?1 WHERE target_type = ?2 AND ({column} & ?1) <> 0",
        ctx.schema().bitmaps()
    );
    Ok(conn.execute(&sql, params![word_to_sql(slot.mask()), target_type])?)
}

/// Deletes a record, e.g. when its target is deleted. Returns whether a row
/// existed.
pub fn purge_record(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    target_id: TargetId,
) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE target_type = ?1 AND target_id = ?2",
        ctx.schema().bitmaps()
    );
    let removed = conn.execute(&sql, params![target_type, target_id.to_sql()?])?;
    Ok(removed > 0)
}

/// `?2, ?3, ...` placeholders for `target_ids`, with `target_type` bound as `?1`.
fn target_binding(target_type: &str, target_ids: &[TargetId]) -> Result<(String, Vec<Value>)> {
    let mut bind = Vec::with_capacity(target_ids.len() + 1);
    bind.push(Value::Text(target_type.to_string()));
    for id in target_ids {
        bind.push(Value::Integer(id.to_sql()?));
    }
    Ok((placeholders(2, target_ids.len()), bind))
}

/// Sorted, deduplicated copy, so chunks never overlap.
fn distinct_targets(target_ids: &[TargetId]) -> Vec<TargetId> {
    let mut ids = target_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
