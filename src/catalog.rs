#![forbid(unsafe_code)]

//! Read-side queries over definitions and records.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use tracing::trace;

use crate::allocator;
use crate::context::TagContext;
use crate::error::Result;
use crate::predicate::{self, TagFilter, BITMAP_ALIAS};
use crate::schema::{placeholders, BIND_CHUNK};
use crate::types::{word_to_sql, Slot, TagDefinition, TagId, TargetId};

/// A definition and the number of records carrying it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    /// The registered tag.
    pub definition: TagDefinition,
    /// Records of the target type with the tag's bit set.
    pub usage_count: u64,
}

/// Every tag of `target_type` in slot order, with usage counts.
pub fn list_tags(conn: &Connection, ctx: &TagContext, target_type: &str) -> Result<Vec<TagUsage>> {
    let mut definitions = allocator::definitions(conn, ctx, target_type)?;
    definitions.sort_by_key(|def| def.slot);
    let mut out = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let column = definition.slot.column();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE target_type = ?1 AND ({column} & ?2) <> 0",
            ctx.schema().bitmaps()
        );
        let count: i64 = conn.query_row(
            &sql,
            params![target_type, word_to_sql(definition.slot.mask())],
            |row| row.get(0),
        )?;
        out.push(TagUsage {
            definition,
            usage_count: count.max(0) as u64,
        });
    }
    Ok(out)
}

/// Ids of the registered names among `names`, in slot order.
pub fn tag_ids_by_names<S: AsRef<str>>(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    names: &[S],
) -> Result<Vec<TagId>> {
    let resolved = allocator::resolve_names(conn, ctx, target_type, names)?;
    Ok(resolved.found.into_iter().map(|def| def.id).collect())
}

/// Names of the registered ids among `ids`, in slot order.
pub fn tag_names_by_ids(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    ids: &[TagId],
) -> Result<Vec<String>> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    let mut found: Vec<(Slot, String)> = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(BIND_CHUNK) {
        let mut bind: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
        bind.push(Value::Text(target_type.to_string()));
        for id in chunk {
            bind.push(Value::Integer(id.to_sql()?));
        }
        let sql = format!(
            "SELECT name, cell, bit FROM {} WHERE target_type = ?1 AND id IN ({})",
            ctx.schema().definitions(),
            placeholders(2, chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;
        for row in rows {
            let (name, cell, bit) = row?;
            found.push((Slot::from_sql(cell, bit)?, name));
        }
    }
    found.sort_by_key(|(slot, _)| *slot);
    Ok(found.into_iter().map(|(_, name)| name).collect())
}

/// Targets whose record satisfies `filter`, ascending.
pub fn tagged_targets(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    filter: &TagFilter,
) -> Result<Vec<TargetId>> {
    let Some(condition) = predicate::resolve_condition(conn, ctx, target_type, filter)? else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "SELECT {alias}.target_id FROM {table} AS {alias} \
         WHERE {alias}.target_type = ?1 AND ({condition}) ORDER BY {alias}.target_id",
        table = ctx.schema().bitmaps(),
        alias = BITMAP_ALIAS,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![target_type], |row| row.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(TargetId::from_sql(row?)?);
    }
    trace!(target_type, matched = out.len(), "tags.catalog.targets");
    Ok(out)
}
