#![forbid(unsafe_code)]

//! Compiles tag queries into SQL row filters.
//!
//! The generated expression is an `EXISTS` subquery against the bitmap table,
//! correlated with a host table through its key column:
//!
//! ```text
//! EXISTS (SELECT 1 FROM tag_bitmaps AS tag_bm
//!         WHERE tag_bm.target_type = ? AND tag_bm.target_id = orders.id
//!         AND ((tag_bm.cell_1 & 0x3) = 0x3))
//! ```
//!
//! Masks are inlined as hexadecimal literals, which SQLite reads as 64-bit
//! two's complement, so bit 64 needs no special casing. The target type is
//! the only bound parameter.
//!
//! [`MatchMode::All`] requires every requested tag: tags sharing a cell are
//! merged into one mask compared for equality, and cells are joined with
//! `AND`. [`MatchMode::Any`] requires at least one: each cell tests for a
//! nonzero intersection and cells are joined with `OR`.

use std::fmt::Write as _;

use rusqlite::types::Value;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::allocator;
use crate::context::TagContext;
use crate::error::Result;
use crate::schema::validate_identifier;
use crate::types::{CellMasks, CELL_COLUMNS};

/// Alias of the bitmap table inside generated subqueries.
pub const BITMAP_ALIAS: &str = "tag_bm";

const ALWAYS_TRUE: &str = "1 = 1";
const ALWAYS_FALSE: &str = "1 = 0";

/// How multiple requested tags combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum MatchMode {
    /// Every requested tag must be set.
    #[default]
    All,
    /// At least one requested tag must be set.
    Any,
}

/// A tag query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagFilter {
    names: Vec<String>,
    mode: MatchMode,
}

impl TagFilter {
    /// Matches targets carrying every name.
    pub fn all<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names, MatchMode::All)
    }

    /// Matches targets carrying at least one name.
    pub fn any<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names, MatchMode::Any)
    }

    /// Filter with an explicit mode.
    pub fn new<I, S>(names: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    /// Requested names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Combination mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }
}

/// Host table reference the subquery correlates with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostTable {
    table: String,
    key: String,
}

impl HostTable {
    /// `table` is the outer table name or alias, `key` its column holding the
    /// target id. Both must be plain identifiers.
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let key = key.into();
        validate_identifier(&table)?;
        validate_identifier(&key)?;
        Ok(Self { table, key })
    }

    /// Host table keyed by `id`.
    pub fn keyed_by_id(table: impl Into<String>) -> Result<Self> {
        Self::new(table, "id")
    }

    fn column(&self) -> String {
        format!("{}.{}", self.table, self.key)
    }
}

/// A compiled filter: SQL text plus positional parameters in order.
#[derive(Clone, Debug, PartialEq)]
pub struct TagPredicate {
    sql: String,
    params: Vec<Value>,
}

impl TagPredicate {
    /// A predicate no row satisfies.
    pub fn always_false() -> Self {
        Self {
            sql: ALWAYS_FALSE.to_string(),
            params: Vec::new(),
        }
    }

    /// A predicate every row satisfies.
    pub fn always_true() -> Self {
        Self {
            sql: ALWAYS_TRUE.to_string(),
            params: Vec::new(),
        }
    }

    /// SQL boolean expression using `?` placeholders.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Values for the placeholders of [`sql`](Self::sql), in order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// True for the degenerate match-nothing predicate.
    pub fn is_always_false(&self) -> bool {
        self.sql == ALWAYS_FALSE
    }

    /// Splits into SQL and parameters.
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }
}

/// Builds the filter for `target_type` against `host`.
///
/// An empty name list filters nothing. Unregistered names cannot be present
/// on any row: under [`MatchMode::All`] one of them yields a match-nothing
/// predicate, under [`MatchMode::Any`] they are dropped and the predicate only
/// degrades when none of the names resolve.
pub fn build_filter(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    filter: &TagFilter,
    host: &HostTable,
) -> Result<TagPredicate> {
    if filter.names.is_empty() {
        return Ok(TagPredicate::always_true());
    }
    let Some(condition) = resolve_condition(conn, ctx, target_type, filter)? else {
        return Ok(TagPredicate::always_false());
    };
    let sql = format!(
        "EXISTS (SELECT 1 FROM {table} AS {alias} WHERE {alias}.target_type = ? \
         AND {alias}.target_id = {host} AND ({condition}))",
        table = ctx.schema().bitmaps(),
        alias = BITMAP_ALIAS,
        host = host.column(),
    );
    Ok(TagPredicate {
        sql,
        params: vec![Value::Text(target_type.to_string())],
    })
}

/// Resolves the filter into a bitwise condition over [`BITMAP_ALIAS`].
///
/// `None` means no row can match. An empty name list yields `Some("1 = 1")`.
pub(crate) fn resolve_condition(
    conn: &Connection,
    ctx: &TagContext,
    target_type: &str,
    filter: &TagFilter,
) -> Result<Option<String>> {
    if filter.names.is_empty() {
        return Ok(Some(ALWAYS_TRUE.to_string()));
    }
    let resolved = allocator::resolve_names(conn, ctx, target_type, &filter.names)?;
    if !resolved.missing.is_empty() {
        debug!(
            target_type,
            missing = ?resolved.missing,
            mode = ?filter.mode,
            "tags.filter.unresolved"
        );
        if filter.mode == MatchMode::All {
            return Ok(None);
        }
    }
    let masks: CellMasks = resolved.found.iter().map(|def| def.slot).collect();
    Ok(bitwise_condition(&masks, filter.mode, BITMAP_ALIAS))
}

/// Renders the per-cell tests for `masks`. `None` when `masks` is empty.
pub fn bitwise_condition(masks: &CellMasks, mode: MatchMode, alias: &str) -> Option<String> {
    let joiner = match mode {
        MatchMode::All => " AND ",
        MatchMode::Any => " OR ",
    };
    let mut out = String::new();
    for (index, mask) in masks.nonzero() {
        if !out.is_empty() {
            out.push_str(joiner);
        }
        let column = CELL_COLUMNS[index];
        let _ = match mode {
            MatchMode::All => write!(out, "({alias}.{column} & 0x{mask:X}) = 0x{mask:X}"),
            MatchMode::Any => write!(out, "({alias}.{column} & 0x{mask:X}) <> 0"),
        };
    }
    (!out.is_empty()).then_some(out)
}
