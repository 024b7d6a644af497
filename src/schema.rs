#![forbid(unsafe_code)]

//! Table naming and DDL.

use std::fmt::Write as _;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, TagError};
use crate::types::{BITS_PER_CELL, CELL_COLUMNS, MAX_CELLS};

const DEFINITIONS_TABLE: &str = "tag_definitions";
const BITMAPS_TABLE: &str = "tag_bitmaps";

/// Values bound per `IN (...)` list. Longer lists are split across statements
/// so no statement nears `SQLITE_MAX_VARIABLE_NUMBER` (32766).
pub(crate) const BIND_CHUNK: usize = 4_096;

/// Longest accepted tag name, in bytes.
pub const MAX_TAG_NAME_LEN: usize = 64;
/// Longest accepted target type, in bytes.
pub const MAX_TARGET_TYPE_LEN: usize = 20;

/// Resolved table names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    definitions: String,
    bitmaps: String,
}

impl Schema {
    /// Builds table names from an optional prefix.
    pub fn new(prefix: &str) -> Result<Self> {
        if !prefix.is_empty() {
            validate_identifier(prefix)?;
        }
        Ok(Self {
            definitions: format!("{prefix}{DEFINITIONS_TABLE}"),
            bitmaps: format!("{prefix}{BITMAPS_TABLE}"),
        })
    }

    /// Name of the tag definitions table.
    pub fn definitions(&self) -> &str {
        &self.definitions
    }

    /// Name of the bitmap records table.
    pub fn bitmaps(&self) -> &str {
        &self.bitmaps
    }

    /// Creates both tables and their indexes if missing.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&self.ddl())?;
        debug!(
            definitions = %self.definitions,
            bitmaps = %self.bitmaps,
            "tags.schema.ready"
        );
        Ok(())
    }

    fn ddl(&self) -> String {
        let mut cells = String::new();
        for column in CELL_COLUMNS {
            let _ = writeln!(cells, "    {column} INTEGER NOT NULL DEFAULT 0,");
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {defs} (
    id INTEGER PRIMARY KEY,
    target_type TEXT NOT NULL,
    name TEXT NOT NULL,
    cell INTEGER NOT NULL CHECK (cell BETWEEN 1 AND {max_cells}),
    bit INTEGER NOT NULL CHECK (bit BETWEEN 1 AND {max_bits}),
    UNIQUE (target_type, name),
    UNIQUE (target_type, cell, bit)
);
CREATE TABLE IF NOT EXISTS {bitmaps} (
    id INTEGER PRIMARY KEY,
    target_type TEXT NOT NULL,
    target_id INTEGER NOT NULL,
{cells}    UNIQUE (target_type, target_id)
);",
            defs = self.definitions,
            bitmaps = self.bitmaps,
            max_cells = MAX_CELLS,
            max_bits = BITS_PER_CELL,
        )
    }
}

/// `?{first}, ?{first + 1}, ...` for `count` values.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    let mut out = String::with_capacity(count * 6);
    for i in 0..count {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "?{}", first + i);
    }
    out
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, the only identifiers spliced into SQL.
pub fn validate_identifier(ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(TagError::InvalidName(format!("'{ident}' is not a valid SQL identifier")))
    }
}

pub(crate) fn validate_target_type(target_type: &str) -> Result<()> {
    if target_type.trim().is_empty() {
        return Err(TagError::Invalid("target type must not be empty"));
    }
    if target_type.len() > MAX_TARGET_TYPE_LEN {
        return Err(TagError::Invalid("target type exceeds 20 bytes"));
    }
    Ok(())
}

pub(crate) fn validate_tag_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TagError::InvalidName("tag name must not be empty".into()));
    }
    if name.len() > MAX_TAG_NAME_LEN {
        return Err(TagError::InvalidName(format!(
            "'{name}' exceeds {MAX_TAG_NAME_LEN} bytes"
        )));
    }
    Ok(())
}
