//! Store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TagError};
use crate::types::{BITS_PER_CELL, MAX_CELLS};

/// SQLite journal mode applied when a store opens its connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead log; readers do not block the single writer.
    #[default]
    Wal,
    /// Rollback journal deleted at commit.
    Delete,
    /// Journal kept in memory.
    Memory,
}

impl JournalMode {
    /// Value passed to `PRAGMA journal_mode`.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Options used when opening a [`TagStore`](crate::store::TagStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagOptions {
    /// Cells available to the allocator, `1..=16`. Capacity per target type
    /// is `cell_count * 64`.
    pub cell_count: u8,
    /// Prefix prepended to both table names.
    pub table_prefix: String,
    /// How long a writer waits for the database lock before failing.
    pub busy_timeout_ms: u64,
    /// Journal mode for file-backed databases.
    pub journal_mode: JournalMode,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            cell_count: MAX_CELLS as u8,
            table_prefix: String::new(),
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl TagOptions {
    /// Sets the number of allocatable cells.
    pub fn cell_count(mut self, cells: u8) -> Self {
        self.cell_count = cells;
        self
    }

    /// Sets the table prefix.
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets the busy timeout in milliseconds.
    pub fn busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = millis;
        self
    }

    /// Sets the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Tags that fit in one target type.
    pub fn capacity(&self) -> usize {
        self.cell_count as usize * BITS_PER_CELL as usize
    }

    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Rejects out-of-range settings.
    pub fn validate(&self) -> Result<()> {
        if self.cell_count == 0 || self.cell_count as usize > MAX_CELLS {
            return Err(TagError::Invalid("cell_count must be within 1..=16"));
        }
        Ok(())
    }
}
