#![forbid(unsafe_code)]

//! Session-scoped reverse index from `(cell, bit)` to tag identity.
//!
//! A [`Session`] builds a [`BitmapIndex`] the first time a target type is
//! resolved and hands out the same `Arc` afterwards without touching the
//! database. Each entry remembers the definition epoch it was built at; the
//! epoch is bumped in-process by every register, delete and rename running
//! through the same [`TagContext`], and a mismatch forces a rebuild. Changes
//! made by other processes stay invisible until the session is dropped or
//! [`Session::invalidate`] is called.
//!
//! The index only serves decoding. Writes never consult it.

use std::sync::Arc;

use parking_lot::RwLock;
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::trace;

use crate::allocator;
use crate::context::TagContext;
use crate::error::Result;
use crate::types::{CellWord, TagDefinition, TagId, MAX_CELLS};

/// One registered tag as seen from its cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BitEntry {
    /// Single-bit mask inside the cell.
    pub mask: CellWord,
    /// Definition id.
    pub tag_id: TagId,
    /// Tag name.
    pub name: String,
}

type CellEntries = SmallVec<[BitEntry; 4]>;

/// Per-cell lists of registered tags for one target type.
#[derive(Clone, Debug, Default)]
pub struct BitmapIndex {
    target_type: String,
    cells: [CellEntries; MAX_CELLS],
}

impl BitmapIndex {
    /// Groups definitions by cell. Within a cell, entries follow registration
    /// order (definition id), which differs from bit order once a freed bit is
    /// handed out again.
    pub fn from_definitions<I>(target_type: &str, definitions: I) -> Self
    where
        I: IntoIterator<Item = TagDefinition>,
    {
        let mut cells: [CellEntries; MAX_CELLS] = Default::default();
        for def in definitions {
            debug_assert_eq!(def.target_type, target_type);
            cells[def.slot.index()].push(BitEntry {
                mask: def.slot.mask(),
                tag_id: def.id,
                name: def.name,
            });
        }
        for entries in cells.iter_mut() {
            entries.sort_by_key(|entry| entry.tag_id);
        }
        Self {
            target_type: target_type.to_string(),
            cells,
        }
    }

    /// Target type the index describes.
    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// Entries of a 0-based cell index.
    pub fn cell(&self, index: usize) -> &[BitEntry] {
        &self.cells[index]
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.cells.iter().map(|entries| entries.len()).sum()
    }

    /// True when no tag is registered.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|entries| entries.is_empty())
    }
}

/// Process-wide definition epochs, keyed by target type.
#[derive(Debug, Default)]
pub struct DefinitionEpochs {
    inner: RwLock<FxHashMap<String, u64>>,
}

impl DefinitionEpochs {
    /// Epoch of `target_type`; zero until the first change.
    pub fn current(&self, target_type: &str) -> u64 {
        self.inner.read().get(target_type).copied().unwrap_or(0)
    }

    pub(crate) fn bump(&self, target_type: &str) {
        let mut guard = self.inner.write();
        let epoch = guard.entry(target_type.to_string()).or_insert(0);
        *epoch += 1;
        trace!(target_type, epoch = *epoch, "tags.cache.epoch");
    }
}

#[derive(Clone, Debug)]
struct CachedIndex {
    epoch: u64,
    index: Arc<BitmapIndex>,
}

/// Counters of one session's cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    /// Resolves answered from the cache.
    pub hits: u64,
    /// Resolves that built an index for a type not cached yet.
    pub misses: u64,
    /// Resolves that rebuilt a cached index after a definition change.
    pub rebuilds: u64,
}

/// Access session owning the bitmap index cache.
///
/// Sessions are not shared between threads or requests; create one per unit
/// of work and drop it afterwards.
#[derive(Debug, Default)]
pub struct Session {
    entries: FxHashMap<String, CachedIndex>,
    metrics: SessionMetrics,
}

impl Session {
    /// Empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `target_type`, building it on first use or after a
    /// definition change observed through `ctx`.
    pub fn resolve(
        &mut self,
        conn: &Connection,
        ctx: &TagContext,
        target_type: &str,
    ) -> Result<Arc<BitmapIndex>> {
        let epoch = ctx.epoch(target_type);
        let stale = match self.entries.get(target_type) {
            Some(cached) if cached.epoch == epoch => {
                self.metrics.hits += 1;
                trace!(target_type, epoch, "tags.cache.hit");
                return Ok(Arc::clone(&cached.index));
            }
            Some(_) => true,
            None => false,
        };
        let definitions = allocator::definitions(conn, ctx, target_type)?;
        let index = Arc::new(BitmapIndex::from_definitions(target_type, definitions));
        if stale {
            self.metrics.rebuilds += 1;
            trace!(target_type, epoch, tags = index.len(), "tags.cache.rebuild");
        } else {
            self.metrics.misses += 1;
            trace!(target_type, epoch, tags = index.len(), "tags.cache.miss");
        }
        self.entries.insert(
            target_type.to_string(),
            CachedIndex {
                epoch,
                index: Arc::clone(&index),
            },
        );
        Ok(index)
    }

    /// Drops the cached index of one target type.
    pub fn invalidate(&mut self, target_type: &str) {
        self.entries.remove(target_type);
    }

    /// Drops every cached index.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether an index for `target_type` is cached.
    pub fn is_cached(&self, target_type: &str) -> bool {
        self.entries.contains_key(target_type)
    }

    /// Cache counters since the session was created.
    pub fn metrics(&self) -> SessionMetrics {
        self.metrics
    }
}
