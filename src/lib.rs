//! Bitmap tag index over SQLite.
//!
//! Attaches named boolean tags to entities of several target types while
//! storing each tagged entity as one row of sixteen 64-bit cells. Tag names
//! are assigned `(cell, bit)` slots on registration; assignments flip bits;
//! reads decode bits back to names through a per-session cache; filters
//! compile to bitwise SQL predicates that can be embedded in host queries.
//!
//! [`TagStore`] is the entry point for most callers. The per-component
//! modules expose the same operations over a borrowed `rusqlite::Connection`
//! for callers that manage their own transactions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocator;
pub mod cache;
pub mod catalog;
pub mod codec;
pub mod context;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod options;
pub mod predicate;
pub mod record;
pub mod schema;
pub mod store;
pub mod types;

pub use cache::{BitEntry, BitmapIndex, Session, SessionMetrics};
pub use catalog::TagUsage;
pub use codec::{decode, DecodedTags};
pub use context::TagContext;
pub use error::{Result, TagError};
pub use options::{JournalMode, TagOptions};
pub use predicate::{HostTable, MatchMode, TagFilter, TagPredicate};
pub use store::TagStore;
pub use types::{
    BitmapRecord, CellMasks, CellWord, Slot, TagDefinition, TagId, TargetId, BITS_PER_CELL,
    MAX_CELLS,
};
