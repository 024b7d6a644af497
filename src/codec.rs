#![forbid(unsafe_code)]

//! Read path: bitmap record to tag identities.

use serde::Serialize;

use crate::cache::BitmapIndex;
use crate::types::{BitmapRecord, TagId};

/// Tags set on one record, in cell order then registration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DecodedTags {
    /// Definition ids.
    pub ids: Vec<TagId>,
    /// Tag names, parallel to `ids`.
    pub names: Vec<String>,
}

impl DecodedTags {
    /// Number of tags.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the record carries no registered tag.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `name` is among the decoded tags.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Decodes a record against the index of its target type.
///
/// Bits with no entry in the index (set by a definition the index has not
/// seen) are ignored.
pub fn decode(record: &BitmapRecord, index: &BitmapIndex) -> DecodedTags {
    debug_assert_eq!(record.target_type, index.target_type());
    let mut out = DecodedTags::default();
    for (cell_index, cell) in record.cells.iter().enumerate() {
        if *cell == 0 {
            continue;
        }
        for entry in index.cell(cell_index) {
            if cell & entry.mask != 0 {
                out.ids.push(entry.tag_id);
                out.names.push(entry.name.clone());
            }
        }
    }
    out
}

/// Decodes only the tag ids.
pub fn decode_ids(record: &BitmapRecord, index: &BitmapIndex) -> Vec<TagId> {
    record
        .cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| **cell != 0)
        .flat_map(move |(cell_index, cell)| {
            index
                .cell(cell_index)
                .iter()
                .filter(move |entry| cell & entry.mask != 0)
                .map(|entry| entry.tag_id)
        })
        .collect()
}
