#![forbid(unsafe_code)]

//! Identifiers and the fixed bitmap layout shared by every component.
//!
//! A bitmap row carries [`MAX_CELLS`] cells of [`BITS_PER_CELL`] bits each.
//! Slots are addressed with 1-based `(cell, bit)` pairs, matching the values
//! persisted in the definitions table, and converted to 0-based array indices
//! only at the point where a cell array is touched.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, TagError};

/// Storage word of one bitmap cell.
pub type CellWord = u64;

/// Number of cell columns in every bitmap row.
pub const MAX_CELLS: usize = 16;

/// Usable bits per cell. Equal to the width of the SQL column holding it.
pub const BITS_PER_CELL: u8 = CellWord::BITS as u8;

// Cells are persisted as SQLite INTEGER (64-bit two's complement). Allocation
// hands out bits up to BITS_PER_CELL, so the two widths must agree exactly.
const _: () = assert!(CellWord::BITS == i64::BITS);
const _: () = assert!(MAX_CELLS <= u8::MAX as usize);

/// Column names of the cell array, indexed by 0-based cell index.
pub(crate) const CELL_COLUMNS: [&str; MAX_CELLS] = [
    "cell_1", "cell_2", "cell_3", "cell_4", "cell_5", "cell_6", "cell_7", "cell_8", "cell_9",
    "cell_10", "cell_11", "cell_12", "cell_13", "cell_14", "cell_15", "cell_16",
];

/// Identifier of a tagged entity within its target type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

/// Row identifier of a tag definition.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct TagId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TargetId {
    pub(crate) fn to_sql(self) -> Result<i64> {
        i64::try_from(self.0).map_err(|_| TagError::Invalid("target id exceeds i64 range"))
    }

    pub(crate) fn from_sql(raw: i64) -> Result<Self> {
        u64::try_from(raw)
            .map(TargetId)
            .map_err(|_| TagError::Corruption("negative target id in bitmap table"))
    }
}

impl TagId {
    pub(crate) fn to_sql(self) -> Result<i64> {
        i64::try_from(self.0).map_err(|_| TagError::Invalid("tag id exceeds i64 range"))
    }

    pub(crate) fn from_sql(raw: i64) -> Result<Self> {
        u64::try_from(raw)
            .map(TagId)
            .map_err(|_| TagError::Corruption("negative tag id in definitions table"))
    }
}

/// A single `(cell, bit)` position, both 1-based.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct Slot {
    cell: u8,
    bit: u8,
}

impl Slot {
    /// Builds a slot, returning `None` when either coordinate is out of range.
    pub const fn new(cell: u8, bit: u8) -> Option<Self> {
        if cell == 0 || cell as usize > MAX_CELLS || bit == 0 || bit > BITS_PER_CELL {
            return None;
        }
        Some(Self { cell, bit })
    }

    pub(crate) fn from_sql(cell: i64, bit: i64) -> Result<Self> {
        let cell = u8::try_from(cell).map_err(|_| TagError::Corruption("cell out of range"))?;
        let bit = u8::try_from(bit).map_err(|_| TagError::Corruption("bit out of range"))?;
        Self::new(cell, bit).ok_or(TagError::Corruption("slot out of range"))
    }

    /// 1-based cell number.
    pub const fn cell(self) -> u8 {
        self.cell
    }

    /// 1-based bit number within the cell.
    pub const fn bit(self) -> u8 {
        self.bit
    }

    /// 0-based index into a cell array.
    pub const fn index(self) -> usize {
        self.cell as usize - 1
    }

    /// Single-bit mask selecting this slot inside its cell.
    pub const fn mask(self) -> CellWord {
        1 << (self.bit - 1)
    }

    pub(crate) fn column(self) -> &'static str {
        CELL_COLUMNS[self.index()]
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell {} bit {}", self.cell, self.bit)
    }
}

/// A registered tag name and the slot it occupies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TagDefinition {
    /// Definition row id; reported as the tag id when decoding.
    pub id: TagId,
    /// Namespace the name belongs to.
    pub target_type: String,
    /// Tag name, unique within `target_type`.
    pub name: String,
    /// Bit position assigned at registration.
    pub slot: Slot,
}

/// Persisted bitmap of one tagged target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BitmapRecord {
    /// Namespace of the target.
    pub target_type: String,
    /// Tagged entity.
    pub target_id: TargetId,
    /// Cell words, `cells[0]` being `cell_1`.
    pub cells: [CellWord; MAX_CELLS],
}

impl BitmapRecord {
    /// An all-zero record.
    pub fn empty(target_type: impl Into<String>, target_id: TargetId) -> Self {
        Self {
            target_type: target_type.into(),
            target_id,
            cells: [0; MAX_CELLS],
        }
    }

    /// Whether the slot's bit is set.
    pub fn contains(&self, slot: Slot) -> bool {
        self.cells[slot.index()] & slot.mask() != 0
    }

    /// True when no bit is set in any cell.
    pub fn is_clear(&self) -> bool {
        self.cells.iter().all(|cell| *cell == 0)
    }

    /// Number of set bits across all cells.
    pub fn count(&self) -> u32 {
        self.cells.iter().map(|cell| cell.count_ones()).sum()
    }
}

/// Per-cell accumulation of slot masks.
///
/// Used both as a pattern to write into a record and as an occupancy map when
/// allocating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellMasks([CellWord; MAX_CELLS]);

impl CellMasks {
    /// Empty mask set.
    pub const fn new() -> Self {
        Self([0; MAX_CELLS])
    }

    /// Sets the bit of `slot`.
    pub fn insert(&mut self, slot: Slot) {
        self.0[slot.index()] |= slot.mask();
    }

    /// Whether the bit of `slot` is set.
    pub fn contains(&self, slot: Slot) -> bool {
        self.0[slot.index()] & slot.mask() != 0
    }

    /// True when no bit is set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|word| *word == 0)
    }

    /// Mask of a 0-based cell index.
    pub fn word(&self, index: usize) -> CellWord {
        self.0[index]
    }

    /// Raw cell words.
    pub fn words(&self) -> &[CellWord; MAX_CELLS] {
        &self.0
    }

    /// Nonzero cells as `(0-based index, mask)`, in cell order.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, CellWord)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, word)| **word != 0)
            .map(|(index, word)| (index, *word))
    }
}

impl FromIterator<Slot> for CellMasks {
    fn from_iter<I: IntoIterator<Item = Slot>>(iter: I) -> Self {
        let mut masks = CellMasks::new();
        for slot in iter {
            masks.insert(slot);
        }
        masks
    }
}

/// Reinterprets a cell word as the signed value SQLite stores.
pub(crate) const fn word_to_sql(word: CellWord) -> i64 {
    word as i64
}

/// Reinterprets a stored SQLite integer as a cell word.
pub(crate) const fn word_from_sql(raw: i64) -> CellWord {
    raw as CellWord
}
