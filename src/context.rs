//! Shared table names, allocation width and definition epochs.

use std::sync::Arc;

use crate::cache::DefinitionEpochs;
use crate::error::Result;
use crate::options::TagOptions;
use crate::schema::Schema;
use crate::types::BITS_PER_CELL;

/// Everything an operation needs besides the connection.
///
/// Cloning is cheap and clones share the definition epochs, so every handle
/// built from one context observes the definition changes of the others.
#[derive(Clone, Debug)]
pub struct TagContext {
    schema: Arc<Schema>,
    cell_count: u8,
    epochs: Arc<DefinitionEpochs>,
}

impl TagContext {
    /// Validates the options and derives the table names.
    pub fn new(opts: &TagOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            schema: Arc::new(Schema::new(&opts.table_prefix)?),
            cell_count: opts.cell_count,
            epochs: Arc::new(DefinitionEpochs::default()),
        })
    }

    /// Table names.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Cells the allocator may hand out.
    pub fn cell_count(&self) -> u8 {
        self.cell_count
    }

    /// Slots available per target type.
    pub fn capacity(&self) -> usize {
        self.cell_count as usize * BITS_PER_CELL as usize
    }

    /// Current definition epoch of a target type.
    pub fn epoch(&self, target_type: &str) -> u64 {
        self.epochs.current(target_type)
    }

    pub(crate) fn definitions_changed(&self, target_type: &str) {
        self.epochs.bump(target_type);
    }
}
