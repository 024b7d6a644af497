//! Error type shared by every tag operation.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TagError>;

/// Errors surfaced by tag index operations.
#[derive(Debug, Error)]
pub enum TagError {
    /// The name is already registered in the target type.
    #[error("tag '{name}' already exists for target type '{target_type}'")]
    AlreadyExists {
        /// Namespace that was searched.
        target_type: String,
        /// Conflicting name.
        name: String,
    },
    /// A tag definition or bitmap record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Every slot of the target type is taken.
    #[error("no free tag slot for target type '{target_type}' (capacity {capacity})")]
    NoCapacity {
        /// Exhausted namespace.
        target_type: String,
        /// Slots available to the namespace.
        capacity: usize,
    },
    /// A name is malformed, or a mutation referenced unregistered tags.
    #[error("invalid tag name: {0}")]
    InvalidName(String),
    /// Invalid argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Stored rows violate the bitmap layout.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Failure reported by SQLite; the enclosing transaction was rolled back.
    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl TagError {
    pub(crate) fn already_exists(target_type: &str, name: &str) -> Self {
        TagError::AlreadyExists {
            target_type: target_type.to_string(),
            name: name.to_string(),
        }
    }

    pub(crate) fn unregistered(target_type: &str, names: &[String]) -> Self {
        TagError::InvalidName(format!(
            "unregistered for target type '{target_type}': {}",
            names.join(", ")
        ))
    }
}
