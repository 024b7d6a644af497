//! Subscriber setup for binaries and tests.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive did not parse.
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    /// A global subscriber is already set.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Installs a `fmt` subscriber writing to stderr, filtered by `filter`
/// (`RUST_LOG` syntax, e.g. `tagbits=debug`).
pub fn init_logging(filter: &str) -> Result<(), LoggingError> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(filter).map_err(|e| LoggingError::InvalidFilter(e.to_string()))?,
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
