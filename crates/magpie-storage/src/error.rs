//! Error types for the storage crate.

use thiserror::Error;

/// Result type alias using the storage error type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the storage port.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored blob could not be decoded.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}
