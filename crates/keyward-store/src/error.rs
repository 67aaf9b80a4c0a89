//! Error types for the store module.

use keyward_core::GuardError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Row or key not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation, e.g. a second permission row for the same pair.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Blob directory already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// I/O error from the blob store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("migration error: {0}")]
    Migration(String),

    /// Key reference could not be produced or resolved.
    #[error("guard error: {0}")]
    Guard(#[from] GuardError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
