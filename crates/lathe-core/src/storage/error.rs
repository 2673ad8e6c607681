//! Error types for the storage layer.

use lathe_training::JobError;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or statement error.
    #[error("Database error: {0}")]
    Connection(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid data error.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The shared connection mutex was poisoned by a panicking holder.
    #[error("Database lock error: {0}")]
    LockPoisoned(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        JobError::Storage(err.to_string())
    }
}
