//! Error types for reminder storage.

use thiserror::Error;

/// Errors that can occur in reminder repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record was rejected before it reached the store.
    #[error("invalid reminder: {0}")]
    InvalidReminder(String),

    /// A caller-supplied id is already taken.
    #[error("reminder already exists: {0}")]
    DuplicateId(String),
}
