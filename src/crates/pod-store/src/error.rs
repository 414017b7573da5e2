//! Error types for store operations

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during persistence
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database path escapes the data root or is otherwise invalid
    #[error("Invalid database path: {0}")]
    InvalidPath(String),

    /// Requested row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization of a persisted blob failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying SQL error
    #[error("SQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for pod_core::PodError {
    fn from(err: StoreError) -> Self {
        pod_core::PodError::Persistence(err.to_string())
    }
}
