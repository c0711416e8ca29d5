//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection to the backend failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A query or request against the backend failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Invalid input (bad namespace, bad key).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(String),
}
