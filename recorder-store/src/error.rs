//! Storage layer errors

use recorder_domain::DomainError;
use thiserror::Error;

/// Errors that can occur talking to the key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store command failed
    #[error("Database error: {0}")]
    Database(String),

    /// Store is unreachable
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Database(err.to_string())
        }
    }
}

/// Terminal outcomes of an optimistic merge
#[derive(Debug, Error)]
pub enum MergeError {
    /// Base document is absent; the upstream process never created it
    #[error("transaction not found: {key}")]
    NotFound {
        /// Document key
        key: String,
    },

    /// Every attempt lost the race to a concurrent writer
    #[error("aborted after {attempts} conflicting attempts: {key}")]
    Aborted {
        /// Document key
        key: String,
        /// Attempts made
        attempts: u32,
    },

    /// The transform rejected the document
    #[error("Transform error: {0}")]
    Transform(#[from] DomainError),

    /// Store I/O or serialization failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
