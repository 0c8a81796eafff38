//! Daemon error types.

use recorder_domain::DomainError;
use recorder_store::{MergeError, StoreError};
use thiserror::Error;

/// Daemon-level errors.
///
/// Ingest failures are classified so the HTTP surface can map them to a
/// status without inspecting the cause.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Malformed or incomplete input
    #[error("{0}")]
    InvalidInput(String),

    /// Transaction document does not exist
    #[error("transaction not found")]
    NotFound,

    /// Optimistic retries exhausted
    #[error("conflict, retry")]
    Aborted,

    /// Any other failure on the synchronous path
    #[error("{0}")]
    Internal(String),

    /// Store error outside the merge path
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DomainError> for DaemonError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidInput(message) => DaemonError::InvalidInput(message),
            other => DaemonError::InvalidInput(other.to_string()),
        }
    }
}

impl From<MergeError> for DaemonError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::NotFound { .. } => DaemonError::NotFound,
            MergeError::Aborted { .. } => DaemonError::Aborted,
            MergeError::Transform(_) | MergeError::Store(_) => {
                DaemonError::Internal("cache update failed".to_string())
            },
        }
    }
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_error_classification() {
        let not_found: DaemonError = MergeError::NotFound { key: "k".to_string() }.into();
        assert!(matches!(not_found, DaemonError::NotFound));

        let aborted: DaemonError = MergeError::Aborted { key: "k".to_string(), attempts: 8 }.into();
        assert_eq!(aborted.to_string(), "conflict, retry");

        let store: DaemonError = MergeError::Store(StoreError::Connection("down".to_string())).into();
        assert!(matches!(store, DaemonError::Internal(_)));
    }

    #[test]
    fn test_domain_error_is_invalid_input() {
        let err: DaemonError = DomainError::missing("transaction_id").into();
        assert!(matches!(err, DaemonError::InvalidInput(ref msg) if msg.contains("transaction_id")));
    }
}
