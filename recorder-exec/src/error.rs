//! Execution layer error types.

use thiserror::Error;

/// Errors raised by background jobs and sinks.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Downstream sink rejected or failed the call
    #[error("Sink error: {0}")]
    Sink(String),

    /// Store error while preparing a job
    #[error("Store error: {0}")]
    Store(#[from] recorder_store::StoreError),

    /// Payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Job was cancelled by its base lifetime
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl From<serde_json::Error> for ExecError {
    fn from(err: serde_json::Error) -> Self {
        ExecError::Serialization(err.to_string())
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
