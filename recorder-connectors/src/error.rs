//! Connector errors.

use thiserror::Error;

use recorder_exec::ExecError;

/// Errors that can occur talking to a sink service.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// Base URL could not be combined with the endpoint path
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// Service answered with a non-2xx status
    #[error("HTTP {url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

impl From<ConnectorError> for ExecError {
    fn from(err: ConnectorError) -> Self {
        ExecError::Sink(err.to_string())
    }
}
