//! Audit Recorder Sink Connectors
//!
//! HTTP adapters for the execution-layer ports:
//! - [`ObservabilityClient`]: network-observability log push (bearer auth)
//! - [`PersistenceClient`]: session/payload persistence service (API key)

#![warn(clippy::all)]

pub mod error;
mod http;
pub mod observability;
pub mod persistence;

// Re-exports
pub use error::ConnectorError;
pub use observability::{ObservabilityClient, PUSH_TXN_LOGS_PATH};
pub use persistence::{PersistenceClient, PAYLOAD_PATH, SESSIONS_PATH};
