//! Execution layer port definitions.
//!
//! Ports define the interfaces for the downstream sinks that receive copies
//! of every audited exchange. HTTP adapters live in `recorder-connectors`;
//! recording stubs live in [`crate::stub`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecError;

// =============================================================================
// Observability Port
// =============================================================================

/// Port for the network-observability log sink.
#[async_trait]
pub trait ObservabilitySink: Send + Sync {
    /// Push one transaction log record.
    async fn push_txn_log(&self, record: &TxnLogRecord) -> Result<(), ExecError>;
}

/// One record posted to the observability sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxnLogRecord {
    pub payload_id: String,
    pub transaction_id: String,
    /// Subscriber URL with trailing slashes removed
    pub subscriber_url: String,
    pub action: String,
    pub timestamp: String,
    pub api_name: String,
    #[serde(flatten)]
    pub body: TxnLogBody,
}

/// Request or response half of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TxnLogBody {
    Request {
        request: Value,
    },
    Response {
        response: Value,
        #[serde(rename = "statusCode")]
        status_code: i64,
    },
}

// =============================================================================
// Persistence Port
// =============================================================================

/// Port for the session/payload persistence service.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Whether a session with this id already exists.
    async fn session_exists(&self, session_id: &str) -> Result<bool, ExecError>;

    /// Create a session.
    async fn create_session(&self, session: &SessionRecord) -> Result<(), ExecError>;

    /// Save one exchange payload under its session.
    async fn save_payload(&self, payload: &PayloadRecord) -> Result<(), ExecError>;
}

/// Session created on first save for a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    /// Subscriber type from the transaction document
    pub np_type: String,
    /// Subscriber URL
    pub np_id: String,
    pub domain: String,
    pub version: String,
    pub session_type: String,
    pub session_active: bool,
}

/// Session reference embedded in a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub session_id: String,
}

/// Exchange payload saved to the persistence service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRecord {
    pub message_id: String,
    pub transaction_id: String,
    pub payload_id: String,
    /// Upper-cased action
    pub action: String,
    pub bpp_id: String,
    pub bap_id: String,
    /// Request headers encoded as a JSON string
    pub req_header: String,
    pub json_request: Value,
    /// `{"response": <response body>}`
    pub json_response: Value,
    pub http_status: i64,
    pub flow_id: String,
    pub session_details: SessionDetails,
}

// =============================================================================
// Tests
// =============================================================================
