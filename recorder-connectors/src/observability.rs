//! Network-observability log push client.
//!
//! Every audited exchange is pushed as two records (request, then response)
//! to `<base>/v1/api/push-txn-logs`. A bearer token is sent when configured.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use recorder_exec::{ExecError, ObservabilitySink, TxnLogRecord};

use crate::error::ConnectorError;
use crate::http::{join_url, send};

/// Log push endpoint, relative to the base URL.
pub const PUSH_TXN_LOGS_PATH: &str = "/v1/api/push-txn-logs";

/// HTTP client for the observability service.
pub struct ObservabilityClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
}

impl ObservabilityClient {
    /// Create a client for `base_url`. A blank `token` disables auth.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        let token = token.trim();
        Ok(Self {
            client: Client::new(),
            endpoint: join_url(base_url, PUSH_TXN_LOGS_PATH)?,
            token: (!token.is_empty()).then(|| token.to_string()),
            timeout,
        })
    }

    /// Resolved push endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post one record.
    pub async fn push(&self, record: &TxnLogRecord) -> Result<(), ConnectorError> {
        let mut request = self.client.post(&self.endpoint).json(record);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        send(request, &self.endpoint, self.timeout).await?;
        debug!(endpoint = %self.endpoint, payload_id = %record.payload_id, "Pushed transaction log");
        Ok(())
    }
}

#[async_trait]
impl ObservabilitySink for ObservabilityClient {
    async fn push_txn_log(&self, record: &TxnLogRecord) -> Result<(), ExecError> {
        Ok(self.push(record).await?)
    }
}
