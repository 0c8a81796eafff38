//! Session/payload persistence client.
//!
//! # Endpoints
//!
//! - `GET  <base>/api/sessions/check/<sessionId>` → `true` or `{"data": true}`
//! - `POST <base>/api/sessions` → create session
//! - `POST <base>/api/sessions/payload` → save payload
//!
//! All requests carry `x-api-key` when a key is configured.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use recorder_exec::{ExecError, PayloadRecord, PersistenceSink, SessionRecord};

use crate::error::ConnectorError;
use crate::http::{join_url, join_url_with, send};

/// Session collection path.
pub const SESSIONS_PATH: &str = "/api/sessions";

/// Payload save path.
pub const PAYLOAD_PATH: &str = "/api/sessions/payload";

/// Session existence check; the session id is appended as one segment.
const SESSION_CHECK_PATH: &str = "/api/sessions/check";

const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client for the persistence service.
pub struct PersistenceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl PersistenceClient {
    /// Create a client for `base_url`. A blank `api_key` is not sent.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ConnectorError> {
        // Validates the base URL up front
        join_url(base_url, "")?;
        let api_key = api_key.trim();
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim().to_string(),
            api_key: (!api_key.is_empty()).then(|| api_key.to_string()),
            timeout,
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    /// Check whether a session exists.
    pub async fn check_session(&self, session_id: &str) -> Result<bool, ConnectorError> {
        let url = join_url_with(&self.base_url, SESSION_CHECK_PATH, &[session_id])?;
        let response = send(self.with_key(self.client.get(&url)), &url, self.timeout).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ConnectorError::ParseError(e.to_string()))?;
        Ok(parse_session_exists(&body))
    }

    /// Post a JSON body to `path`.
    async fn post<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), ConnectorError> {
        let url = join_url(&self.base_url, path)?;
        send(self.with_key(self.client.post(&url).json(body)), &url, self.timeout).await?;
        debug!(url = %url, "Posted to persistence service");
        Ok(())
    }
}

/// Interpret a session-check reply. Anything but `true` or `{"data": true}`
/// means the session does not exist.
fn parse_session_exists(body: &Value) -> bool {
    match body {
        Value::Bool(exists) => *exists,
        Value::Object(obj) => obj.get("data").and_then(Value::as_bool).unwrap_or(false),
        _ => false,
    }
}

#[async_trait]
impl PersistenceSink for PersistenceClient {
    async fn session_exists(&self, session_id: &str) -> Result<bool, ExecError> {
        Ok(self.check_session(session_id).await?)
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<(), ExecError> {
        Ok(self.post(SESSIONS_PATH, session).await?)
    }

    async fn save_payload(&self, payload: &PayloadRecord) -> Result<(), ExecError> {
        Ok(self.post(PAYLOAD_PATH, payload).await?)
    }
}
