//! Stub implementations for testing.
//!
//! These sinks record every call in memory instead of making HTTP calls.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::error::ExecError;
use crate::ports::{ObservabilitySink, PayloadRecord, PersistenceSink, SessionRecord, TxnLogRecord};

// =============================================================================
// Recording Observability Sink
// =============================================================================

/// Observability sink that keeps pushed records.
#[derive(Default)]
pub struct RecordingObservabilitySink {
    records: RwLock<Vec<TxnLogRecord>>,
    fail_next: RwLock<bool>,
}

impl RecordingObservabilitySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records pushed so far, in order.
    pub fn records(&self) -> Vec<TxnLogRecord> {
        self.records.read().unwrap().clone()
    }

    /// Configure the next push to fail.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap() = fail;
    }

    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap();
        std::mem::take(&mut *fail_next)
    }
}

#[async_trait]
impl ObservabilitySink for RecordingObservabilitySink {
    async fn push_txn_log(&self, record: &TxnLogRecord) -> Result<(), ExecError> {
        if self.should_fail() {
            return Err(ExecError::Sink("Simulated push failure".to_string()));
        }
        self.records.write().unwrap().push(record.clone());
        Ok(())
    }
}

// =============================================================================
// Recording Persistence Sink
// =============================================================================

/// Persistence sink that keeps sessions and payloads.
#[derive(Default)]
pub struct RecordingPersistenceSink {
    known_sessions: RwLock<HashSet<String>>,
    created: RwLock<Vec<SessionRecord>>,
    payloads: RwLock<Vec<PayloadRecord>>,
    fail_next: RwLock<bool>,
}

impl RecordingPersistenceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session as already existing.
    pub fn add_session(&self, session_id: &str) {
        self.known_sessions.write().unwrap().insert(session_id.to_string());
    }

    /// Sessions created through the sink.
    pub fn created_sessions(&self) -> Vec<SessionRecord> {
        self.created.read().unwrap().clone()
    }

    /// Payloads saved through the sink.
    pub fn payloads(&self) -> Vec<PayloadRecord> {
        self.payloads.read().unwrap().clone()
    }

    /// Configure the next call to fail.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap() = fail;
    }

    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap();
        std::mem::take(&mut *fail_next)
    }
}

#[async_trait]
impl PersistenceSink for RecordingPersistenceSink {
    async fn session_exists(&self, session_id: &str) -> Result<bool, ExecError> {
        if self.should_fail() {
            return Err(ExecError::Sink("Simulated session check failure".to_string()));
        }
        Ok(self.known_sessions.read().unwrap().contains(session_id))
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<(), ExecError> {
        if self.should_fail() {
            return Err(ExecError::Sink("Simulated session create failure".to_string()));
        }
        self.known_sessions.write().unwrap().insert(session.session_id.clone());
        self.created.write().unwrap().push(session.clone());
        Ok(())
    }

    async fn save_payload(&self, payload: &PayloadRecord) -> Result<(), ExecError> {
        if self.should_fail() {
            return Err(ExecError::Sink("Simulated payload save failure".to_string()));
        }
        self.payloads.write().unwrap().push(payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TxnLogBody;
    use serde_json::json;

    #[tokio::test]
    async fn test_observability_sink_records_and_fails_once() {
        let sink = RecordingObservabilitySink::new();
        let record = TxnLogRecord {
            payload_id: "p".to_string(),
            transaction_id: "t".to_string(),
            subscriber_url: "s".to_string(),
            action: "a".to_string(),
            timestamp: "ts".to_string(),
            api_name: "a".to_string(),
            body: TxnLogBody::Request { request: json!({}) },
        };

        sink.set_fail_next(true);
        assert!(sink.push_txn_log(&record).await.is_err());
        sink.push_txn_log(&record).await.unwrap();
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_sink_tracks_sessions() {
        let sink = RecordingPersistenceSink::new();
        assert!(!sink.session_exists("s1").await.unwrap());

        sink.create_session(&SessionRecord {
            session_id: "s1".to_string(),
            np_type: "BPP".to_string(),
            np_id: "https://s".to_string(),
            domain: "ONDC:RET10".to_string(),
            version: "1.2.0".to_string(),
            session_type: "AUTOMATION".to_string(),
            session_active: true,
        })
        .await
        .unwrap();

        assert!(sink.session_exists("s1").await.unwrap());
        assert_eq!(sink.created_sessions().len(), 1);
    }
}
