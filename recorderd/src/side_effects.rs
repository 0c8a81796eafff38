//! Best-effort side effects of an ingested audit event.
//!
//! Two independent jobs run on the dispatcher after a successful merge:
//!
//! - `no-push`: two transaction logs to the observability sink
//! - `db-save`: session check/create plus payload save on the persistence sink
//!
//! A sink is `None` when it is unconfigured or not enabled for the current
//! environment; the job then completes immediately.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use recorder_domain::value::{get_context_string, get_string};
use recorder_domain::{transaction_key, AuditEvent, DerivedFields, JsonObject};
use recorder_exec::{
    AsyncJob, ExecError, ExecResult, ObservabilitySink, PayloadRecord, PersistenceSink,
    SessionDetails, SessionRecord, TxnLogBody, TxnLogRecord,
};
use recorder_store::{load_document, DocumentStore};

/// Job name of the observability push.
pub const NO_PUSH_JOB: &str = "no-push";

/// Job name of the persistence save.
pub const DB_SAVE_JOB: &str = "db-save";

/// Session type recorded for every session created here.
const AUTOMATION_SESSION: &str = "AUTOMATION";

/// Keys probed, in order, for caller request headers in `additionalData`.
const REQUEST_HEADER_KEYS: [&str; 3] = ["reqHeader", "req_header", "request_headers"];

/// Sinks and store handle shared by every side-effect job.
#[derive(Clone)]
pub struct SideEffects {
    observability: Option<Arc<dyn ObservabilitySink>>,
    persistence: Option<Arc<dyn PersistenceSink>>,
    store: Arc<dyn DocumentStore>,
}

impl SideEffects {
    /// Create the side-effect set. `None` sinks are skipped.
    pub fn new(
        observability: Option<Arc<dyn ObservabilitySink>>,
        persistence: Option<Arc<dyn PersistenceSink>>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self { observability, persistence, store }
    }

    /// Build the `no-push` job for an event.
    pub fn no_push_job(&self, event: Arc<AuditEvent>, fields: Arc<DerivedFields>) -> AsyncJob {
        let sink = self.observability.clone();
        AsyncJob::new(NO_PUSH_JOB, move |token| async move {
            let Some(sink) = sink else {
                debug!(transaction_id = %fields.transaction_id, "Observability sink disabled, skipping push");
                return Ok(());
            };
            cancellable(token, push_txn_logs(sink.as_ref(), &event, &fields)).await
        })
    }

    /// Build the `db-save` job for an event.
    pub fn db_save_job(&self, event: Arc<AuditEvent>, fields: Arc<DerivedFields>) -> AsyncJob {
        let sink = self.persistence.clone();
        let store = self.store.clone();
        AsyncJob::new(DB_SAVE_JOB, move |token| async move {
            let Some(sink) = sink else {
                debug!(transaction_id = %fields.transaction_id, "Persistence sink disabled, skipping save");
                return Ok(());
            };
            cancellable(token, save_payload(sink.as_ref(), store.as_ref(), &event, &fields)).await
        })
    }
}

async fn cancellable<F>(token: CancellationToken, work: F) -> ExecResult<()>
where
    F: std::future::Future<Output = ExecResult<()>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(ExecError::Cancelled("job lifetime ended".to_string())),
        result = work => result,
    }
}

// =============================================================================
// Observability push
// =============================================================================

/// Push the request log, then the response log.
///
/// The response log is not attempted if the request log fails.
pub async fn push_txn_logs(
    sink: &dyn ObservabilitySink,
    event: &AuditEvent,
    fields: &DerivedFields,
) -> ExecResult<()> {
    let record = |body: TxnLogBody| TxnLogRecord {
        payload_id: fields.payload_id.clone(),
        transaction_id: fields.transaction_id.clone(),
        subscriber_url: fields.subscriber_url.trim_end_matches('/').to_string(),
        action: fields.action.clone(),
        timestamp: fields.timestamp.clone(),
        api_name: fields.api_name.clone(),
        body,
    };

    sink.push_txn_log(&record(TxnLogBody::Request {
        request: Value::Object(event.request_body.clone()),
    }))
    .await?;

    sink.push_txn_log(&record(TxnLogBody::Response {
        response: Value::Object(event.response_body.clone()),
        status_code: fields.status_code,
    }))
    .await?;

    info!(transaction_id = %fields.transaction_id, payload_id = %fields.payload_id, "Transaction logs pushed");
    Ok(())
}

// =============================================================================
// Persistence save
// =============================================================================

/// Save the exchange to the persistence service.
///
/// Skipped when the transaction document no longer exists. The session is
/// created first if the service does not know it yet.
pub async fn save_payload(
    sink: &dyn PersistenceSink,
    store: &dyn DocumentStore,
    event: &AuditEvent,
    fields: &DerivedFields,
) -> ExecResult<()> {
    let key = transaction_key(&fields.transaction_id, &fields.subscriber_url);
    let Some(doc) = load_document(store, &key).await? else {
        debug!(key = %key, "Transaction document absent, skipping save");
        return Ok(());
    };

    let session_id = match get_string(&doc, "sessionId").trim() {
        "" => session_id_for(&key),
        id => id.to_string(),
    };

    if !sink.session_exists(&session_id).await? {
        sink.create_session(&session_record(&session_id, &doc, event, fields)).await?;
        info!(session_id = %session_id, "Created session");
    }

    sink.save_payload(&payload_record(&session_id, &doc, event, fields)).await?;
    info!(transaction_id = %fields.transaction_id, session_id = %session_id, "Payload saved");
    Ok(())
}

/// Session id derived from a transaction key: lower-case SHA-256 hex.
pub fn session_id_for(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Caller request headers as a JSON string; `"{}"` when absent.
pub fn request_headers(additional_data: &JsonObject) -> String {
    REQUEST_HEADER_KEYS
        .iter()
        .find_map(|key| additional_data.get(*key))
        .filter(|headers| !headers.is_null())
        .and_then(|headers| serde_json::to_string(headers).ok())
        .unwrap_or_else(|| "{}".to_string())
}

fn session_record(
    session_id: &str,
    doc: &JsonObject,
    event: &AuditEvent,
    fields: &DerivedFields,
) -> SessionRecord {
    let request = &event.request_body;
    let version = match get_context_string(request, "version") {
        v if v.trim().is_empty() => get_context_string(request, "core_version"),
        v => v,
    };

    SessionRecord {
        session_id: session_id.to_string(),
        np_type: get_string(doc, "subscriberType").trim().to_string(),
        np_id: fields.subscriber_url.trim().to_string(),
        domain: get_context_string(request, "domain"),
        version,
        session_type: AUTOMATION_SESSION.to_string(),
        session_active: true,
    }
}

fn payload_record(
    session_id: &str,
    doc: &JsonObject,
    event: &AuditEvent,
    fields: &DerivedFields,
) -> PayloadRecord {
    let request = &event.request_body;
    let message_id = match fields.message_id.trim() {
        "" => get_context_string(request, "message_id"),
        id => id.to_string(),
    };

    PayloadRecord {
        message_id,
        transaction_id: fields.transaction_id.trim().to_string(),
        payload_id: fields.payload_id.trim().to_string(),
        action: fields.action.trim().to_uppercase(),
        bpp_id: get_context_string(request, "bpp_id"),
        bap_id: get_context_string(request, "bap_id"),
        req_header: request_headers(&event.additional_data),
        json_request: Value::Object(request.clone()),
        json_response: Value::Object(JsonObject::from_iter([(
            "response".to_string(),
            Value::Object(event.response_body.clone()),
        )])),
        http_status: fields.status_code,
        flow_id: get_string(doc, "flowId").trim().to_string(),
        session_details: SessionDetails { session_id: session_id.to_string() },
    }
}

// =============================================================================
// Tests
// =============================================================================
