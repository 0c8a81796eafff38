//! Audit ingest coordinator.
//!
//! One call per inbound event:
//!
//! ```text
//! decode → derive fields → merge (retry ≤ N) ─┬─ NotFound / Aborted / error → caller
//!                                             └─ committed → detached follow-up task:
//!                                                  flow status (logged only)
//!                                                  enqueue no-push, db-save
//! ```
//!
//! The caller's result depends only on the synchronous merge. Everything
//! after the commit runs in a spawned task, so dropping the request future
//! cannot lose the side effects. Background jobs run under the
//! dispatcher's own lifetime, never the request's.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use recorder_domain::{transaction_key, AuditEvent, DerivedFields};
use recorder_exec::{Admission, AsyncDispatcher};
use recorder_store::{FlowStatusUpdater, OptimisticMerger, FLOW_STATUS_AVAILABLE};

use crate::config::IngestConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::side_effects::SideEffects;

/// What happened to an accepted event.
#[derive(Debug)]
pub struct IngestReceipt {
    /// Payload id (caller-supplied or generated)
    pub payload_id: String,
    /// Transaction document key
    pub key: String,
    /// Merge attempts used; `None` when the merge was skipped
    pub attempts: Option<u32>,
    /// Detached post-commit work; resolves once both jobs are admitted
    pub follow_up: JoinHandle<FollowUp>,
}

/// Outcome of the detached post-commit work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUp {
    /// Whether the flow status existed and was refreshed
    pub flow_status_updated: bool,
    /// Admission of the `no-push` job; `None` when skipped
    pub no_push: Option<Admission>,
    /// Admission of the `db-save` job; `None` when skipped
    pub db_save: Option<Admission>,
}

/// Coordinates merge and side effects for audit events.
pub struct AuditIngestor {
    merger: OptimisticMerger,
    flow_status: FlowStatusUpdater,
    dispatcher: Arc<AsyncDispatcher>,
    side_effects: SideEffects,
    settings: IngestConfig,
}

impl AuditIngestor {
    pub fn new(
        merger: OptimisticMerger,
        flow_status: FlowStatusUpdater,
        dispatcher: Arc<AsyncDispatcher>,
        side_effects: SideEffects,
        settings: IngestConfig,
    ) -> Self {
        Self { merger, flow_status, dispatcher, side_effects, settings }
    }

    /// Decode raw event bytes and ingest them.
    pub async fn log_event(&self, bytes: &[u8]) -> DaemonResult<IngestReceipt> {
        debug!(bytes = bytes.len(), "Audit event received");
        let event = AuditEvent::from_slice(bytes)?;
        self.ingest(event).await
    }

    /// Ingest a decoded event.
    ///
    /// # Errors
    /// - `InvalidInput`: missing ids, blank key, negative cache TTL
    /// - `NotFound`: the transaction document does not exist
    /// - `Aborted`: every merge attempt conflicted
    /// - `Internal`: store or transform failure
    pub async fn ingest(&self, event: AuditEvent) -> DaemonResult<IngestReceipt> {
        let mut fields = event.derive_fields()?;

        if fields.payload_id.trim().is_empty() {
            fields.payload_id = Uuid::new_v4().to_string();
        }
        if fields.ttl_secs == 0 {
            fields.ttl_secs = self.settings.api_ttl_secs_default;
        }
        if fields.cache_ttl_secs == 0 {
            fields.cache_ttl_secs = self.settings.cache_ttl_secs_default;
        }

        let key = transaction_key(&fields.transaction_id, &fields.subscriber_url);
        if key.is_empty() {
            return Err(DaemonError::InvalidInput("invalid key".to_string()));
        }
        if fields.cache_ttl_secs < 0 {
            return Err(DaemonError::InvalidInput("cache_ttl_seconds must be >= 0".to_string()));
        }
        let cache_ttl = (fields.cache_ttl_secs > 0).then(|| Duration::from_secs(fields.cache_ttl_secs as u64));

        info!(
            transaction_id = %fields.transaction_id,
            action = %fields.action,
            subscriber_url = %fields.subscriber_url,
            payload_id = %fields.payload_id,
            "Ingesting audit event"
        );

        let attempts = if self.settings.skip_cache_update {
            debug!(key = %key, "Cache update skipped");
            None
        } else {
            let append = fields.audit_append(&event.response_body);
            let attempts = self.merger.append_audit(&key, &append, cache_ttl).await.map_err(|e| {
                error!(key = %key, error = %e, "Cache update failed");
                DaemonError::from(e)
            })?;
            Some(attempts)
        };

        let payload_id = fields.payload_id.clone();
        let follow_up = tokio::spawn(run_follow_up(
            FollowUpTask {
                flow_status: (!self.settings.skip_cache_update).then(|| self.flow_status.clone()),
                dispatcher: self.dispatcher.clone(),
                side_effects: self.side_effects.clone(),
                skip_no_push: self.settings.skip_no_push,
                skip_db_save: self.settings.skip_db_save,
            },
            Arc::new(event),
            Arc::new(fields),
        ));

        Ok(IngestReceipt { payload_id, key, attempts, follow_up })
    }
}

/// Owned handles for the post-commit work.
struct FollowUpTask {
    flow_status: Option<FlowStatusUpdater>,
    dispatcher: Arc<AsyncDispatcher>,
    side_effects: SideEffects,
    skip_no_push: bool,
    skip_db_save: bool,
}

async fn run_follow_up(task: FollowUpTask, event: Arc<AuditEvent>, fields: Arc<DerivedFields>) -> FollowUp {
    let mut flow_status_updated = false;
    if let Some(updater) = &task.flow_status {
        match updater
            .set_if_exists(&fields.transaction_id, &fields.subscriber_url, FLOW_STATUS_AVAILABLE)
            .await
        {
            Ok(updated) => flow_status_updated = updated,
            Err(e) => warn!(transaction_id = %fields.transaction_id, error = %e, "Failed to set flow status"),
        }
    }

    let no_push = if task.skip_no_push {
        None
    } else {
        let job = task.side_effects.no_push_job(event.clone(), fields.clone());
        Some(task.dispatcher.enqueue(job).await)
    };
    let db_save = if task.skip_db_save {
        None
    } else {
        let job = task.side_effects.db_save_job(event, fields);
        Some(task.dispatcher.enqueue(job).await)
    };

    FollowUp { flow_status_updated, no_push, db_save }
}

// =============================================================================
// Tests
// =============================================================================
