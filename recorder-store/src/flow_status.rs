//! Flow-status updater.
//!
//! The flow status is an advisory marker created elsewhere. It is only
//! refreshed when it already exists; last writer wins.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use recorder_domain::flow_status_key;

use crate::error::StoreError;
use crate::repository::{DocumentStore, Expiry};

/// Status written after a successful audit merge.
pub const FLOW_STATUS_AVAILABLE: &str = "AVAILABLE";

/// TTL applied when the status is refreshed (5 hours).
pub const DEFAULT_FLOW_STATUS_TTL: Duration = Duration::from_secs(5 * 60 * 60);

/// Conditional writer for `FLOW_STATUS_*` keys.
#[derive(Clone)]
pub struct FlowStatusUpdater {
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
}

impl FlowStatusUpdater {
    /// Create an updater that refreshes keys with `ttl`.
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Overwrite `{status}` and reset the TTL if the key exists.
    ///
    /// Returns `true` if the key was updated. Blank ids and missing keys
    /// are a no-op.
    pub async fn set_if_exists(
        &self,
        transaction_id: &str,
        subscriber_url: &str,
        status: &str,
    ) -> Result<bool, StoreError> {
        let key = flow_status_key(transaction_id, subscriber_url);
        if key.is_empty() {
            return Ok(false);
        }
        if !self.store.exists(&key).await? {
            debug!(key = %key, "Flow status absent, leaving it alone");
            return Ok(false);
        }

        let value = serde_json::to_string(&json!({ "status": status }))?;
        self.store.set(&key, value, Expiry::After(self.ttl)).await?;
        debug!(key = %key, status = %status, "Flow status updated");
        Ok(true)
    }
}
