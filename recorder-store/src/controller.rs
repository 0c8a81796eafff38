//! Optimistic concurrency controller.
//!
//! Drives the merge engine until a cycle commits, the document turns out
//! to be missing, or the attempt ceiling is reached. Contention is resolved
//! entirely by the store's compare-and-swap; there is no in-process lock.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use recorder_domain::{AuditAppend, DomainError, FormAppend, JsonObject};

use crate::error::MergeError;
use crate::merge::{merge_once, MergeOutcome};
use crate::repository::DocumentStore;

/// Default attempt ceiling for one merge.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Bounded-retry optimistic merger over a shared store.
#[derive(Clone)]
pub struct OptimisticMerger {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
}

impl OptimisticMerger {
    /// Create a merger. `max_attempts` below 1 is raised to 1.
    pub fn new(store: Arc<dyn DocumentStore>, max_attempts: u32) -> Self {
        Self { store, max_attempts: max_attempts.max(1) }
    }

    /// Attempt ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Shared store handle.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Apply `transform` to the document at `key` atomically.
    ///
    /// Conflicts are retried immediately. Returns the number of attempts
    /// used on success.
    ///
    /// # Errors
    /// - `MergeError::NotFound` if the key is absent (not retried)
    /// - `MergeError::Aborted` once every attempt conflicted
    /// - `MergeError::Transform` / `MergeError::Store` on terminal failures
    pub async fn update<F>(
        &self,
        key: &str,
        ttl_override: Option<Duration>,
        transform: F,
    ) -> Result<u32, MergeError>
    where
        F: Fn(&mut JsonObject) -> Result<(), DomainError> + Send + Sync,
    {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                debug!(key = %key, attempt, max_attempts = self.max_attempts, "Retrying merge");
            }

            match merge_once(self.store.as_ref(), key, ttl_override, &transform).await? {
                MergeOutcome::Committed => return Ok(attempt),
                MergeOutcome::Missing => {
                    return Err(MergeError::NotFound { key: key.to_string() });
                },
                MergeOutcome::Conflict => continue,
            }
        }

        warn!(key = %key, attempts = self.max_attempts, "Merge aborted after repeated conflicts");
        Err(MergeError::Aborted { key: key.to_string(), attempts: self.max_attempts })
    }

    /// Append an API entry (audit-append transform).
    pub async fn append_audit(
        &self,
        key: &str,
        entry: &AuditAppend,
        ttl_override: Option<Duration>,
    ) -> Result<u32, MergeError> {
        self.update(key, ttl_override, |doc| entry.apply(doc)).await
    }

    /// Append a FORM entry (form-append transform).
    pub async fn append_form(
        &self,
        key: &str,
        entry: &FormAppend,
        ttl_override: Option<Duration>,
    ) -> Result<u32, MergeError> {
        self.update(key, ttl_override, |doc| entry.apply(doc)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::merge::load_document;
    use crate::repository::Expiry;
    use recorder_domain::{message_ids, transaction_key, ApiListEntry};
    use serde_json::json;

    async fn seeded(ttl: Expiry) -> (Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let key = transaction_key("t1", "https://s/");
        let seed = json!({
            "latestAction": "init",
            "latestTimestamp": "old",
            "flowId": "flow-1",
            "subscriberType": "BPP",
            "messageIds": [],
            "apiList": [],
        });
        store.set(&key, seed.to_string(), ttl).await.unwrap();
        (store, key)
    }

    fn audit(payload_id: &str, message_id: &str) -> AuditAppend {
        AuditAppend {
            payload_id: payload_id.to_string(),
            action: "on_search".to_string(),
            message_id: message_id.to_string(),
            timestamp: "2026-01-07T00:00:00Z".to_string(),
            ttl_secs: 30,
            response: json!({"ok": true}),
        }
    }

    async fn document(store: &MemoryStore, key: &str) -> JsonObject {
        load_document(store, key).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_append_audit_not_found_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let merger = OptimisticMerger::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        let err = merger.append_audit("t1::https://s", &audit("pid-1", "m1"), None).await.unwrap_err();
        assert!(matches!(err, MergeError::NotFound { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sequential_appends_keep_call_order() {
        let (store, key) = seeded(Expiry::Persistent).await;
        let merger = OptimisticMerger::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        for i in 0..4 {
            merger.append_audit(&key, &audit(&format!("pid-{}", i), "m1"), None).await.unwrap();
        }

        let doc = document(&store, &key).await;
        let list: Vec<ApiListEntry> = serde_json::from_value(doc["apiList"].clone()).unwrap();
        assert_eq!(list.len(), 4);
        for (i, entry) in list.iter().enumerate() {
            match entry {
                ApiListEntry::Api(api) => assert_eq!(api.payload_id, format!("pid-{}", i)),
                other => panic!("Expected API entry, got {:?}", other),
            }
        }
        assert_eq!(message_ids(&doc), vec!["m1"]);
        assert_eq!(doc["flowId"], "flow-1");
    }

    #[tokio::test]
    async fn test_residual_ttl_is_preserved() {
        let (store, key) = seeded(Expiry::After(Duration::from_secs(3600))).await;
        let merger = OptimisticMerger::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        merger.append_audit(&key, &audit("pid-1", ""), None).await.unwrap();

        let remaining = store.expiry(&key).await.unwrap().unwrap().remaining().unwrap();
        assert!(remaining > Duration::ZERO);
        assert!(remaining <= Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_persistent_document_stays_persistent() {
        let (store, key) = seeded(Expiry::Persistent).await;
        let merger = OptimisticMerger::new(store.clone(), DEFAULT_MAX_ATTEMPTS);

        merger.append_form(&key, &FormAppend::default(), None).await.unwrap();

        assert_eq!(store.expiry(&key).await.unwrap(), Some(Expiry::Persistent));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let (store, key) = seeded(Expiry::Persistent).await;
        let merger = OptimisticMerger::new(store.clone(), DEFAULT_MAX_ATTEMPTS);
        store.interfere_next(3);

        let attempts = merger.append_audit(&key, &audit("pid-1", "m1"), None).await.unwrap();
        assert_eq!(attempts, 4);

        let doc = document(&store, &key).await;
        assert_eq!(doc["apiList"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_abort() {
        let (store, key) = seeded(Expiry::Persistent).await;
        let merger = OptimisticMerger::new(store.clone(), DEFAULT_MAX_ATTEMPTS);
        store.interfere_next(DEFAULT_MAX_ATTEMPTS);

        let err = merger.append_audit(&key, &audit("pid-1", "m1"), None).await.unwrap_err();
        assert!(matches!(err, MergeError::Aborted { attempts: 8, .. }));

        let doc = document(&store, &key).await;
        assert!(doc["apiList"].as_array().unwrap().is_empty());
        assert_eq!(doc["latestAction"], "init");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_no_updates() {
        let (store, key) = seeded(Expiry::Persistent).await;
        let merger = OptimisticMerger::new(store.clone(), 64);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let merger = merger.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    merger.append_audit(&key, &audit(&format!("pid-{}", i), &format!("m{}", i)), None).await
                })
            })
            .collect();

        let mut committed = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                committed += 1;
            }
        }

        let doc = document(&store, &key).await;
        assert_eq!(doc["apiList"].as_array().unwrap().len(), committed);
        assert_eq!(message_ids(&doc).len(), committed);
    }

    #[test]
    fn test_max_attempts_floor() {
        let merger = OptimisticMerger::new(Arc::new(MemoryStore::new()), 0);
        assert_eq!(merger.max_attempts(), 1);
    }
}
