//! In-memory store implementation
//!
//! Used for testing and development without Redis.
//! Every write bumps a store-wide revision counter which doubles as the
//! compare-and-swap token. Expired keys read as absent.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::repository::{CasToken, DocumentStore, Expiry, Snapshot};

/// In-memory store for testing
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    revision: AtomicU64,
    /// Pending simulated concurrent writes (see `interfere_next`)
    interference: AtomicU32,
}

/// Value with revision and absolute deadline
struct StoredValue {
    value: String,
    revision: u64,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    fn residual(&self, now: Instant) -> Expiry {
        match self.expires_at {
            None => Expiry::Persistent,
            Some(deadline) => Expiry::After(deadline.saturating_duration_since(now)),
        }
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            revision: AtomicU64::new(0),
            interference: AtomicU32::new(0),
        }
    }

    /// Simulate a concurrent writer on the next `count` conditional writes.
    ///
    /// Each affected write bumps the key's revision before comparing, so
    /// it observes a conflict exactly as if another client had committed
    /// in between.
    pub fn interfere_next(&self, count: u32) {
        self.interference.store(count, Ordering::SeqCst);
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().await.values().filter(|v| !v.is_expired(now)).count()
    }

    /// Whether the store holds no live keys
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take_interference(&self) -> bool {
        self.interference
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn stored(&self, value: String, expiry: Expiry) -> StoredValue {
        StoredValue {
            value,
            revision: self.next_revision(),
            expires_at: expiry.remaining().map(|ttl| Instant::now() + ttl),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(stored) if stored.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            },
            Some(stored) => Ok(Some(Snapshot {
                value: stored.value.clone(),
                expiry: stored.residual(now),
                token: CasToken::new(stored.revision.to_string()),
            })),
            None => Ok(None),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        token: &CasToken,
        value: String,
        expiry: Expiry,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if self.take_interference() {
            if let Some(stored) = entries.get_mut(key) {
                stored.revision = self.next_revision();
            }
        }

        let current = match entries.get(key) {
            Some(stored) if !stored.is_expired(now) => stored,
            _ => return Ok(false),
        };
        if current.revision.to_string() != token.as_str() {
            return Ok(false);
        }

        let replacement = self.stored(value, expiry);
        entries.insert(key.to_string(), replacement);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(key).await?.map(|snapshot| snapshot.value))
    }

    async fn set(&self, key: &str, value: String, expiry: Expiry) -> Result<(), StoreError> {
        let replacement = self.stored(value, expiry);
        self.entries.lock().await.insert(key.to_string(), replacement);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read(key).await?.is_some())
    }

    async fn expiry(&self, key: &str) -> Result<Option<Expiry>, StoreError> {
        Ok(self.read(key).await?.map(|snapshot| snapshot.expiry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_and_read() {
        let store = MemoryStore::new();
        store.set("k", "v".to_string(), Expiry::Persistent).await.unwrap();

        let snapshot = store.read("k").await.unwrap().unwrap();
        assert_eq!(snapshot.value, "v");
        assert_eq!(snapshot.expiry, Expiry::Persistent);
        assert!(store.exists("k").await.unwrap());
        assert!(!store.exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_residual_ttl_counts_down() {
        let store = MemoryStore::new();
        store
            .set("k", "v".to_string(), Expiry::After(Duration::from_secs(3600)))
            .await
            .unwrap();

        let remaining = store.expiry("k").await.unwrap().unwrap().remaining().unwrap();
        assert!(remaining <= Duration::from_secs(3600));
        assert!(remaining > Duration::from_secs(3590));
    }

    #[tokio::test]
    async fn test_expired_key_is_absent() {
        let store = MemoryStore::new();
        store
            .set("k", "v".to_string(), Expiry::After(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(store.read("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_compare_and_swap_detects_intervening_write() {
        let store = MemoryStore::new();
        store.set("k", "v1".to_string(), Expiry::Persistent).await.unwrap();
        let snapshot = store.read("k").await.unwrap().unwrap();

        store.set("k", "v2".to_string(), Expiry::Persistent).await.unwrap();

        let swapped = store
            .compare_and_swap("k", &snapshot.token, "v3".to_string(), Expiry::Persistent)
            .await
            .unwrap();
        assert!(!swapped);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_compare_and_swap_commits_when_unchanged() {
        let store = MemoryStore::new();
        store.set("k", "v1".to_string(), Expiry::Persistent).await.unwrap();
        let snapshot = store.read("k").await.unwrap().unwrap();

        let swapped = store
            .compare_and_swap("k", &snapshot.token, "v2".to_string(), Expiry::Persistent)
            .await
            .unwrap();
        assert!(swapped);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_compare_and_swap_on_missing_key_fails() {
        let store = MemoryStore::new();
        let swapped = store
            .compare_and_swap("k", &CasToken::new("1"), "v".to_string(), Expiry::Persistent)
            .await
            .unwrap();
        assert!(!swapped);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_interference_forces_conflicts() {
        let store = MemoryStore::new();
        store.set("k", "v1".to_string(), Expiry::Persistent).await.unwrap();
        store.interfere_next(1);

        let snapshot = store.read("k").await.unwrap().unwrap();
        assert!(!store
            .compare_and_swap("k", &snapshot.token, "v2".to_string(), Expiry::Persistent)
            .await
            .unwrap());

        let snapshot = store.read("k").await.unwrap().unwrap();
        assert!(store
            .compare_and_swap("k", &snapshot.token, "v2".to_string(), Expiry::Persistent)
            .await
            .unwrap());
    }
}
