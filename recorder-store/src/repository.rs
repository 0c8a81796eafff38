//! Storage port definition
//!
//! Any backend with a compare-and-swap primitive (version counter, ETag,
//! value comparison, native watch/multi) can implement `DocumentStore`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// Expiry of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Key never expires
    Persistent,
    /// Key expires after the given duration
    After(Duration),
}

impl Expiry {
    /// Pick the expiry to write back after a merge.
    ///
    /// A positive override wins; otherwise the residual expiry read with
    /// the document is kept as-is.
    pub fn resolve(ttl_override: Option<Duration>, residual: Expiry) -> Expiry {
        match ttl_override {
            Some(ttl) if !ttl.is_zero() => Expiry::After(ttl),
            _ => residual,
        }
    }

    /// Remaining duration, `None` when persistent.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Expiry::Persistent => None,
            Expiry::After(ttl) => Some(*ttl),
        }
    }
}

/// Opaque token identifying the version of a value that was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasToken(String);

impl CasToken {
    /// Wrap a backend-specific version marker
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    /// Backend-specific version marker
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Value read together with its residual expiry and version token.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Raw stored value
    pub value: String,
    /// Residual expiry at read time
    pub expiry: Expiry,
    /// Token to present on the conditional write
    pub token: CasToken,
}

/// Shared key-value store holding transaction documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a value, its residual expiry and a version token.
    ///
    /// Returns `None` if the key is absent.
    async fn read(&self, key: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Write `value` only if the key still holds the version behind `token`.
    ///
    /// Returns `false` when the key changed (or vanished) since the read.
    async fn compare_and_swap(
        &self,
        key: &str,
        token: &CasToken,
        value: String,
        expiry: Expiry,
    ) -> Result<bool, StoreError>;

    /// Read a raw value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally write a value.
    async fn set(&self, key: &str, value: String, expiry: Expiry) -> Result<(), StoreError>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Residual expiry of a key, `None` if absent.
    async fn expiry(&self, key: &str) -> Result<Option<Expiry>, StoreError>;
}
