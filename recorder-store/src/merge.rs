//! Document merge engine: one optimistic compare-and-swap cycle.
//!
//! read value + residual TTL → decode → transform → encode → conditional
//! write. Retry policy lives in [`crate::OptimisticMerger`].

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use recorder_domain::{DomainError, JsonObject};

use crate::error::{MergeError, StoreError};
use crate::repository::{DocumentStore, Expiry};

/// Result of a single merge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The transformed document was written
    Committed,
    /// The key changed between read and write; safe to retry
    Conflict,
    /// The key does not exist
    Missing,
}

/// Decode a stored document. `null` decodes to an empty object.
pub fn decode_document(raw: &str) -> Result<JsonObject, StoreError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(doc) => Ok(doc),
        Value::Null => Ok(JsonObject::new()),
        other => Err(StoreError::Serialization(format!(
            "document is not a JSON object: {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load and decode a document without modifying it.
///
/// Returns `None` for a blank key or an absent value.
pub async fn load_document<S>(store: &S, key: &str) -> Result<Option<JsonObject>, StoreError>
where
    S: DocumentStore + ?Sized,
{
    if key.trim().is_empty() {
        return Ok(None);
    }
    match store.get(key).await? {
        Some(raw) => decode_document(&raw).map(Some),
        None => Ok(None),
    }
}

/// Run one merge cycle against `key`.
///
/// The write keeps the residual TTL unless `ttl_override` is positive.
///
/// # Errors
/// Transform failures and store failures are terminal.
pub async fn merge_once<S, F>(
    store: &S,
    key: &str,
    ttl_override: Option<Duration>,
    transform: &F,
) -> Result<MergeOutcome, MergeError>
where
    S: DocumentStore + ?Sized,
    F: Fn(&mut JsonObject) -> Result<(), DomainError> + Send + Sync,
{
    let Some(snapshot) = store.read(key).await? else {
        return Ok(MergeOutcome::Missing);
    };
    debug!(key = %key, bytes = snapshot.value.len(), "Read transaction document");

    let mut doc = decode_document(&snapshot.value)?;
    transform(&mut doc)?;
    let encoded = serde_json::to_string(&doc).map_err(StoreError::from)?;

    let expiry = Expiry::resolve(ttl_override, snapshot.expiry);
    if store.compare_and_swap(key, &snapshot.token, encoded, expiry).await? {
        Ok(MergeOutcome::Committed)
    } else {
        Ok(MergeOutcome::Conflict)
    }
}
