//! Transaction document model and merge transforms.
//!
//! The cached document is an open JSON object owned by an upstream
//! process. This module only touches the fields it is responsible for:
//!
//! - `latestAction` / `latestTimestamp`: last writer wins
//! - `messageIds`: insertion-ordered, deduplicated
//! - `apiList`: append-only sequence of [`ApiListEntry`]
//!
//! Every other field (flowId, sessionId, subscriberType, ...) is carried
//! through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;
use crate::time::{iso_millis_now, rfc3339_nanos_now};

/// Decoded transaction document.
pub type JsonObject = Map<String, Value>;

// =============================================================================
// Entries
// =============================================================================

/// One element of `apiList`, tagged by `entryType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entryType")]
pub enum ApiListEntry {
    /// An audited API call
    #[serde(rename = "API")]
    Api(ApiEntry),
    /// A form submission
    #[serde(rename = "FORM")]
    Form(FormEntry),
}

/// Audited API call entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEntry {
    /// Action name (e.g. `on_search`)
    pub action: String,
    /// Payload id
    pub payload_id: String,
    /// Message id, possibly blank
    pub message_id: String,
    /// Response body as received
    pub response: Value,
    /// Caller-supplied timestamp
    pub timestamp: String,
    /// Server time at which the entry was built
    pub real_timestamp: String,
    /// Per-entry ttl in seconds, only when positive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

/// Form submission entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormEntry {
    /// Form id
    pub form_id: String,
    /// Form type
    pub form_type: String,
    /// Server time at which the entry was built
    pub timestamp: String,
    /// Submission id, only when non-blank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    /// Opaque error payload reported by the form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

// =============================================================================
// Field helpers
// =============================================================================

/// Read `messageIds` as strings, skipping non-string elements.
pub fn message_ids(doc: &JsonObject) -> Vec<String> {
    match doc.get("messageIds") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Append a message id unless blank or already present.
///
/// Returns `true` if the id was added.
pub fn append_message_id(doc: &mut JsonObject, message_id: &str) -> bool {
    let message_id = message_id.trim();
    if message_id.is_empty() {
        return false;
    }

    let mut ids = message_ids(doc);
    let added = !ids.iter().any(|id| id == message_id);
    if added {
        ids.push(message_id.to_string());
    }
    doc.insert(
        "messageIds".to_string(),
        Value::Array(ids.into_iter().map(Value::String).collect()),
    );
    added
}

/// Append an entry to `apiList`, starting a new list if absent or malformed.
fn push_entry(doc: &mut JsonObject, entry: &ApiListEntry) -> Result<(), DomainError> {
    let value =
        serde_json::to_value(entry).map_err(|e| DomainError::InvalidDocument(e.to_string()))?;

    match doc.get_mut("apiList") {
        Some(Value::Array(list)) => list.push(value),
        _ => {
            doc.insert("apiList".to_string(), Value::Array(vec![value]));
        },
    }
    Ok(())
}

// =============================================================================
// Transforms
// =============================================================================

/// Audit-append transform: record one API call against the document.
#[derive(Debug, Clone, Default)]
pub struct AuditAppend {
    /// Payload id
    pub payload_id: String,
    /// Action name
    pub action: String,
    /// Message id (may be blank)
    pub message_id: String,
    /// Caller-supplied timestamp
    pub timestamp: String,
    /// Per-entry ttl in seconds; written only when positive
    pub ttl_secs: i64,
    /// Response body
    pub response: Value,
}

impl AuditAppend {
    /// Apply to a decoded document.
    ///
    /// Overwrites `latestAction`/`latestTimestamp`, merges the message id,
    /// and appends one API entry.
    pub fn apply(&self, doc: &mut JsonObject) -> Result<(), DomainError> {
        let action = self.action.trim();
        let timestamp = self.timestamp.trim();
        let message_id = self.message_id.trim();

        doc.insert("latestAction".to_string(), Value::String(action.to_string()));
        doc.insert("latestTimestamp".to_string(), Value::String(timestamp.to_string()));

        append_message_id(doc, message_id);

        let entry = ApiListEntry::Api(ApiEntry {
            action: action.to_string(),
            payload_id: self.payload_id.trim().to_string(),
            message_id: message_id.to_string(),
            response: self.response.clone(),
            timestamp: timestamp.to_string(),
            real_timestamp: rfc3339_nanos_now(),
            ttl: (self.ttl_secs > 0).then_some(self.ttl_secs),
        });
        push_entry(doc, &entry)
    }
}

/// Form-append transform: record one form submission.
#[derive(Debug, Clone, Default)]
pub struct FormAppend {
    /// Form id
    pub form_id: String,
    /// Form type
    pub form_type: String,
    /// Submission id (may be blank)
    pub submission_id: String,
    /// Opaque error payload
    pub error: Option<Value>,
}

impl FormAppend {
    /// Apply to a decoded document. Only `apiList` changes.
    pub fn apply(&self, doc: &mut JsonObject) -> Result<(), DomainError> {
        let submission_id = self.submission_id.trim();

        let entry = ApiListEntry::Form(FormEntry {
            form_id: self.form_id.trim().to_string(),
            form_type: self.form_type.trim().to_string(),
            timestamp: iso_millis_now(),
            submission_id: (!submission_id.is_empty()).then(|| submission_id.to_string()),
            error: self.error.clone().filter(|e| !e.is_null()),
        });
        push_entry(doc, &entry)
    }
}

// =============================================================================
// Tests
// =============================================================================
