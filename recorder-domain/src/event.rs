//! Inbound audit events and form submissions.
//!
//! Decoding is deliberately lenient about optional fields and strict about
//! the few fields the recorder cannot work without.

use serde_json::Value;

use crate::document::{AuditAppend, FormAppend, JsonObject};
use crate::error::DomainError;
use crate::time::rfc3339_nanos_now;
use crate::value::{get_bool, get_i64, get_string};

/// Default action when the caller omits one.
pub const UNKNOWN_ACTION: &str = "unknown_action";

/// Default API name when the caller omits one.
pub const UNKNOWN_API: &str = "unknown_api";

// =============================================================================
// Audit Event
// =============================================================================

/// Decoded audit event.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Request body as seen by the caller
    pub request_body: JsonObject,
    /// Response body as seen by the caller
    pub response_body: JsonObject,
    /// Side-channel metadata (`transaction_id`, `subscriber_url`, ...)
    pub additional_data: JsonObject,
}

impl AuditEvent {
    /// Decode an event from raw JSON bytes.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidInput` for malformed JSON or when
    /// `requestBody`/`responseBody` is not an object.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DomainError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|_| DomainError::invalid("invalid JSON"))?;
        let Value::Object(mut root) = value else {
            return Err(DomainError::invalid("invalid JSON"));
        };

        let request_body = take_object(&mut root, "requestBody")?
            .ok_or_else(|| DomainError::invalid("requestBody must be a JSON object"))?;
        let response_body = take_object(&mut root, "responseBody")?
            .ok_or_else(|| DomainError::invalid("responseBody must be a JSON object"))?;
        let additional_data = take_object(&mut root, "additionalData")?.unwrap_or_default();

        Ok(Self { request_body, response_body, additional_data })
    }

    /// Derive the fields the recorder works with.
    ///
    /// The message id comes from `additionalData.message_id`, falling back
    /// to `requestBody.context.message_id`.
    ///
    /// # Errors
    /// Returns `DomainError::MissingField` when `transaction_id` or
    /// `subscriber_url` is blank.
    pub fn derive_fields(&self) -> Result<DerivedFields, DomainError> {
        let ad = &self.additional_data;

        let mut fields = DerivedFields {
            payload_id: get_string(ad, "payload_id"),
            transaction_id: get_string(ad, "transaction_id"),
            message_id: get_string(ad, "message_id"),
            subscriber_url: get_string(ad, "subscriber_url"),
            action: get_string(ad, "action"),
            timestamp: get_string(ad, "timestamp"),
            api_name: get_string(ad, "api_name"),
            status_code: get_i64(ad, "status_code"),
            ttl_secs: get_i64(ad, "ttl_seconds"),
            cache_ttl_secs: get_i64(ad, "cache_ttl_seconds"),
            is_mock: get_bool(ad, "is_mock"),
            session_id: get_string(ad, "session_id"),
        };

        if fields.message_id.trim().is_empty() {
            if let Some(Value::Object(context)) = self.request_body.get("context") {
                fields.message_id = get_string(context, "message_id");
            }
        }

        if fields.transaction_id.trim().is_empty() {
            return Err(DomainError::missing("transaction_id in additionalData"));
        }
        if fields.subscriber_url.trim().is_empty() {
            return Err(DomainError::missing("subscriber_url in additionalData"));
        }
        if fields.action.trim().is_empty() {
            fields.action = UNKNOWN_ACTION.to_string();
        }
        if fields.timestamp.trim().is_empty() {
            fields.timestamp = rfc3339_nanos_now();
        }
        if fields.api_name.trim().is_empty() {
            fields.api_name = UNKNOWN_API.to_string();
        }

        Ok(fields)
    }
}

/// Remove `key` from `root`; `null`/absent is `None`, non-objects are errors.
fn take_object(root: &mut JsonObject, key: &str) -> Result<Option<JsonObject>, DomainError> {
    match root.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(object)) => Ok(Some(object)),
        Some(_) => Err(DomainError::invalid(format!("{} must be a JSON object", key))),
    }
}

/// Fields derived from an audit event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedFields {
    /// Payload id (assigned by the recorder when blank)
    pub payload_id: String,
    /// Transaction id
    pub transaction_id: String,
    /// Message id (may be blank)
    pub message_id: String,
    /// Subscriber URL
    pub subscriber_url: String,
    /// Action
    pub action: String,
    /// Caller timestamp
    pub timestamp: String,
    /// API name
    pub api_name: String,
    /// HTTP status of the audited call
    pub status_code: i64,
    /// Per-entry ttl in seconds
    pub ttl_secs: i64,
    /// Cache TTL override in seconds
    pub cache_ttl_secs: i64,
    /// Whether the audited call was mocked
    pub is_mock: bool,
    /// Session id supplied by the caller
    pub session_id: String,
}

impl DerivedFields {
    /// Build the audit-append transform for these fields.
    pub fn audit_append(&self, response: &JsonObject) -> AuditAppend {
        AuditAppend {
            payload_id: self.payload_id.clone(),
            action: self.action.clone(),
            message_id: self.message_id.clone(),
            timestamp: self.timestamp.clone(),
            ttl_secs: self.ttl_secs,
            response: Value::Object(response.clone()),
        }
    }
}

// =============================================================================
// Form Submission
// =============================================================================

/// Decoded form submission.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    /// Transaction id
    pub transaction_id: String,
    /// Subscriber URL
    pub subscriber_url: String,
    /// Form action id
    pub form_action_id: String,
    /// Form type (may be blank)
    pub form_type: String,
    /// Submission id (may be blank)
    pub submission_id: String,
    /// Opaque error payload
    pub error: Option<Value>,
}

impl FormSubmission {
    /// Decode a form submission from a JSON object.
    ///
    /// `submissionId` wins over `submission_id` unless it is blank.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidInput` if `transaction_id`,
    /// `subscriber_url` or `form_action_id` is not a string.
    pub fn from_object(form: &JsonObject) -> Result<Self, DomainError> {
        let required = |key: &str| form.get(key).and_then(Value::as_str).map(str::to_string);

        let (Some(transaction_id), Some(subscriber_url), Some(form_action_id)) = (
            required("transaction_id"),
            required("subscriber_url"),
            required("form_action_id"),
        ) else {
            return Err(DomainError::invalid(
                "Missing required form fields: transaction_id, subscriber_url, or form_action_id should be strings",
            ));
        };

        let mut submission_id = get_string(form, "submissionId");
        if submission_id.trim().is_empty() {
            submission_id = get_string(form, "submission_id");
        }

        Ok(Self {
            transaction_id,
            subscriber_url,
            form_action_id,
            form_type: get_string(form, "form_type"),
            submission_id,
            error: form.get("error").cloned(),
        })
    }

    /// Build the form-append transform for this submission.
    pub fn form_append(&self) -> FormAppend {
        FormAppend {
            form_id: self.form_action_id.clone(),
            form_type: self.form_type.clone(),
            submission_id: self.submission_id.clone(),
            error: self.error.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
