//! Audit Recorder Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains cache key derivation, the transaction document model,
//! merge transforms, and inbound event decoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod document;
pub mod error;
pub mod event;
pub mod keys;
pub mod time;
pub mod value;

// Re-export commonly used types
pub use document::{
    append_message_id, message_ids, ApiEntry, ApiListEntry, AuditAppend, FormAppend, FormEntry,
    JsonObject,
};
pub use error::DomainError;
pub use event::{AuditEvent, DerivedFields, FormSubmission};
pub use keys::{flow_status_key, transaction_key, FLOW_STATUS_PREFIX};
