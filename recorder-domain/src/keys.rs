//! Cache key derivation.
//!
//! Two key families live in the shared store:
//! - `transactionId::subscriberUrl` for the transaction document
//! - `FLOW_STATUS_transactionId::subscriberUrl` for the advisory flow status
//!
//! Both return an empty string when either component is blank after
//! trimming; callers treat that as a rejected key.

/// Prefix of flow-status keys.
pub const FLOW_STATUS_PREFIX: &str = "FLOW_STATUS_";

/// Build the transaction document key.
///
/// Trims both inputs and strips exactly one trailing `/` from the URL.
pub fn transaction_key(transaction_id: &str, subscriber_url: &str) -> String {
    let transaction_id = transaction_id.trim();
    let subscriber_url = subscriber_url.trim();
    let subscriber_url = subscriber_url.strip_suffix('/').unwrap_or(subscriber_url);

    if transaction_id.is_empty() || subscriber_url.is_empty() {
        return String::new();
    }
    format!("{}::{}", transaction_id, subscriber_url)
}

/// Build the flow-status key.
///
/// Trims both inputs; the URL keeps any trailing slash.
pub fn flow_status_key(transaction_id: &str, subscriber_url: &str) -> String {
    let transaction_id = transaction_id.trim();
    let subscriber_url = subscriber_url.trim();

    if transaction_id.is_empty() || subscriber_url.is_empty() {
        return String::new();
    }
    format!("{}{}::{}", FLOW_STATUS_PREFIX, transaction_id, subscriber_url)
}
