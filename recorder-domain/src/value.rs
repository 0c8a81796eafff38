//! Lenient accessors over untyped JSON objects.
//!
//! Inbound payloads are caller-shaped; a field of the wrong type reads as
//! its zero value instead of failing the whole event.

use serde_json::{Map, Value};

/// Read a string field. Non-string values read as empty.
pub fn get_string(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Read an integer field.
///
/// Accepts JSON numbers (fractions truncated) and numeric strings.
pub fn get_i64(object: &Map<String, Value>, key: &str) -> i64 {
    match object.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

/// Read a boolean field. Only JSON booleans count.
pub fn get_bool(object: &Map<String, Value>, key: &str) -> bool {
    matches!(object.get(key), Some(Value::Bool(true)))
}

/// Read a string field from the nested `context` object of a request body.
pub fn get_context_string(body: &Map<String, Value>, key: &str) -> String {
    match body.get("context") {
        Some(Value::Object(context)) => get_string(context, key),
        _ => String::new(),
    }
}
