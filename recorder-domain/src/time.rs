//! Timestamp formats written into transaction documents.

use chrono::{SecondsFormat, Utc};

/// Current UTC time as RFC 3339 with nanosecond precision (`...123456789Z`).
///
/// Used for default event timestamps and API entry server timestamps.
pub fn rfc3339_nanos_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Current UTC time with millisecond precision (`2006-01-02T15:04:05.000Z`).
///
/// Used for FORM entry server timestamps.
pub fn iso_millis_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn test_iso_millis_shape() {
        let ts = iso_millis_now();
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[19..20], ".");
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_rfc3339_nanos_parses() {
        let ts = rfc3339_nanos_now();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
