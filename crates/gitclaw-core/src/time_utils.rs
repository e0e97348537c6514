use chrono::{SecondsFormat, Utc};

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the current UTC time as an RFC 3339 / ISO-8601 string with millisecond precision.
pub fn current_rfc3339_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::current_rfc3339_timestamp;

    #[test]
    fn unit_current_rfc3339_timestamp_parses_back_as_utc() {
        let stamp = current_rfc3339_timestamp();
        assert!(stamp.ends_with('Z'), "expected UTC suffix, got {stamp}");
        let parsed = chrono::DateTime::parse_from_rfc3339(&stamp).expect("parse");
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }
}
