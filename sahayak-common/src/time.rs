//! Timestamp utilities
//!
//! All timestamps are persisted as fixed-width RFC 3339 UTC strings with
//! millisecond precision (`2024-05-01T09:30:00.000Z`), so string comparison in
//! SQL orders rows chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for storage
pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp; falls back to the Unix epoch for malformed values
pub fn from_db(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Parse an optional stored timestamp
pub fn from_db_opt(value: Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().map(from_db)
}

/// Storage-formatted cutoff `days` before now
pub fn days_ago(days: i64) -> String {
    to_db(now() - chrono::Duration::days(days))
}
