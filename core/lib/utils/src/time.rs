use chrono::{SecondsFormat, Utc};

/// Current time as ISO-8601 with second precision and a `Z` suffix, the
/// format used for `transactionTime` in message metadata.
pub fn iso8601_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
