//! Time helpers for atelier
//!
//! Documents carry RFC 3339 timestamps in UTC; sharded databases are
//! partitioned by the calendar year of a document's date field.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};

/// Current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 timestamp used for `created_at`/`updated_at`.
///
/// Microsecond precision so that two successive updates to the same
/// document observably differ.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The current calendar year.
pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Calendar year of an ISO-8601 date or datetime string.
///
/// Falls back to the current year when the string does not parse;
/// shard routing must never fail on malformed input.
pub fn year_of_date(date: &str) -> i32 {
    parse_year(date).unwrap_or_else(current_year)
}

fn parse_year(date: &str) -> Option<i32> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.year());
    }
    let prefix = date.get(..10).unwrap_or(date);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .map(|d| d.year())
}
