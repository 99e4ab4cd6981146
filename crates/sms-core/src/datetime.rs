//! UTC timestamp formats used in vendor signatures.

use time::format_description::FormatItem;
use time::macros::format_description;

pub use time::OffsetDateTime;

use crate::SmsError;

/// Export Format from time crate.
pub type Format = &'static [FormatItem<'static>];

/// Date format: "20220313"
pub const DATE: Format = format_description!("[year][month][day]");

/// Date format: "2022-03-13"
pub const DATE_DASHED: Format = format_description!("[year]-[month]-[day]");

/// Time format for ISO 8601: "20220313T072004Z"
pub const COMPACT_ISO8601: Format =
    format_description!("[year][month][day]T[hour][minute][second]Z");

/// Time format for ISO 8601: "2022-03-13T07:20:04Z"
pub const ISO8601: Format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");

/// Current UTC time.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    now().unix_timestamp()
}

/// Milliseconds since the Unix epoch.
pub fn now_unix_millis() -> i64 {
    (now().unix_timestamp_nanos() / 1_000_000) as i64
}

/// UTC time for a Unix timestamp in seconds.
pub fn from_unix(timestamp: i64) -> Result<OffsetDateTime, SmsError> {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| SmsError::Unexpected(format!("timestamp {} out of range: {}", timestamp, e)))
}

/// Format a UTC time with one of the formats above.
pub fn format(t: OffsetDateTime, format: Format) -> String {
    // The formats above only use components every OffsetDateTime carries.
    t.to_offset(time::UtcOffset::UTC)
        .format(format)
        .unwrap_or_default()
}
