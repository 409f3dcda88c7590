//! Timestamp parsing for the formats httpd writes into its error log.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use thiserror::Error;

/// `Wed Oct 14 10:00:00.123456 2020`, the classic `ErrorLogFormat` stamp.
static LEGACY_TS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<dname>\w+) (?P<mname>\w+) (?P<mday>\d{1,2}) (?P<hour>\d\d):(?P<minute>\d\d):(?P<second>\d\d)\.(?P<micros>\d+) (?P<year>\d+)$",
    )
    .unwrap()
});

const ISO_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Timestamp parsing errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// The value matches none of the supported formats.
    #[error("unrecognized timestamp: '{0}'")]
    Unrecognized(String),
    /// The month abbreviation is not an English month.
    #[error("unknown month '{month}' in timestamp '{value}'")]
    UnknownMonth { month: String, value: String },
    /// A field is outside its calendar range.
    #[error("timestamp out of range: '{0}'")]
    OutOfRange(String),
}

/// Parses an httpd timestamp into naive UTC time.
///
/// Supports ISO 8601 (`2024-05-01T10:00:00.123456`, also with a space
/// separator or an RFC 3339 offset, which is normalized to UTC) and the
/// legacy `Day Mon DD HH:MM:SS.micros YYYY` form. The day name of the legacy
/// form is not checked against the date.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, TimestampError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for format in ISO_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }

    parse_legacy(s)
}

fn parse_legacy(s: &str) -> Result<NaiveDateTime, TimestampError> {
    let caps = LEGACY_TS_RE
        .captures(s)
        .ok_or_else(|| TimestampError::Unrecognized(s.to_string()))?;

    let month_name = caps["mname"].to_ascii_lowercase();
    let month = (1u32..)
        .zip(MONTHS)
        .find_map(|(n, name)| (name == month_name).then_some(n))
        .ok_or_else(|| TimestampError::UnknownMonth {
            month: caps["mname"].to_string(),
            value: s.to_string(),
        })?;

    let out_of_range = || TimestampError::OutOfRange(s.to_string());
    let number = |name: &str| caps[name].parse::<u32>().map_err(|_| out_of_range());

    let year: i32 = caps["year"].parse().map_err(|_| out_of_range())?;
    let day = number("mday")?;
    let hour = number("hour")?;
    let minute = number("minute")?;
    let second = number("second")?;
    let micros = number("micros")?;
    if micros > 999_999 {
        return Err(out_of_range());
    }

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_micro_opt(hour, minute, second, micros))
        .ok_or_else(out_of_range)
}
