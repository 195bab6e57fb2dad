//! Timestamp rendering for assistance objects.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Sentinel returned for anything that cannot be parsed as a date/time.
pub const INVALID_DATE: &str = "Invalid date";

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Render a backend timestamp as a short date + time string.
///
/// Accepts an RFC 3339 string, a naive `YYYY-MM-DDTHH:MM:SS[.frac]`
/// string, or a `[year, month, day, hour, minute, second, nanos]` array
/// with six or seven elements. The array month is 1-based. Anything else
/// renders as [`INVALID_DATE`].
pub fn format_timestamp(input: &Value) -> String {
    match input {
        Value::String(text) => format_string(text),
        Value::Array(fields) => format_array(fields),
        _ => INVALID_DATE.to_string(),
    }
}

fn format_string(text: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return parsed.naive_local().format(DISPLAY_FORMAT).to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return parsed.format(DISPLAY_FORMAT).to_string();
    }
    INVALID_DATE.to_string()
}

fn format_array(fields: &[Value]) -> String {
    if fields.len() != 6 && fields.len() != 7 {
        return INVALID_DATE.to_string();
    }
    if fields.iter().any(|field| !field.is_number()) {
        return INVALID_DATE.to_string();
    }
    let parts: Option<Vec<i64>> = fields.iter().take(6).map(Value::as_i64).collect();
    match parts.as_deref().and_then(build_naive) {
        Some(datetime) => datetime.format(DISPLAY_FORMAT).to_string(),
        None => INVALID_DATE.to_string(),
    }
}

fn build_naive(parts: &[i64]) -> Option<NaiveDateTime> {
    let year = i32::try_from(parts[0]).ok()?;
    let month = u32::try_from(parts[1]).ok()?;
    let day = u32::try_from(parts[2]).ok()?;
    let hour = u32::try_from(parts[3]).ok()?;
    let minute = u32::try_from(parts[4]).ok()?;
    let second = u32::try_from(parts[5]).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}
