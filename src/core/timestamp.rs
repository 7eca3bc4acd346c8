// LogPulse - core/timestamp.rs
//
// Time resolution for access-log time tokens.
//
// Order of attempts for a textual token:
//   1. Epoch seconds or milliseconds (digits with at most one '.').
//      Runs before any layout so "1696950936" is never mistaken for a date.
//   2. The site's custom layout (chrono strftime syntax), if configured.
//   3. The canonical access-log layout `10/Oct/2023:13:55:36 -0700`.
//   4. RFC 3339 (fractional seconds and offset).
//   5. Naive ISO-8601 without offset, interpreted as UTC.
//
// JSON time values are accepted as numbers (epoch heuristic) or strings
// (the chain above).

use crate::util::constants::{
    ACCESS_LOG_TIME_LAYOUT, EPOCH_MILLIS_THRESHOLD, NAIVE_ISO_TIME_LAYOUT,
};
use crate::util::error::TimeError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Resolve a raw time token to an absolute UTC instant.
pub fn resolve_time(raw: &str, custom_layout: Option<&str>) -> Result<DateTime<Utc>, TimeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TimeError::Empty);
    }

    if let Some(ts) = parse_epoch_token(trimmed) {
        return Ok(ts);
    }

    let mut tried = 0usize;

    if let Some(layout) = custom_layout.map(str::trim).filter(|l| !l.is_empty()) {
        tried += 1;
        if let Some(ts) = parse_with_layout(trimmed, layout) {
            return Ok(ts);
        }
    }

    tried += 1;
    if let Ok(dt) = DateTime::parse_from_str(trimmed, ACCESS_LOG_TIME_LAYOUT) {
        return Ok(dt.with_timezone(&Utc));
    }

    tried += 1;
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    tried += 1;
    if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, NAIVE_ISO_TIME_LAYOUT) {
        return Ok(ndt.and_utc());
    }

    Err(TimeError::Unparseable {
        raw: trimmed.to_string(),
        layouts_tried: tried,
    })
}

/// Resolve a JSON time value: numbers are epochs, strings go through
/// `resolve_time`.
pub fn resolve_json_time(
    value: &Value,
    custom_layout: Option<&str>,
) -> Result<DateTime<Utc>, TimeError> {
    match value {
        Value::Number(n) => {
            let ts = if let Some(i) = n.as_i64() {
                epoch_from_int(i)
            } else {
                n.as_f64().and_then(epoch_from_float)
            };
            ts.ok_or_else(|| TimeError::Unparseable {
                raw: n.to_string(),
                layouts_tried: 0,
            })
        }
        Value::String(s) => resolve_time(s, custom_layout),
        Value::Null => Err(TimeError::Empty),
        _ => Err(TimeError::UnsupportedValue),
    }
}

/// Interpret a token made only of digits and at most one '.' as an epoch.
fn parse_epoch_token(raw: &str) -> Option<DateTime<Utc>> {
    let mut dots = 0;
    let mut digits = 0;
    for c in raw.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return None,
        }
    }
    if digits == 0 || dots > 1 {
        return None;
    }

    if dots == 0 {
        if let Ok(i) = raw.parse::<i64>() {
            return epoch_from_int(i);
        }
    }
    raw.parse::<f64>().ok().and_then(epoch_from_float)
}

fn epoch_from_int(value: i64) -> Option<DateTime<Utc>> {
    if value as f64 > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn epoch_from_float(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let seconds = if value > EPOCH_MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    };
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Parse with a user layout: offset-aware first, then naive date-time as
/// UTC, then date-only as midnight UTC.
fn parse_with_layout(raw: &str, layout: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(raw, layout) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, layout) {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(raw, layout)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}
