//! Time range expressions
//!
//! `<start>` or `<start>-><end>`, each side an absolute timestamp or a duration
//! counted backward from the instant the expression is resolved.

#![warn(clippy::all, rust_2018_idioms)]

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::error::QueryError;

/// Separator between the start and end expressions
pub const RANGE_SEPARATOR: &str = "->";

/// Timestamp layouts accepted without an explicit offset (read as UTC)
const NAIVE_DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Absolute time range, both ends in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Start in epoch seconds, the unit the remote service expects
    pub fn start_seconds(&self) -> i64 {
        self.start.div_euclid(1000)
    }

    /// End in epoch seconds
    pub fn end_seconds(&self) -> i64 {
        self.end.div_euclid(1000)
    }
}

/// Resolve an expression relative to the current instant
pub fn resolve(expression: &str) -> Result<TimeRange, QueryError> {
    resolve_at(expression, Utc::now().timestamp_millis())
}

/// Resolve an expression relative to `now_ms`, captured once for both sides
pub fn resolve_at(expression: &str, now_ms: i64) -> Result<TimeRange, QueryError> {
    let expression = expression.trim();
    let (start_expression, end_expression) = match expression.split_once(RANGE_SEPARATOR) {
        Some((start, end)) => (start, Some(end)),
        None => (expression, None),
    };

    let start = resolve_side(start_expression, now_ms)?;
    let end = match end_expression.map(str::trim) {
        Some(end) if !end.is_empty() => resolve_side(end, now_ms)?,
        _ => now_ms,
    };

    Ok(TimeRange { start, end })
}

fn resolve_side(side: &str, now_ms: i64) -> Result<i64, QueryError> {
    let side = side.trim();
    if side.is_empty() {
        return Err(QueryError::InvalidTimeRange(
            "missing start of time range".to_string(),
        ));
    }

    if let Some(instant) = parse_absolute(side) {
        return Ok(instant);
    }

    parse_relative(side)
        .map(|millis| now_ms.saturating_sub(millis))
        .ok_or_else(|| {
            QueryError::InvalidTimeRange(format!(
                "'{}' is neither a timestamp nor a duration",
                side
            ))
        })
}

/// Parse an absolute timestamp into Unix milliseconds
fn parse_absolute(value: &str) -> Option<i64> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.timestamp_millis());
    }

    if let Ok(instant) = DateTime::parse_from_rfc2822(value) {
        return Some(instant.timestamp_millis());
    }

    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Parse a relative duration such as `2h`, `30m` or `1h 30m` into milliseconds
fn parse_relative(value: &str) -> Option<i64> {
    humantime::parse_duration(value)
        .ok()
        .and_then(|duration| i64::try_from(duration.as_millis()).ok())
}
