//! Shared value coercion for loosely-typed upstream payloads.
//!
//! Feeds send numbers as strings, timestamps in several formats and
//! severities as either numbers or names. These helpers accept all of them
//! and return `None` for anything they cannot interpret.

use chrono::{DateTime, NaiveDateTime, Utc};
use traffic_map_incident_models::Severity;

/// Epoch values above this are treated as milliseconds rather than seconds.
const EPOCH_MS_THRESHOLD: f64 = 100_000_000_000.0;

/// Reads a finite number from a JSON number or a numeric string.
#[must_use]
pub fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Reads a non-empty, trimmed string.
#[must_use]
pub fn value_as_text(value: &serde_json::Value) -> Option<&str> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then_some(s)
}

/// Reads an identifier from a string or integer value.
#[must_use]
pub fn value_as_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Coerces a numeric or named severity into the closed 1-4 scale.
///
/// Numbers must be integral and in range; names follow common traffic API
/// criticality labels. Anything else yields `None`.
#[must_use]
pub fn parse_severity(value: &serde_json::Value) -> Option<Severity> {
    if let Some(number) = value_as_f64(value) {
        if number.fract() != 0.0 || !(1.0..=4.0).contains(&number) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let level = number as u8;
        return Severity::from_value(level).ok();
    }
    let name = value.as_str()?.trim().to_lowercase();
    match name.as_str() {
        "critical" | "severe" | "blocking" => Some(Severity::Critical),
        "major" | "high" | "serious" => Some(Severity::Major),
        "minor" | "moderate" | "medium" => Some(Severity::Minor),
        "low" | "lowimpact" | "low_impact" | "minimal" => Some(Severity::Low),
        _ => None,
    }
}

/// Parses a timestamp from an ISO 8601 / RFC 3339 string or an epoch
/// number (seconds or milliseconds).
#[must_use]
pub fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_timestamp_str(s.trim()),
        serde_json::Value::Number(n) => parse_epoch(n.as_f64()?),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    s.parse::<f64>().ok().and_then(parse_epoch)
}

fn parse_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let ms = if value > EPOCH_MS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    #[allow(clippy::cast_possible_truncation)]
    let ms = ms as i64;
    DateTime::from_timestamp_millis(ms)
}
