#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raw upstream incident records and incident feed configuration.
//!
//! Traffic APIs disagree on almost every field name, so a record is kept as
//! the untouched JSON object it arrived as. Field extraction happens later,
//! in the normalizer, through ordered lists of candidate paths.

use serde::{Deserialize, Serialize};

/// One incident exactly as the upstream feed returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawIncidentRecord(serde_json::Value);

impl RawIncidentRecord {
    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Navigates a dot-separated path (e.g. `"location.shape.links.0"`).
    ///
    /// Numeric segments index into arrays.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&serde_json::Value> {
        resolve_path(&self.0, path)
    }
}

impl From<serde_json::Value> for RawIncidentRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Navigates a dot-separated path into a [`serde_json::Value`].
///
/// Object keys and array indices are both accepted as segments. An empty
/// path returns `value` itself.
#[must_use]
pub fn resolve_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            other => other.get(segment)?,
        };
    }
    Some(current)
}

/// Configuration for an HTTP incident feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Incidents endpoint URL.
    pub api_url: String,
    /// Dot path to the records array in the response body. Empty for a
    /// bare array.
    pub records_path: String,
    /// Query parameter carrying the `west,south,east,north` box.
    pub bbox_param: String,
    /// Query parameter carrying the comma-joined filter list.
    pub filters_param: String,
    /// Environment variable holding the API key, if the feed needs one.
    pub api_key_env: Option<String>,
    /// Query parameter the API key is sent in.
    pub api_key_param: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            records_path: "results".to_string(),
            bbox_param: "bbox".to_string(),
            filters_param: "filters".to_string(),
            api_key_env: None,
            api_key_param: "apiKey".to_string(),
            timeout_secs: 15,
        }
    }
}
