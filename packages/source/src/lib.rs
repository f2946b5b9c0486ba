#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Traffic incident feed fetching and normalization logic.
//!
//! An [`IncidentFeed`] returns raw, provider-shaped records for a bounding
//! box. [`normalize::normalize`] turns those into canonical
//! [`Incident`](traffic_map_incident_models::Incident) values: severity
//! coerced, kind classified from free text, road and cross streets parsed
//! out of the description, and duplicates collapsed.

pub mod feed;
pub mod fields;
pub mod normalize;
pub mod parsing;
pub mod retry;
pub mod road_parsing;
pub mod type_mapping;

use async_trait::async_trait;
use traffic_map_geography_models::BoundingBox;
use traffic_map_source_models::RawIncidentRecord;

pub use feed::HttpIncidentFeed;
pub use normalize::{NormalizeStats, normalize, normalize_with_stats};

/// Errors that can occur while fetching from an incident feed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream API is rate limiting us.
    #[error("rate limited by upstream (HTTP 429)")]
    RateLimited,

    /// The upstream API answered with a non-success status.
    #[error("upstream returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The configured API key environment variable is not set.
    #[error("API key environment variable {var} is not set")]
    MissingApiKey {
        /// Name of the environment variable.
        var: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what went wrong.
        message: String,
    },
}

/// A source of raw incident records.
///
/// Implementations only fetch; normalization is always done by the caller
/// so every feed goes through the same canonicalization.
#[async_trait]
pub trait IncidentFeed: Send + Sync {
    /// Returns a short identifier for logging (e.g., `"here_traffic"`).
    fn id(&self) -> &str;

    /// Fetches raw incident records inside `bbox`, restricted to `filters`
    /// when the feed supports them.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the upstream call fails or its response
    /// cannot be read.
    async fn fetch(
        &self,
        bbox: BoundingBox,
        filters: &[String],
    ) -> Result<Vec<RawIncidentRecord>, SourceError>;
}
