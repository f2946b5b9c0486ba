#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reverse geocoding for incident labels.
//!
//! Purely advisory: a failed lookup means the selected incident is shown
//! without a nearest-address label, nothing more.

pub mod nominatim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use traffic_map_geography_models::GeoPoint;

pub use nominatim::NominatimReverse;

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Non-success HTTP status.
    #[error("geocoder returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
}

/// Reverse geocoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Whether incident labels are looked up at all.
    pub enabled: bool,
    /// Reverse endpoint URL.
    pub base_url: String,
    /// Minimum spacing between requests in milliseconds.
    pub rate_limit_ms: u64,
    /// `User-Agent` header; the public Nominatim instance requires one that
    /// identifies the application.
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            rate_limit_ms: 1_000,
            user_agent: concat!("traffic-map/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Looks up a human-readable label for a coordinate.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Returns the nearest address label, or `None` if there is nothing
    /// near `point`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the lookup fails.
    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>, GeocodeError>;
}
