#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Route shapes and congestion coloring.
//!
//! A [`RouteProvider`] returns an encoded polyline plus per-maneuver
//! distance/time pairs. [`Route::from_response`] decodes the shape, splits
//! it into one [`RouteSegment`] per maneuver and colors each segment by its
//! estimated speed. The decoded points are what the corridor filter
//! buffers.

pub mod congestion;
pub mod here;

use std::iter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use traffic_map_geography::{haversine_miles, polyline_length_miles};
use traffic_map_geography_models::GeoPoint;
use traffic_map_polyline::{DecodeError, EncodeError};

pub use congestion::{ColorBand, colorize, speed_mph};
pub use here::{HereRouter, RouterConfig};

/// Slack used when matching maneuver distances to polyline vertices.
const SPLIT_EPSILON_MILES: f64 = 1e-6;

/// Errors from route computation or route shape handling.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The provider's polyline could not be decoded.
    #[error("route shape: {0}")]
    Decode(#[from] DecodeError),

    /// Re-encoding a multi-section shape failed.
    #[error("route shape: {0}")]
    Encode(#[from] EncodeError),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The routing API is rate limiting us.
    #[error("rate limited by routing provider (HTTP 429)")]
    RateLimited,

    /// The routing API answered with a non-success status.
    #[error("routing provider returned HTTP {status}")]
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

    /// The provider found no route between the endpoints.
    #[error("no route found")]
    NoRoute,

    /// The response body did not have the expected shape.
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what went wrong.
        message: String,
    },
}

/// One route step: how far it goes and how long it takes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Maneuver {
    /// Length of the step in miles.
    pub distance_miles: f64,
    /// Travel time in seconds, including current traffic.
    pub time_seconds: f64,
    /// Index of the polyline point where the step starts, when the
    /// provider reports it.
    pub offset: Option<usize>,
}

/// What a routing provider returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    /// Flexible-polyline encoded shape.
    pub polyline: String,
    /// Steps in travel order.
    pub maneuvers: Vec<Maneuver>,
    /// Typical (traffic-free) duration in seconds.
    pub duration_secs: f64,
    /// Duration with current traffic in seconds.
    pub realtime_duration_secs: f64,
}

/// Computes routes between two points.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Returns a short identifier for logging.
    fn id(&self) -> &str;

    /// Computes a driving route from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if the provider call fails or finds no route.
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteResponse, RouteError>;
}

/// A colored slice of the route covering one maneuver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSegment {
    /// Shape points of this slice; neighbours share their boundary point.
    pub coords: Vec<GeoPoint>,
    /// Estimated speed, `NaN` when unknown (serialized as `null`).
    pub speed_mph: f64,
    /// Congestion band for the speed.
    pub color_band: ColorBand,
}

/// Aggregate figures for a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    /// Shape length in miles.
    pub length_miles: f64,
    /// Typical duration in seconds.
    pub duration_secs: f64,
    /// Duration with current traffic in seconds.
    pub realtime_duration_secs: f64,
}

impl RouteSummary {
    /// Extra seconds caused by current traffic, never negative.
    #[must_use]
    pub fn delay_secs(&self) -> f64 {
        (self.realtime_duration_secs - self.duration_secs).max(0.0)
    }
}

/// A decoded, colored route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Decoded shape.
    pub points: Vec<GeoPoint>,
    /// One segment per maneuver.
    pub segments: Vec<RouteSegment>,
    /// Totals.
    pub summary: RouteSummary,
}

impl Route {
    /// Decodes and colors a provider response.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Decode`] if the polyline is malformed.
    pub fn from_response(response: &RouteResponse) -> Result<Self, RouteError> {
        let points = traffic_map_polyline::decode(&response.polyline)?;
        let segments = build_route_segments(&points, &response.maneuvers);
        let summary = RouteSummary {
            length_miles: polyline_length_miles(&points),
            duration_secs: response.duration_secs,
            realtime_duration_secs: response.realtime_duration_secs,
        };
        log::debug!(
            "decoded route: {} points, {} segments, {:.1} mi",
            points.len(),
            segments.len(),
            summary.length_miles
        );
        Ok(Self {
            points,
            segments,
            summary,
        })
    }
}

/// Splits a decoded shape into one colored segment per maneuver.
///
/// Maneuver offsets are used when every maneuver has one; otherwise the
/// shape is split by cumulative distance, with maneuver distances scaled
/// to the shape length. A shape with fewer than two points yields no
/// segments; no maneuvers yields a single segment of unknown speed.
#[must_use]
pub fn build_route_segments(points: &[GeoPoint], maneuvers: &[Maneuver]) -> Vec<RouteSegment> {
    if points.len() < 2 {
        return Vec::new();
    }
    if maneuvers.is_empty() {
        return vec![RouteSegment {
            coords: points.to_vec(),
            speed_mph: f64::NAN,
            color_band: ColorBand::Unknown,
        }];
    }

    let slices = if maneuvers.iter().all(|m| m.offset.is_some()) {
        split_by_offset(points, maneuvers)
    } else {
        split_by_distance(points, maneuvers)
    };

    slices
        .into_iter()
        .zip(maneuvers.iter().zip(colorize(maneuvers)))
        .map(|(coords, (maneuver, color_band))| RouteSegment {
            coords,
            speed_mph: speed_mph(maneuver.distance_miles, maneuver.time_seconds),
            color_band,
        })
        .collect()
}

fn split_by_offset(points: &[GeoPoint], maneuvers: &[Maneuver]) -> Vec<Vec<GeoPoint>> {
    let last = points.len() - 1;
    maneuvers
        .iter()
        .enumerate()
        .map(|(i, maneuver)| {
            let start = maneuver.offset.unwrap_or(0).min(last);
            let end = maneuvers
                .get(i + 1)
                .and_then(|next| next.offset)
                .map_or(last, |offset| offset.min(last))
                .max(start);
            points[start..=end].to_vec()
        })
        .collect()
}

fn split_by_distance(points: &[GeoPoint], maneuvers: &[Maneuver]) -> Vec<Vec<GeoPoint>> {
    let cumulative: Vec<f64> = iter::once(0.0)
        .chain(points.windows(2).scan(0.0, |acc, pair| {
            *acc += haversine_miles(pair[0], pair[1]);
            Some(*acc)
        }))
        .collect();
    let length = cumulative.last().copied().unwrap_or(0.0);
    let total: f64 = maneuvers.iter().map(|m| m.distance_miles.max(0.0)).sum();
    let scale = if total > 0.0 { length / total } else { 0.0 };

    let last = points.len() - 1;
    let mut travelled = 0.0;

    maneuvers
        .iter()
        .enumerate()
        .map(|(i, maneuver)| {
            let from = travelled;
            travelled += maneuver.distance_miles.max(0.0) * scale;

            let start = cumulative
                .partition_point(|&c| c <= from + SPLIT_EPSILON_MILES)
                .saturating_sub(1)
                .min(last);
            let end = if i + 1 == maneuvers.len() {
                last
            } else {
                cumulative
                    .partition_point(|&c| c < travelled - SPLIT_EPSILON_MILES)
                    .min(last)
            };
            points[start..=end.max(start)].to_vec()
        })
        .collect()
}

/// Renders segments as `GeoJSON` line features for a map overlay.
///
/// Each feature carries `colorBand`, `color` (hex) and `speedMph`
/// (`null` when unknown). Segments with fewer than two points are left
/// out since they cannot form a line.
#[must_use]
pub fn segments_to_geojson(segments: &[RouteSegment]) -> geojson::FeatureCollection {
    let features = segments
        .iter()
        .filter(|segment| segment.coords.len() >= 2)
        .map(|segment| {
            let line: geo::LineString<f64> = segment
                .coords
                .iter()
                .map(|p| geo::Coord { x: p.lng, y: p.lat })
                .collect();

            let mut properties = serde_json::Map::new();
            properties.insert(
                "colorBand".to_string(),
                serde_json::Value::String(segment.color_band.to_string()),
            );
            properties.insert(
                "color".to_string(),
                segment.color_band.hex_color().into(),
            );
            properties.insert(
                "speedMph".to_string(),
                serde_json::Number::from_f64(segment.speed_mph)
                    .map_or(serde_json::Value::Null, serde_json::Value::Number),
            );

            geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&line))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
