#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic point and bounding box value types.
//!
//! Every other traffic-map crate speaks in terms of [`GeoPoint`] (WGS84
//! degrees) and [`BoundingBox`]. Neither type is ever persisted; both are
//! cheap `Copy` values derived on demand.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a coordinate falls outside the WGS84 range or is not
/// a finite number.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidCoordinateError {
    /// Latitude outside `[-90, 90]` or not finite.
    #[error("invalid latitude {0}: expected a finite value in [-90, 90]")]
    Latitude(f64),
    /// Longitude outside `[-180, 180]` or not finite.
    #[error("invalid longitude {0}: expected a finite value in [-180, 180]")]
    Longitude(f64),
}

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in `[-90, 90]`.
    pub lat: f64,
    /// Longitude in `[-180, 180]`.
    pub lng: f64,
}

impl GeoPoint {
    /// Creates a point, validating both axes.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either value is non-finite or
    /// out of range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinateError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(InvalidCoordinateError::Latitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(InvalidCoordinateError::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Latitude in radians.
    #[must_use]
    pub fn lat_radians(self) -> f64 {
        self.lat.to_radians()
    }

    /// Longitude in radians.
    #[must_use]
    pub fn lng_radians(self) -> f64 {
        self.lng.to_radians()
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

impl std::str::FromStr for GeoPoint {
    type Err = ParsePointError;

    /// Parses `"lat,lng"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| ParsePointError::Format(s.to_string()))?;
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|_| ParsePointError::Format(s.to_string()))?;
        let lng = lng
            .trim()
            .parse::<f64>()
            .map_err(|_| ParsePointError::Format(s.to_string()))?;
        Ok(Self::new(lat, lng)?)
    }
}

/// Error returned when parsing a `"lat,lng"` string fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParsePointError {
    /// The string was not two comma-separated numbers.
    #[error("expected \"lat,lng\", got {0:?}")]
    Format(String),
    /// The numbers parsed but are not valid coordinates.
    #[error(transparent)]
    Coordinate(#[from] InvalidCoordinateError),
}

/// An axis-aligned box in degrees.
///
/// Assumes the box does not cross the antimeridian, so `west <= east` in
/// practice and `south <= north` always.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum latitude.
    pub south: f64,
    /// Minimum longitude.
    pub west: f64,
    /// Maximum latitude.
    pub north: f64,
    /// Maximum longitude.
    pub east: f64,
}

impl BoundingBox {
    /// Creates a box from its four edges, swapping `south`/`north` if they
    /// were given in the wrong order.
    #[must_use]
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        if south <= north {
            Self {
                south,
                west,
                north,
                east,
            }
        } else {
            Self {
                south: north,
                west,
                north: south,
                east,
            }
        }
    }

    /// Returns the smallest box containing every point, or `None` for an
    /// empty slice.
    #[must_use]
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        for p in &points[1..] {
            bbox.south = bbox.south.min(p.lat);
            bbox.north = bbox.north.max(p.lat);
            bbox.west = bbox.west.min(p.lng);
            bbox.east = bbox.east.max(p.lng);
        }
        Some(bbox)
    }

    /// Whether `point` lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        (self.south..=self.north).contains(&point.lat)
            && (self.west..=self.east).contains(&point.lng)
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.south + self.north) / 2.0,
            lng: (self.west + self.east) / 2.0,
        }
    }

    /// Formats the box as `west,south,east,north`, the order most traffic
    /// APIs expect in a `bbox` query parameter.
    #[must_use]
    pub fn to_wsen_string(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}
