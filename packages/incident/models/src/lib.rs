#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Traffic incident severity, kind classification and canonical incident
//! types.
//!
//! Every upstream feed, whatever its payload shape, is normalized into
//! [`Incident`] values. Incidents are rebuilt from scratch on every refresh
//! and never patched in place.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use traffic_map_geography_models::GeoPoint;

/// Severity level for an incident, from 1 (low) to 4 (critical).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Level 1: little or no impact on traffic
    #[default]
    Low = 1,
    /// Level 2: minor slowdowns
    Minor = 2,
    /// Level 3: significant delays
    Major = 3,
    /// Level 4: road blocked or long delays
    Critical = 4,
}

impl Severity {
    /// Returns the numeric value of this severity level.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a severity level from a numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-4.
    pub const fn from_value(value: u8) -> Result<Self, InvalidSeverityError> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Minor),
            3 => Ok(Self::Major),
            4 => Ok(Self::Critical),
            _ => Err(InvalidSeverityError { value }),
        }
    }
}

/// Error returned when attempting to create a [`Severity`] from an invalid
/// numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSeverityError {
    /// The invalid severity value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidSeverityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid severity value {}: expected 1-4", self.value)
    }
}

impl std::error::Error for InvalidSeverityError {}

/// Coarse incident classification derived from free text.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentKind {
    /// Road or lane closures
    Closure,
    /// Construction, road work, maintenance
    Construction,
    /// Accidents, congestion, hazards and anything else
    TrafficOther,
}

impl IncidentKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Closure, Self::Construction, Self::TrafficOther]
    }
}

/// The two cross streets bounding an incident ("between X and Y").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossStreets {
    /// First cross street.
    pub from: String,
    /// Second cross street.
    pub to: String,
}

/// A traffic incident normalized to the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Upstream identifier, or a stable hash when the feed has none.
    pub id: String,
    /// Severity level.
    pub severity: Severity,
    /// Where the incident is.
    pub location: GeoPoint,
    /// Closure / construction / other.
    pub kind: IncidentKind,
    /// One-line summary.
    pub short_description: String,
    /// Longer description, when the feed provides one.
    pub full_description: Option<String>,
    /// Affected road (e.g. "I-405 N").
    pub road: Option<String>,
    /// Nearest cross street for "at"/"near" descriptions.
    pub cross_street: Option<String>,
    /// Bounding cross streets for "between X and Y" descriptions.
    pub between: Option<CrossStreets>,
    /// Direction token (`N`, `SB`, ...).
    pub direction: Option<String>,
    /// When the incident started.
    pub start_time: Option<DateTime<Utc>>,
    /// When the incident is expected to clear.
    pub end_time: Option<DateTime<Utc>>,
    /// Great-circle distance from the query center.
    pub distance_from_center_miles: f64,
    /// Estimated delay caused by the incident.
    pub delay_minutes: Option<i64>,
    /// Signed perpendicular distance to the active route (positive = left
    /// of travel). Only set on incidents that passed a corridor filter.
    pub route_offset_miles: Option<f64>,
}

impl Incident {
    /// Unsigned distance to the active route, if this incident was
    /// corridor-filtered.
    #[must_use]
    pub fn route_distance_miles(&self) -> Option<f64> {
        self.route_offset_miles.map(f64::abs)
    }
}

/// Orders incidents most severe first, then nearest to the query center.
#[must_use]
pub fn by_severity_then_center_distance(a: &Incident, b: &Incident) -> Ordering {
    b.severity.cmp(&a.severity).then_with(|| {
        a.distance_from_center_miles
            .total_cmp(&b.distance_from_center_miles)
    })
}

/// Orders incidents most severe first, then nearest to the route.
///
/// Incidents without a route offset sort after those with one.
#[must_use]
pub fn by_severity_then_route_distance(a: &Incident, b: &Incident) -> Ordering {
    b.severity.cmp(&a.severity).then_with(|| {
        match (a.route_distance_miles(), b.route_distance_miles()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    })
}
