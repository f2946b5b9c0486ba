//! The read-only view handed to the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use traffic_map_geography_models::GeoPoint;
use traffic_map_incident_models::Incident;
use traffic_map_route::Route;

/// Refresh state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// A refresh is in flight.
    Loading,
    /// The last refresh succeeded.
    Ready,
    /// The last refresh failed; earlier incidents are still shown.
    Error,
}

/// What the incident list is scoped to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Everything around the map center.
    #[default]
    Area,
    /// Only incidents inside the active route's corridor.
    Route,
}

/// The active route as shown on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteView {
    /// Route origin.
    pub from: GeoPoint,
    /// Route destination.
    pub to: GeoPoint,
    /// Decoded, colored route.
    pub route: Route,
}

/// A consistent view of the session.
///
/// `incidents` and `last_updated` always come from the same successful
/// refresh. On failure they are kept and `error_message` is set, so the
/// consumer can show the stale list with a "last updated" note.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Refresh state.
    pub status: Status,
    /// Scope of `incidents`.
    pub mode: Mode,
    /// Incidents from the last successful refresh.
    pub incidents: Vec<Incident>,
    /// Active route, if any.
    pub route: Option<RouteView>,
    /// When `incidents` were fetched.
    pub last_updated: Option<DateTime<Utc>>,
    /// Why the last refresh failed.
    pub error_message: Option<String>,
    /// Sequence number of the most recently started refresh.
    pub generation: u64,
}
