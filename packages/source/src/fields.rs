//! Ordered field-alias lists for upstream incident records.
//!
//! Each logical field is looked up through a list of candidate dot paths;
//! the first path that resolves to a usable value wins. Keeping the order
//! in one table makes extraction precedence explicit and testable.

use chrono::{DateTime, Utc};
use serde_json::Value;
use traffic_map_geography_models::GeoPoint;
use traffic_map_incident_models::Severity;
use traffic_map_source_models::RawIncidentRecord;

use crate::parsing::{parse_severity, parse_timestamp, value_as_f64, value_as_id, value_as_text};

/// A latitude/longitude path pair read from the same record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordAlias {
    /// Path to the latitude value.
    pub lat: &'static str,
    /// Path to the longitude value.
    pub lng: &'static str,
}

/// Candidate paths for every field the normalizer reads.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    /// Upstream identifier.
    pub id: &'static [&'static str],
    /// Coordinate pairs, tried in order.
    pub coordinates: &'static [CoordAlias],
    /// Numeric or named severity.
    pub severity: &'static [&'static str],
    /// Incident type label.
    pub kind: &'static [&'static str],
    /// One-line summary.
    pub short_description: &'static [&'static str],
    /// Long description.
    pub full_description: &'static [&'static str],
    /// Free-text location ("I-5 N at Main St").
    pub location_description: &'static [&'static str],
    /// Start time.
    pub start_time: &'static [&'static str],
    /// End time.
    pub end_time: &'static [&'static str],
    /// Delay expressed in minutes.
    pub delay_minutes: &'static [&'static str],
    /// Delay expressed in seconds.
    pub delay_seconds: &'static [&'static str],
}

/// Aliases covering the traffic APIs the map talks to: flat `lat`/`lng`
/// records, nested `incidentDetails` objects, linear locations with shape
/// points and `GeoJSON` features.
pub const DEFAULT_ALIASES: FieldAliases = FieldAliases {
    id: &[
        "id",
        "incidentId",
        "incidentDetails.id",
        "properties.id",
        "eventId",
    ],
    coordinates: &[
        CoordAlias { lat: "lat", lng: "lng" },
        CoordAlias { lat: "latitude", lng: "longitude" },
        CoordAlias { lat: "lat", lng: "lon" },
        CoordAlias { lat: "location.lat", lng: "location.lng" },
        CoordAlias { lat: "location.latitude", lng: "location.longitude" },
        CoordAlias { lat: "point.lat", lng: "point.lng" },
        CoordAlias {
            lat: "location.shape.links.0.points.0.lat",
            lng: "location.shape.links.0.points.0.lng",
        },
        CoordAlias {
            lat: "geometry.coordinates.1",
            lng: "geometry.coordinates.0",
        },
        CoordAlias {
            lat: "geometry.coordinates.0.1",
            lng: "geometry.coordinates.0.0",
        },
    ],
    severity: &[
        "severity",
        "criticality",
        "incidentDetails.criticality",
        "impact",
    ],
    kind: &["type", "incidentType", "incidentDetails.type", "eventType"],
    short_description: &[
        "shortDesc",
        "shortDescription",
        "summary",
        "incidentDetails.summary.value",
    ],
    full_description: &[
        "fullDesc",
        "fullDescription",
        "description",
        "incidentDetails.description.value",
    ],
    location_description: &["locationDescription", "location.description.value"],
    start_time: &[
        "startTime",
        "start",
        "incidentDetails.startTime",
        "properties.startTime",
    ],
    end_time: &[
        "endTime",
        "end",
        "incidentDetails.endTime",
        "properties.endTime",
    ],
    delay_minutes: &["delayMinutes", "delayFromTypical", "delayFromFreeFlow"],
    delay_seconds: &["delay", "delaySeconds", "properties.delay"],
};

impl Default for FieldAliases {
    fn default() -> Self {
        DEFAULT_ALIASES
    }
}

impl FieldAliases {
    /// Upstream identifier, if any alias holds a string or integer.
    #[must_use]
    pub fn id(&self, record: &RawIncidentRecord) -> Option<String> {
        first_map(record, self.id, value_as_id)
    }

    /// First coordinate pair where both halves are finite numbers and form
    /// a valid point.
    #[must_use]
    pub fn location(&self, record: &RawIncidentRecord) -> Option<GeoPoint> {
        self.coordinates.iter().find_map(|alias| {
            let lat = record.get_path(alias.lat).and_then(value_as_f64)?;
            let lng = record.get_path(alias.lng).and_then(value_as_f64)?;
            GeoPoint::new(lat, lng).ok()
        })
    }

    /// Severity from the first alias that coerces to 1-4.
    #[must_use]
    pub fn severity(&self, record: &RawIncidentRecord) -> Option<Severity> {
        first_map(record, self.severity, parse_severity)
    }

    /// Incident type label.
    #[must_use]
    pub fn kind_label<'a>(&self, record: &'a RawIncidentRecord) -> Option<&'a str> {
        first_map(record, self.kind, value_as_text)
    }

    /// Short description text.
    #[must_use]
    pub fn short_description<'a>(&self, record: &'a RawIncidentRecord) -> Option<&'a str> {
        first_map(record, self.short_description, value_as_text)
    }

    /// Full description text.
    #[must_use]
    pub fn full_description<'a>(&self, record: &'a RawIncidentRecord) -> Option<&'a str> {
        first_map(record, self.full_description, value_as_text)
    }

    /// Free-text location description.
    #[must_use]
    pub fn location_description<'a>(&self, record: &'a RawIncidentRecord) -> Option<&'a str> {
        first_map(record, self.location_description, value_as_text)
    }

    /// Start time.
    #[must_use]
    pub fn start_time(&self, record: &RawIncidentRecord) -> Option<DateTime<Utc>> {
        first_map(record, self.start_time, parse_timestamp)
    }

    /// End time.
    #[must_use]
    pub fn end_time(&self, record: &RawIncidentRecord) -> Option<DateTime<Utc>> {
        first_map(record, self.end_time, parse_timestamp)
    }

    /// Delay in whole minutes (rounded). Minute aliases are preferred over
    /// second aliases; negative delays are dropped.
    #[must_use]
    pub fn delay_minutes(&self, record: &RawIncidentRecord) -> Option<i64> {
        let minutes = first_map(record, self.delay_minutes, value_as_f64).or_else(|| {
            first_map(record, self.delay_seconds, value_as_f64).map(|seconds| seconds / 60.0)
        })?;
        if minutes < 0.0 {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let rounded = minutes.round() as i64;
        Some(rounded)
    }
}

/// Applies `extract` to each alias in order and returns the first hit.
fn first_map<'a, T>(
    record: &'a RawIncidentRecord,
    paths: &[&str],
    extract: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    paths
        .iter()
        .filter_map(|path| record.get_path(path))
        .find_map(extract)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> RawIncidentRecord {
        RawIncidentRecord::new(value)
    }

    #[test]
    fn reads_flat_coordinates_from_strings() {
        let r = record(json!({ "lat": "34.05", "lng": "-118.24" }));
        let point = DEFAULT_ALIASES.location(&r).unwrap();
        assert!((point.lat - 34.05).abs() < 1e-9);
        assert!((point.lng + 118.24).abs() < 1e-9);
    }

    #[test]
    fn reads_geojson_point_in_lng_lat_order() {
        let r = record(json!({
            "geometry": { "type": "Point", "coordinates": [-118.24, 34.05] }
        }));
        let point = DEFAULT_ALIASES.location(&r).unwrap();
        assert!((point.lat - 34.05).abs() < 1e-9);
        assert!((point.lng + 118.24).abs() < 1e-9);
    }

    #[test]
    fn reads_first_shape_point_of_linear_location() {
        let r = record(json!({
            "location": { "shape": { "links": [
                { "points": [ { "lat": 40.7, "lng": -74.0 }, { "lat": 40.8, "lng": -74.1 } ] }
            ] } }
        }));
        let point = DEFAULT_ALIASES.location(&r).unwrap();
        assert!((point.lat - 40.7).abs() < 1e-9);
    }

    #[test]
    fn skips_half_resolved_and_out_of_range_pairs() {
        let r = record(json!({ "lat": 34.05, "longitude": -118.24 }));
        assert!(DEFAULT_ALIASES.location(&r).is_none());

        let r = record(json!({ "lat": 134.05, "lng": -118.24 }));
        assert!(DEFAULT_ALIASES.location(&r).is_none());

        let r = record(json!({ "lat": 34.05, "lng": "abc", "latitude": 34.0, "longitude": -118.0 }));
        let point = DEFAULT_ALIASES.location(&r).unwrap();
        assert!((point.lat - 34.0).abs() < 1e-9);
    }

    #[test]
    fn falls_through_invalid_severity_aliases() {
        let r = record(json!({ "severity": "bogus", "criticality": "major" }));
        assert_eq!(DEFAULT_ALIASES.severity(&r), Some(Severity::Major));

        let r = record(json!({ "incidentDetails": { "criticality": 4 } }));
        assert_eq!(DEFAULT_ALIASES.severity(&r), Some(Severity::Critical));
    }

    #[test]
    fn reads_nested_descriptions() {
        let r = record(json!({
            "incidentDetails": {
                "summary": { "value": "Closed" },
                "description": { "value": "Road closed due to flooding" }
            }
        }));
        assert_eq!(DEFAULT_ALIASES.short_description(&r), Some("Closed"));
        assert_eq!(
            DEFAULT_ALIASES.full_description(&r),
            Some("Road closed due to flooding")
        );
    }

    #[test]
    fn prefers_minutes_then_converts_seconds() {
        let r = record(json!({ "delayMinutes": 12, "delay": 60 }));
        assert_eq!(DEFAULT_ALIASES.delay_minutes(&r), Some(12));

        let r = record(json!({ "delay": 390 }));
        assert_eq!(DEFAULT_ALIASES.delay_minutes(&r), Some(7));

        let r = record(json!({ "delayMinutes": -3 }));
        assert_eq!(DEFAULT_ALIASES.delay_minutes(&r), None);
    }

    #[test]
    fn reads_numeric_ids() {
        let r = record(json!({ "incidentId": 98765 }));
        assert_eq!(DEFAULT_ALIASES.id(&r), Some("98765".to_string()));
        assert_eq!(DEFAULT_ALIASES.id(&record(json!({}))), None);
    }
}
