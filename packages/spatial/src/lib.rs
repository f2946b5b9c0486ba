#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Route corridor construction and incident filtering.
//!
//! A corridor is the route polyline buffered by a width on each side. It is
//! stored as one capsule polygon per route segment (a rectangle with
//! semicircular caps) in an R-tree, so membership is an envelope lookup
//! followed by point-in-polygon tests against the few capsules near the
//! point. Capsules are built in a local miles plane and stored in degrees.

use std::f64::consts::PI;

use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Polygon};
use rstar::{AABB, RTree, RTreeObject};
use traffic_map_geography::{LocalProjection, signed_offset_to_polyline_miles};
use traffic_map_geography_models::GeoPoint;
use traffic_map_incident_models::{Incident, by_severity_then_route_distance};

/// Corridors narrower than this are widened to it.
pub const MIN_CORRIDOR_WIDTH_MILES: f64 = 0.2;

/// Vertices per semicircular cap.
const CAP_STEPS: usize = 16;

/// One buffered route segment stored in the R-tree.
struct CorridorSegment {
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl RTreeObject for CorridorSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// The region within `width_miles` of a route.
///
/// Built once per route and width; reusable across refreshes.
pub struct Corridor {
    route: Vec<GeoPoint>,
    width_miles: f64,
    segments: RTree<CorridorSegment>,
}

impl std::fmt::Debug for Corridor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Corridor")
            .field("route_points", &self.route.len())
            .field("width_miles", &self.width_miles)
            .field("segments", &self.segments.size())
            .finish()
    }
}

impl Corridor {
    /// Buffers `route` by `width_miles` on each side.
    ///
    /// Widths below [`MIN_CORRIDOR_WIDTH_MILES`] (including non-finite
    /// ones) are raised to it. Returns `None` for a route of fewer than two
    /// points.
    #[must_use]
    pub fn new(route: &[GeoPoint], width_miles: f64) -> Option<Self> {
        if route.len() < 2 {
            return None;
        }
        let width_miles = if width_miles.is_finite() {
            width_miles.max(MIN_CORRIDOR_WIDTH_MILES)
        } else {
            MIN_CORRIDOR_WIDTH_MILES
        };

        let entries = route
            .windows(2)
            .map(|pair| {
                let polygon = capsule(pair[0], pair[1], width_miles);
                CorridorSegment {
                    envelope: compute_envelope(&polygon),
                    polygon,
                }
            })
            .collect();

        Some(Self {
            route: route.to_vec(),
            width_miles,
            segments: RTree::bulk_load(entries),
        })
    }

    /// Buffer width in miles after flooring.
    #[must_use]
    pub const fn width_miles(&self) -> f64 {
        self.width_miles
    }

    /// The route this corridor was built around.
    #[must_use]
    pub fn route(&self) -> &[GeoPoint] {
        &self.route
    }

    /// Whether `point` lies inside the corridor.
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        let geo_point = geo::Point::new(point.lng, point.lat);
        let query_env = AABB::from_point([point.lng, point.lat]);

        self.segments
            .locate_in_envelope_intersecting(&query_env)
            .any(|segment| segment.polygon.contains(&geo_point))
    }

    /// Signed perpendicular distance from `point` to the route (positive =
    /// left of travel).
    #[must_use]
    pub fn offset_miles(&self, point: GeoPoint) -> Option<f64> {
        signed_offset_to_polyline_miles(point, &self.route)
    }

    /// Keeps incidents inside the corridor, annotates each with its route
    /// offset and orders them most severe first, then nearest to the route.
    #[must_use]
    pub fn filter(&self, incidents: Vec<Incident>) -> Vec<Incident> {
        let total = incidents.len();
        let mut kept: Vec<Incident> = incidents
            .into_iter()
            .filter(|incident| self.contains(incident.location))
            .map(|mut incident| {
                incident.route_offset_miles = self.offset_miles(incident.location);
                incident
            })
            .collect();

        kept.sort_by(by_severity_then_route_distance);

        log::debug!(
            "corridor ({:.2} mi) kept {} of {total} incidents",
            self.width_miles,
            kept.len()
        );

        kept
    }

    /// The corridor as a `GeoJSON` feature collection: the buffered area as
    /// one `MultiPolygon` feature and the route as a `LineString` feature.
    #[must_use]
    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        let area = MultiPolygon(
            self.segments
                .iter()
                .map(|segment| segment.polygon.clone())
                .collect(),
        );
        let line: LineString<f64> = self
            .route
            .iter()
            .map(|p| Coord { x: p.lng, y: p.lat })
            .collect();

        let mut area_properties = serde_json::Map::new();
        area_properties.insert("kind".to_string(), "corridor".into());
        area_properties.insert("widthMiles".to_string(), self.width_miles.into());

        let mut route_properties = serde_json::Map::new();
        route_properties.insert("kind".to_string(), "route".into());

        geojson::FeatureCollection {
            bbox: None,
            features: vec![
                feature(geojson::Value::from(&area), area_properties),
                feature(geojson::Value::from(&line), route_properties),
            ],
            foreign_members: None,
        }
    }
}

/// Filters `incidents` to the corridor of `route`.
///
/// A route of fewer than two points has no corridor; the incidents are
/// returned unfiltered and unannotated.
#[must_use]
pub fn filter_to_corridor(
    route: &[GeoPoint],
    width_miles: f64,
    incidents: Vec<Incident>,
) -> Vec<Incident> {
    match Corridor::new(route, width_miles) {
        Some(corridor) => corridor.filter(incidents),
        None => {
            log::debug!(
                "route has {} point(s), skipping corridor filter",
                route.len()
            );
            incidents
        }
    }
}

/// Builds the capsule around segment `a`-`b` in degrees.
fn capsule(a: GeoPoint, b: GeoPoint, width_miles: f64) -> Polygon<f64> {
    let projection = LocalProjection::centered_at(a);
    let (ax, ay) = projection.project(a);
    let (bx, by) = projection.project(b);

    let (dx, dy) = (bx - ax, by - ay);
    let length = dx.hypot(dy);
    let (ux, uy) = if length > f64::EPSILON {
        (dx / length, dy / length)
    } else {
        (1.0, 0.0)
    };
    // Angle of the left normal (-uy, ux); each cap sweeps clockwise from
    // one side of the segment to the other.
    let base = ux.atan2(-uy);

    let mut ring = Vec::with_capacity(2 * (CAP_STEPS + 1));
    for (cx, cy, offset) in [(bx, by, 0.0), (ax, ay, PI)] {
        for step in 0..=CAP_STEPS {
            #[allow(clippy::cast_precision_loss)]
            let theta = base - offset - PI * (step as f64) / (CAP_STEPS as f64);
            let (x, y) = (
                width_miles.mul_add(theta.cos(), cx),
                width_miles.mul_add(theta.sin(), cy),
            );
            let point = projection.unproject((x, y));
            ring.push(Coord {
                x: point.lng,
                y: point.lat,
            });
        }
    }

    Polygon::new(LineString::new(ring), vec![])
}

/// Compute the bounding box envelope for a [`Polygon`].
fn compute_envelope(polygon: &Polygon<f64>) -> AABB<[f64; 2]> {
    polygon.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

fn feature(value: geojson::Value, properties: geojson::JsonObject) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use traffic_map_incident_models::{IncidentKind, Severity};

    use super::*;

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng).unwrap()
    }

    /// An eastbound route along the 34th parallel, about 11.5 miles long.
    fn eastbound() -> Vec<GeoPoint> {
        vec![point(34.0, -118.5), point(34.0, -118.4), point(34.0, -118.3)]
    }

    fn incident(id: &str, severity: Severity, lat: f64, lng: f64) -> Incident {
        Incident {
            id: id.to_string(),
            severity,
            location: point(lat, lng),
            kind: IncidentKind::TrafficOther,
            short_description: id.to_string(),
            full_description: None,
            road: None,
            cross_street: None,
            between: None,
            direction: None,
            start_time: None,
            end_time: None,
            distance_from_center_miles: 0.0,
            delay_minutes: None,
            route_offset_miles: None,
        }
    }

    #[test]
    fn contains_points_within_width() {
        let corridor = Corridor::new(&eastbound(), 1.0).unwrap();
        // ~0.69 mi north and south of the route.
        assert!(corridor.contains(point(34.01, -118.42)));
        assert!(corridor.contains(point(33.99, -118.42)));
        // ~1.38 mi away.
        assert!(!corridor.contains(point(34.02, -118.42)));
        assert!(!corridor.contains(point(33.98, -118.42)));
    }

    #[test]
    fn caps_extend_past_route_ends() {
        let corridor = Corridor::new(&eastbound(), 1.0).unwrap();
        // ~0.57 mi past the east end.
        assert!(corridor.contains(point(34.0, -118.29)));
        // ~1.15 mi past it.
        assert!(!corridor.contains(point(34.0, -118.28)));
    }

    #[test]
    fn covers_the_outside_of_a_corner() {
        let route = vec![point(34.0, -118.5), point(34.0, -118.4), point(34.1, -118.4)];
        let corridor = Corridor::new(&route, 1.0).unwrap();
        // South-east of the corner, ~0.6 mi diagonally from it.
        assert!(corridor.contains(point(33.994, -118.393)));
        assert!(!corridor.contains(point(33.98, -118.38)));
    }

    #[test]
    fn floors_narrow_widths() {
        let corridor = Corridor::new(&eastbound(), 0.0).unwrap();
        assert!((corridor.width_miles() - MIN_CORRIDOR_WIDTH_MILES).abs() < f64::EPSILON);
        // ~0.1 mi and ~0.3 mi off the route.
        assert!(corridor.contains(point(34.001_45, -118.42)));
        assert!(!corridor.contains(point(34.004_35, -118.42)));

        let corridor = Corridor::new(&eastbound(), f64::NAN).unwrap();
        assert!((corridor.width_miles() - MIN_CORRIDOR_WIDTH_MILES).abs() < f64::EPSILON);
    }

    #[test]
    fn offsets_are_signed_by_side() {
        let corridor = Corridor::new(&eastbound(), 1.0).unwrap();
        let north = corridor.offset_miles(point(34.005, -118.42)).unwrap();
        let south = corridor.offset_miles(point(33.995, -118.42)).unwrap();
        assert!(north > 0.0, "north of eastbound travel is left: {north}");
        assert!(south < 0.0, "south of eastbound travel is right: {south}");
        assert!((north + south).abs() < 1e-3);
    }

    #[test]
    fn filters_and_ranks_by_route_distance() {
        let incidents = vec![
            incident("far-minor", Severity::Minor, 34.008, -118.42),
            incident("outside", Severity::Critical, 34.05, -118.42),
            incident("near-minor", Severity::Minor, 33.998, -118.35),
            incident("major", Severity::Major, 34.012, -118.45),
        ];

        let kept = filter_to_corridor(&eastbound(), 1.0, incidents);
        let ids: Vec<&str> = kept.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["major", "near-minor", "far-minor"]);
        assert!(kept.iter().all(|i| i.route_offset_miles.is_some()));

        for pair in kept.windows(2) {
            if pair[0].severity == pair[1].severity {
                assert!(
                    pair[0].route_distance_miles().unwrap()
                        <= pair[1].route_distance_miles().unwrap()
                );
            }
        }
    }

    #[test]
    fn short_routes_return_input_unfiltered() {
        let incidents = vec![
            incident("a", Severity::Low, 10.0, 10.0),
            incident("b", Severity::Critical, 34.0, -118.4),
        ];
        let single = [point(34.0, -118.4)];

        let kept = filter_to_corridor(&single, 1.0, incidents.clone());
        assert_eq!(kept, incidents);

        assert!(filter_to_corridor(&[], 1.0, incidents.clone()).len() == 2);
        assert!(Corridor::new(&single, 1.0).is_none());
    }

    #[test]
    fn empty_incident_list_is_empty() {
        assert!(filter_to_corridor(&eastbound(), 1.0, Vec::new()).is_empty());
    }

    #[test]
    fn duplicate_route_points_do_not_break_the_buffer() {
        let route = vec![point(34.0, -118.5), point(34.0, -118.5), point(34.0, -118.4)];
        let corridor = Corridor::new(&route, 0.5).unwrap();
        assert!(corridor.contains(point(34.003, -118.5)));
    }

    #[test]
    fn exports_area_and_route_features() {
        let corridor = Corridor::new(&eastbound(), 1.0).unwrap();
        let collection = corridor.to_geojson();
        assert_eq!(collection.features.len(), 2);

        let area = collection.features[0].geometry.as_ref().unwrap();
        match &area.value {
            geojson::Value::MultiPolygon(polygons) => assert_eq!(polygons.len(), 2),
            other => panic!("expected MultiPolygon, got {other:?}"),
        }
        let route = collection.features[1].geometry.as_ref().unwrap();
        match &route.value {
            geojson::Value::LineString(points) => assert_eq!(points.len(), 3),
            other => panic!("expected LineString, got {other:?}"),
        }
    }
}
