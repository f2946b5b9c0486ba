#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Distance and bounding-box math for the traffic correlation engine.
//!
//! Great-circle distance is used for "how far is this incident from the map
//! center"; everything measured against a route (point-to-segment,
//! corridor offsets) uses an equirectangular projection, which is accurate
//! enough at corridor scale (tens of miles) and far cheaper.

pub mod projection;

use traffic_map_geography_models::{BoundingBox, GeoPoint};

pub use projection::{LocalProjection, closest_point_on_segment};

/// Mean Earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.7613;

/// Miles spanned by one degree of latitude (and of longitude at the equator).
pub const MILES_PER_DEGREE: f64 = EARTH_RADIUS_MILES * std::f64::consts::PI / 180.0;

/// Rough miles-per-degree-latitude used for bounding-box padding.
const BBOX_MILES_PER_DEGREE: f64 = 69.0;

/// Cosine floor for longitude padding so boxes near the poles stay finite.
const MIN_COS_LAT: f64 = 0.2;

/// Great-circle distance between two points in miles.
#[must_use]
pub fn haversine_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat_radians().cos() * b.lat_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Distance in miles from `p` to the segment `a`-`b`.
///
/// The projection parameter is clamped to `[0, 1]`, so points beyond either
/// end measure to the nearest endpoint rather than to the infinite line.
#[must_use]
pub fn point_to_segment_miles(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> f64 {
    let projection = LocalProjection::centered_at(p);
    let (x, y) = closest_point_on_segment((0.0, 0.0), projection.project(a), projection.project(b));
    x.hypot(y)
}

/// Minimum distance in miles from `p` to any segment of `poly`.
///
/// Returns `None` when the polyline has fewer than two points.
#[must_use]
pub fn point_to_polyline_miles(p: GeoPoint, poly: &[GeoPoint]) -> Option<f64> {
    poly.windows(2)
        .map(|pair| point_to_segment_miles(p, pair[0], pair[1]))
        .min_by(f64::total_cmp)
}

/// Signed distance in miles from `p` to the nearest segment of `poly`.
///
/// Positive values lie to the left of the direction of travel, negative
/// values to the right. Returns `None` when the polyline has fewer than two
/// points.
#[must_use]
pub fn signed_offset_to_polyline_miles(p: GeoPoint, poly: &[GeoPoint]) -> Option<f64> {
    let projection = LocalProjection::centered_at(p);
    poly.windows(2)
        .map(|pair| {
            let a = projection.project(pair[0]);
            let b = projection.project(pair[1]);
            let (x, y) = closest_point_on_segment((0.0, 0.0), a, b);
            let distance = x.hypot(y);
            // p sits at the origin, so (p - a) = -a.
            let cross = (b.1 - a.1) * a.0 - (b.0 - a.0) * a.1;
            (distance, if cross < 0.0 { -distance } else { distance })
        })
        .min_by(|l, r| l.0.total_cmp(&r.0))
        .map(|(_, signed)| signed)
}

/// Total length of a polyline in miles.
#[must_use]
pub fn polyline_length_miles(poly: &[GeoPoint]) -> f64 {
    poly.windows(2)
        .map(|pair| haversine_miles(pair[0], pair[1]))
        .sum()
}

/// Derives a query box around `center` from a map zoom level.
///
/// The half-extent is `0.5 / 2^(zoom - 11)` degrees on both axes. This is
/// not a tile-projection formula; it only has to be big enough to cover the
/// visible map.
#[must_use]
pub fn bounding_box_from_zoom(center: GeoPoint, zoom: i32) -> BoundingBox {
    let offset = 0.5 / 2f64.powi(zoom - 11);
    BoundingBox::new(
        center.lat - offset,
        center.lng - offset,
        center.lat + offset,
        center.lng + offset,
    )
}

/// Derives a query box that covers a circle of `radius_miles` around
/// `center`.
#[must_use]
pub fn bounding_box_from_radius_miles(center: GeoPoint, radius_miles: f64) -> BoundingBox {
    let lat_offset = radius_miles / BBOX_MILES_PER_DEGREE;
    let lng_offset = lng_offset_degrees(center.lat, radius_miles);
    BoundingBox::new(
        center.lat - lat_offset,
        center.lng - lng_offset,
        center.lat + lat_offset,
        center.lng + lng_offset,
    )
}

/// Grows `bbox` by `miles` on every side.
#[must_use]
pub fn expand_bounding_box_miles(bbox: BoundingBox, miles: f64) -> BoundingBox {
    let lat_offset = miles / BBOX_MILES_PER_DEGREE;
    // Pad longitude using the edge furthest from the equator so the whole
    // box gets at least `miles` of margin.
    let widest_lat = bbox.south.abs().max(bbox.north.abs());
    let lng_offset = lng_offset_degrees(widest_lat, miles);
    BoundingBox::new(
        (bbox.south - lat_offset).max(-90.0),
        bbox.west - lng_offset,
        (bbox.north + lat_offset).min(90.0),
        bbox.east + lng_offset,
    )
}

fn lng_offset_degrees(lat: f64, miles: f64) -> f64 {
    let cos_lat = lat.to_radians().cos().max(MIN_COS_LAT);
    miles / (BBOX_MILES_PER_DEGREE * cos_lat)
}
