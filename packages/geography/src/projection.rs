//! Equirectangular projection onto a local plane measured in miles.

use traffic_map_geography_models::GeoPoint;

use crate::MILES_PER_DEGREE;

/// Flattens coordinates around a reference point into an `(x, y)` plane in
/// miles, `x` pointing east and `y` north.
///
/// Longitude is scaled by the cosine of the reference latitude only, so
/// error grows with north-south distance from the origin.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: GeoPoint,
    miles_per_degree_lng: f64,
}

impl LocalProjection {
    /// Creates a projection with `origin` at `(0, 0)`.
    #[must_use]
    pub fn centered_at(origin: GeoPoint) -> Self {
        Self {
            origin,
            miles_per_degree_lng: MILES_PER_DEGREE * origin.lat_radians().cos(),
        }
    }

    /// The reference point.
    #[must_use]
    pub const fn origin(&self) -> GeoPoint {
        self.origin
    }

    /// Projects a coordinate onto the plane.
    #[must_use]
    pub fn project(&self, p: GeoPoint) -> (f64, f64) {
        (
            (p.lng - self.origin.lng) * self.miles_per_degree_lng,
            (p.lat - self.origin.lat) * MILES_PER_DEGREE,
        )
    }

    /// Maps a plane position back to a coordinate.
    #[must_use]
    pub fn unproject(&self, (x, y): (f64, f64)) -> GeoPoint {
        let lng = if self.miles_per_degree_lng.abs() > f64::EPSILON {
            self.origin.lng + x / self.miles_per_degree_lng
        } else {
            self.origin.lng
        };
        GeoPoint {
            lat: self.origin.lat + y / MILES_PER_DEGREE,
            lng,
        }
    }
}

/// The point on segment `a`-`b` closest to `p`, all in plane coordinates.
///
/// A zero-length segment returns `a`.
#[must_use]
pub fn closest_point_on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx.mul_add(dx, dy * dy);
    if len_sq <= f64::EPSILON {
        return a;
    }
    let t = ((p.0 - a.0).mul_add(dx, (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0);
    (t.mul_add(dx, a.0), t.mul_add(dy, a.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_unproject_round_trips() {
        let projection = LocalProjection::centered_at(GeoPoint {
            lat: 34.05,
            lng: -118.24,
        });
        let p = GeoPoint {
            lat: 34.10,
            lng: -118.30,
        };
        let back = projection.unproject(projection.project(p));
        assert!((back.lat - p.lat).abs() < 1e-9);
        assert!((back.lng - p.lng).abs() < 1e-9);
    }

    #[test]
    fn origin_projects_to_zero() {
        let origin = GeoPoint { lat: 10.0, lng: 20.0 };
        let (x, y) = LocalProjection::centered_at(origin).project(origin);
        assert!(x.abs() < f64::EPSILON && y.abs() < f64::EPSILON);
    }

    #[test]
    fn closest_point_clamps_to_segment() {
        let a = (0.0, 0.0);
        let b = (10.0, 0.0);
        assert_eq!(closest_point_on_segment((5.0, 3.0), a, b), (5.0, 0.0));
        assert_eq!(closest_point_on_segment((-4.0, 3.0), a, b), a);
        assert_eq!(closest_point_on_segment((14.0, -3.0), a, b), b);
        assert_eq!(closest_point_on_segment((1.0, 1.0), a, a), a);
    }
}
