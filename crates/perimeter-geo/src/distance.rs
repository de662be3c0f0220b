//! Haversine great-circle distance.
//!
//! Distances are computed on a sphere of radius [`EARTH_RADIUS_M`]. The
//! spherical model is accurate to roughly 0.5% against the WGS-84
//! ellipsoid, which is far below GPS accuracy at geofence scales.

use perimeter_types::Coordinate;

/// Mean Earth radius in meters, as used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
///
/// Symmetric in its arguments, zero for identical points, never negative,
/// and monotonic in angular separation.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let phi_a = a.latitude.to_radians();
    let phi_b = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (delta_lambda / 2.0).sin().powi(2);
    let central_angle = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * central_angle
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One degree of longitude along the equator, in meters
    /// (2 * pi * R / 360).
    const ONE_DEGREE_AT_EQUATOR_M: f64 = 111_194.93;

    #[test]
    fn distance_to_self_is_zero() {
        let points = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(-73.98, 40.75),
            Coordinate::new(179.9, -89.9),
        ];
        for p in points {
            assert!(distance_meters(p, p).abs() < 1e-9);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Coordinate::new(2.3522, 48.8566);
        let b = Coordinate::new(-0.1276, 51.5072);
        let forward = distance_meters(a, b);
        let backward = distance_meters(b, a);
        assert!((forward - backward).abs() < 1e-6);
    }

    #[test]
    fn distance_is_never_negative() {
        let a = Coordinate::new(-180.0, -90.0);
        let b = Coordinate::new(180.0, 90.0);
        assert!(distance_meters(a, b) >= 0.0);
    }

    #[test]
    fn one_degree_of_longitude_at_the_equator() {
        let origin = Coordinate::new(0.0, 0.0);
        let east = Coordinate::new(1.0, 0.0);
        let d = distance_meters(origin, east);
        assert!((d - ONE_DEGREE_AT_EQUATOR_M).abs() < 1.0);
    }

    #[test]
    fn paris_to_london_is_about_343_km() {
        let paris = Coordinate::new(2.3522, 48.8566);
        let london = Coordinate::new(-0.1276, 51.5072);
        let d = distance_meters(paris, london);
        assert!(d > 340_000.0 && d < 347_000.0, "got {d}");
    }

    #[test]
    fn distance_grows_with_angular_separation() {
        let origin = Coordinate::new(0.0, 0.0);
        let mut last = 0.0;
        for step in 1..=10 {
            let longitude = f64::from(step) * 0.1;
            let d = distance_meters(origin, Coordinate::new(longitude, 0.0));
            assert!(d > last, "distance must grow with separation");
            last = d;
        }
    }
}
