//! Coordinate range checks and zone shape well-formedness.
//!
//! Coordinate validation runs before any evaluation: a report with an
//! out-of-range coordinate is rejected synchronously. Shape validation
//! gates containment evaluation per zone: a malformed shape marks the
//! zone as skippable, never as a fatal error.

use perimeter_types::{Coordinate, ZoneShape};

use crate::error::GeoError;

/// Minimum allowed circle radius in meters.
pub const MIN_RADIUS_M: f64 = 10.0;

/// Maximum allowed circle radius in meters (50 km).
pub const MAX_RADIUS_M: f64 = 50_000.0;

/// Minimum number of vertices in a polygon ring.
pub const MIN_RING_VERTICES: usize = 3;

/// Check that a coordinate is finite and within the geographic ranges
/// (longitude [-180, 180], latitude [-90, 90]).
pub fn validate_coordinate(c: Coordinate) -> Result<(), GeoError> {
    let longitude_ok = c.longitude.is_finite() && (-180.0..=180.0).contains(&c.longitude);
    let latitude_ok = c.latitude.is_finite() && (-90.0..=90.0).contains(&c.latitude);
    if longitude_ok && latitude_ok {
        Ok(())
    } else {
        Err(GeoError::CoordinateOutOfRange {
            longitude: c.longitude,
            latitude: c.latitude,
        })
    }
}

/// Check that a zone shape is well-formed.
///
/// A circle must have an in-range center and a radius within
/// [[`MIN_RADIUS_M`], [`MAX_RADIUS_M`]]. A polygon must have at least
/// [`MIN_RING_VERTICES`] vertices, all of them in range.
pub fn validate_shape(shape: &ZoneShape) -> Result<(), GeoError> {
    match shape {
        ZoneShape::Circle { center, radius_m } => {
            validate_coordinate(*center)?;
            if !radius_m.is_finite() || !(MIN_RADIUS_M..=MAX_RADIUS_M).contains(radius_m) {
                return Err(GeoError::RadiusOutOfRange {
                    radius_m: *radius_m,
                });
            }
            Ok(())
        }
        ZoneShape::Polygon { ring } => {
            if ring.len() < MIN_RING_VERTICES {
                return Err(GeoError::DegenerateRing {
                    vertices: ring.len(),
                });
            }
            for vertex in ring {
                validate_coordinate(*vertex)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_coordinates_pass() {
        assert!(validate_coordinate(Coordinate::new(0.0, 0.0)).is_ok());
        assert!(validate_coordinate(Coordinate::new(-180.0, -90.0)).is_ok());
        assert!(validate_coordinate(Coordinate::new(180.0, 90.0)).is_ok());
    }

    #[test]
    fn out_of_range_coordinates_fail() {
        assert!(validate_coordinate(Coordinate::new(180.1, 0.0)).is_err());
        assert!(validate_coordinate(Coordinate::new(0.0, -90.5)).is_err());
        assert!(validate_coordinate(Coordinate::new(f64::NAN, 0.0)).is_err());
        assert!(validate_coordinate(Coordinate::new(0.0, f64::INFINITY)).is_err());
    }

    #[test]
    fn circle_radius_bounds() {
        let center = Coordinate::new(10.0, 10.0);
        let ok = ZoneShape::Circle {
            center,
            radius_m: 10.0,
        };
        assert!(validate_shape(&ok).is_ok());

        let too_small = ZoneShape::Circle {
            center,
            radius_m: 9.9,
        };
        assert!(matches!(
            validate_shape(&too_small),
            Err(GeoError::RadiusOutOfRange { .. })
        ));

        let too_large = ZoneShape::Circle {
            center,
            radius_m: 50_000.5,
        };
        assert!(validate_shape(&too_large).is_err());
    }

    #[test]
    fn two_vertex_ring_is_degenerate() {
        let shape = ZoneShape::Polygon {
            ring: vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)],
        };
        assert!(matches!(
            validate_shape(&shape),
            Err(GeoError::DegenerateRing { vertices: 2 })
        ));
    }

    #[test]
    fn polygon_with_out_of_range_vertex_fails() {
        let shape = ZoneShape::Polygon {
            ring: vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 95.0),
                Coordinate::new(1.0, 1.0),
            ],
        };
        assert!(matches!(
            validate_shape(&shape),
            Err(GeoError::CoordinateOutOfRange { .. })
        ));
    }
}
