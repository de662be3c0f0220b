//! Point-in-circle and point-in-polygon predicates.
//!
//! `in_polygon` is a standard even-odd ray-casting sweep. Two documented
//! limitations, inherited from the algorithm itself:
//!
//! - A point exactly on a polygon edge has implementation-defined
//!   membership. Callers must not rely on either answer; tests pin this
//!   down as a known edge case rather than a guarantee.
//! - Polygons crossing the antimeridian are handled only to the extent
//!   the naive sweep supports: no dateline-wrapping correction is
//!   applied, so a ring spanning the +180/-180 seam should be split by
//!   the zone author.

use perimeter_types::{Coordinate, ZoneShape};

use crate::distance::distance_meters;
use crate::error::GeoError;
use crate::validate::validate_shape;

/// True iff `point` lies within `radius_m` meters of `center`.
///
/// The boundary is inclusive: a point exactly `radius_m` meters away is
/// inside.
pub fn in_circle(point: Coordinate, center: Coordinate, radius_m: f64) -> bool {
    distance_meters(point, center) <= radius_m
}

/// Even-odd ray-casting test over an ordered ring of vertices.
///
/// The ring is implicitly closed (the first vertex need not be repeated).
/// Rings with fewer than 3 vertices always report `false`; use
/// [`validate_shape`] first to surface that as a data-quality error.
pub fn in_polygon(point: Coordinate, ring: &[Coordinate]) -> bool {
    let Some(last) = ring.last() else {
        return false;
    };

    let x = point.longitude;
    let y = point.latitude;
    let mut inside = false;
    let mut prev = last;

    for vertex in ring {
        let (xi, yi) = (vertex.longitude, vertex.latitude);
        let (xj, yj) = (prev.longitude, prev.latitude);

        // The guard ensures yj != yi, so the division is well-defined.
        let crosses = ((yi > y) != (yj > y)) && x < (xj - xi) * (y - yi) / (yj - yi) + xi;
        if crosses {
            inside = !inside;
        }
        prev = vertex;
    }

    inside
}

/// Containment dispatch over a zone shape.
///
/// Validates the shape first so malformed zones surface as [`GeoError`]
/// and can be skipped by the caller instead of silently evaluating to a
/// meaningless answer.
pub fn shape_contains(shape: &ZoneShape, point: Coordinate) -> Result<bool, GeoError> {
    validate_shape(shape)?;
    Ok(match shape {
        ZoneShape::Circle { center, radius_m } => in_circle(point, *center, *radius_m),
        ZoneShape::Polygon { ring } => in_polygon(point, ring),
    })
}
