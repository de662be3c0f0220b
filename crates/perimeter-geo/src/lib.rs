//! Pure geometry predicates for the Perimeter tracking platform.
//!
//! Everything in this crate is a deterministic, side-effect-free function
//! over coordinates and zone shapes: great-circle distance, point-in-circle,
//! point-in-polygon, and the validation rules that gate evaluation.
//!
//! # Modules
//!
//! - [`distance`] -- Haversine great-circle distance.
//! - [`containment`] -- Point-in-circle and point-in-polygon predicates and
//!   the [`ZoneShape`] dispatch.
//! - [`validate`] -- Coordinate range checks and shape well-formedness.
//! - [`error`] -- [`GeoError`].
//!
//! [`ZoneShape`]: perimeter_types::ZoneShape

pub mod containment;
pub mod distance;
pub mod error;
pub mod validate;

// Re-export primary functions at crate root.
pub use containment::{in_circle, in_polygon, shape_contains};
pub use distance::{EARTH_RADIUS_M, distance_meters};
pub use error::GeoError;
pub use validate::{
    MAX_RADIUS_M, MIN_RADIUS_M, MIN_RING_VERTICES, validate_coordinate, validate_shape,
};
