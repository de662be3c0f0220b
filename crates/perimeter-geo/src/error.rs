//! Error types for the `perimeter-geo` crate.
//!
//! Coordinate range violations reject an ingestion synchronously; shape
//! violations mark a zone as malformed, which the engine skips with a
//! data-quality warning rather than aborting sibling zones.

/// Errors raised by coordinate and shape validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    /// Longitude or latitude is outside its allowed range (or not finite).
    #[error("coordinate out of range: longitude {longitude}, latitude {latitude}")]
    CoordinateOutOfRange {
        /// The offending longitude.
        longitude: f64,
        /// The offending latitude.
        latitude: f64,
    },

    /// A circle radius is outside the allowed [10, 50000] meter range.
    #[error("circle radius {radius_m} m outside allowed range [10, 50000] m")]
    RadiusOutOfRange {
        /// The offending radius in meters.
        radius_m: f64,
    },

    /// A polygon ring has fewer than the required 3 vertices.
    #[error("polygon ring has {vertices} vertices, need at least 3")]
    DegenerateRing {
        /// The number of vertices present.
        vertices: usize,
    },
}
