//! Error types for the engine core.
//!
//! Only two failure classes ever reach the ingestion caller: a rejected
//! coordinate and an unavailable position store. Everything else (a
//! malformed zone, a failed publish, a slow catalog) is contained inside
//! the pipeline and degrades gracefully, because losing an alert or a
//! snapshot is preferable to blocking the primary write path.

use perimeter_geo::GeoError;
use perimeter_types::EntityId;

/// Errors surfaced to callers of the engine core.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The reported coordinate failed range validation; the ingestion is
    /// rejected before any evaluation or persistence.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(#[from] GeoError),

    /// A store call failed or timed out. The evaluation for that call is
    /// abandoned with no partial state mutation.
    #[error("store unavailable during {operation}")]
    StoreUnavailable {
        /// The store operation that failed.
        operation: &'static str,
    },

    /// A nearby-locations query was made without a point for an entity
    /// that has no recorded position to fall back to.
    #[error("no known position for entity {0}")]
    NoKnownPosition(EntityId),
}
