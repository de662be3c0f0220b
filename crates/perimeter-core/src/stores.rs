//! Collaborator contracts for the zone catalog and the position store.
//!
//! The engine core never talks to a database directly: it sees zones and
//! positions through these read-mostly traits, implemented by
//! `perimeter-db` in production and by in-memory fakes in tests. Both may
//! be called concurrently without additional locking beyond what the
//! backing store provides; the pipeline bounds every call with a timeout.

use std::future::Future;

use chrono::{DateTime, Utc};
use perimeter_types::{Coordinate, EntityId, PositionReport, Zone, ZoneId};

/// A store-layer failure, with the operation that produced it.
///
/// Backends wrap their native errors (SQL, cache, serialization) into
/// this single opaque shape; the engine only ever skips, logs, and
/// continues, so no finer structure is needed at this seam.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct StoreError {
    /// The store operation that failed.
    pub operation: &'static str,
    /// Backend-specific failure description.
    pub message: String,
}

impl StoreError {
    /// Wrap a backend error with the operation that produced it.
    pub fn new(operation: &'static str, source: impl core::fmt::Display) -> Self {
        Self {
            operation,
            message: source.to_string(),
        }
    }
}

/// Read-only view over externally stored zone definitions.
///
/// Any staleness window is acceptable (the catalog is eventually
/// consistent with the CRUD layer), but within a single call the
/// returned set must be internally consistent: no zone appears twice and
/// no half-updated zone is visible.
pub trait ZoneCatalog: Send + Sync {
    /// Zones visible to `entity`: those it owns or is authorized on,
    /// filtered to `active == true`.
    fn zones_visible_to(
        &self,
        entity: EntityId,
    ) -> impl Future<Output = Result<Vec<Zone>, StoreError>> + Send;

    /// Look up a single zone by identifier, active or not.
    fn zone_by_id(
        &self,
        zone: ZoneId,
    ) -> impl Future<Output = Result<Option<Zone>, StoreError>> + Send;
}

/// Append-only position persistence plus the spatial range scan backing
/// proximity queries.
pub trait PositionStore: Send + Sync {
    /// Persist one report. Reports are immutable once inserted.
    fn insert(
        &self,
        report: &PositionReport,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The most recent report for `entity`, if any.
    fn latest_for(
        &self,
        entity: EntityId,
    ) -> impl Future<Output = Result<Option<PositionReport>, StoreError>> + Send;

    /// Latest-per-entity reports within `radius_m` of `center`, captured
    /// at or after `since`, excluding `exclude`'s own reports.
    ///
    /// Implementations may over-return (a coarse index is fine); the
    /// engine re-applies the distance, recency, and self-exclusion
    /// filters over whatever comes back.
    fn within_radius(
        &self,
        center: Coordinate,
        radius_m: f64,
        since: DateTime<Utc>,
        exclude: EntityId,
    ) -> impl Future<Output = Result<Vec<PositionReport>, StoreError>> + Send;
}
