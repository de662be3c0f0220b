//! Position persistence over the `positions` table.
//!
//! [`PgPositionStore`] implements the [`PositionStore`] contract with
//! runtime-constructed, parameterized statements. The spatial range scan
//! computes the haversine distance in SQL over the latest-per-entity
//! rows; a `DISTINCT ON` subquery keeps the scan bounded by the recency
//! cutoff before any trigonometry runs.
//!
//! [`CachedPositionStore`] composes the durable store with the
//! [`LatestPositionCache`]: inserts write through to Dragonfly (cache
//! failures are logged, never fatal), and latest-position reads try the
//! cache before falling back to `PostgreSQL`.
//!
//! Retention: positions expire after 30 days. Expiry is enforced here,
//! at the storage layer, via [`PgPositionStore::purge_older_than`] (run
//! from a scheduled job); the engine core never evaluates it.

use chrono::{DateTime, TimeDelta, Utc};
use perimeter_core::stores::{PositionStore, StoreError};
use perimeter_types::{Coordinate, EntityId, PositionId, PositionReport};
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::LatestPositionCache;
use crate::error::DbError;
use crate::postgres::PostgresPool;

/// Position retention window, in days.
pub const RETENTION_DAYS: i64 = 30;

/// Upper bound on candidates returned by a single range scan.
///
/// The engine applies the configured result cap (default 50) on top;
/// this bound only protects the database from pathological fan-out.
const MAX_CANDIDATES: i64 = 256;

/// Columns selected for every position read.
const POSITION_COLUMNS: &str = "id, entity_id, longitude, latitude, accuracy_m, altitude_m, \
     speed_mps, heading_deg, battery_pct, is_moving, captured_at";

/// Database row mapping for the `positions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionRow {
    /// Primary key.
    pub id: Uuid,
    /// Reporting entity.
    pub entity_id: Uuid,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// GPS accuracy in meters.
    pub accuracy_m: Option<f64>,
    /// Altitude in meters.
    pub altitude_m: Option<f64>,
    /// Ground speed in meters per second.
    pub speed_mps: Option<f64>,
    /// Heading in degrees.
    pub heading_deg: Option<f64>,
    /// Battery percentage.
    pub battery_pct: Option<f64>,
    /// Motion flag.
    pub is_moving: Option<bool>,
    /// Capture timestamp.
    pub captured_at: DateTime<Utc>,
}

impl From<PositionRow> for PositionReport {
    fn from(row: PositionRow) -> Self {
        Self {
            id: PositionId::from(row.id),
            entity_id: EntityId::from(row.entity_id),
            coordinate: Coordinate::new(row.longitude, row.latitude),
            accuracy_m: row.accuracy_m,
            altitude_m: row.altitude_m,
            speed_mps: row.speed_mps,
            heading_deg: row.heading_deg,
            battery_pct: row.battery_pct,
            is_moving: row.is_moving,
            captured_at: row.captured_at,
        }
    }
}

/// Durable position store over `PostgreSQL`.
#[derive(Clone)]
pub struct PgPositionStore {
    pool: PgPool,
}

impl PgPositionStore {
    /// Create a store over a connected pool.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Insert one report.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert_report(&self, report: &PositionReport) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO positions (id, entity_id, longitude, latitude, accuracy_m, \
             altitude_m, speed_mps, heading_deg, battery_pct, is_moving, captured_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(report.id.into_inner())
        .bind(report.entity_id.into_inner())
        .bind(report.coordinate.longitude)
        .bind(report.coordinate.latitude)
        .bind(report.accuracy_m)
        .bind(report.altitude_m)
        .bind(report.speed_mps)
        .bind(report.heading_deg)
        .bind(report.battery_pct)
        .bind(report.is_moving)
        .bind(report.captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent report for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn latest_by_entity(
        &self,
        entity: EntityId,
    ) -> Result<Option<PositionReport>, DbError> {
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM positions \
             WHERE entity_id = $1 ORDER BY captured_at DESC LIMIT 1"
        );
        let row: Option<PositionRow> = sqlx::query_as(&sql)
            .bind(entity.into_inner())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PositionReport::from))
    }

    /// Latest-per-entity reports within `radius_m` of `center`, captured
    /// at or after `since`, excluding `exclude`, closest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn find_within_radius(
        &self,
        center: Coordinate,
        radius_m: f64,
        since: DateTime<Utc>,
        exclude: EntityId,
    ) -> Result<Vec<PositionReport>, DbError> {
        // Haversine in SQL over the latest row per entity. The recency
        // cutoff prunes the scan before any trigonometry runs.
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM ( \
                 SELECT latest.*, \
                        2 * 6371000 * asin(sqrt( \
                            power(sin(radians($3 - latitude) / 2), 2) \
                            + cos(radians(latitude)) * cos(radians($3)) \
                            * power(sin(radians($4 - longitude) / 2), 2) \
                        )) AS distance_m \
                 FROM ( \
                     SELECT DISTINCT ON (entity_id) * \
                     FROM positions \
                     WHERE entity_id <> $1 AND captured_at >= $2 \
                     ORDER BY entity_id, captured_at DESC \
                 ) latest \
             ) ranked \
             WHERE distance_m <= $5 \
             ORDER BY distance_m \
             LIMIT $6"
        );
        let rows: Vec<PositionRow> = sqlx::query_as(&sql)
            .bind(exclude.into_inner())
            .bind(since)
            .bind(center.latitude)
            .bind(center.longitude)
            .bind(radius_m)
            .bind(MAX_CANDIDATES)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PositionReport::from).collect())
    }

    /// Delete reports older than `cutoff`, returning how many were
    /// removed. Run from a scheduled job with
    /// `Utc::now() - TimeDelta::days(RETENTION_DAYS)`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the delete fails.
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM positions WHERE captured_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// The retention cutoff as of `now`.
    pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(TimeDelta::days(RETENTION_DAYS))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl PositionStore for PgPositionStore {
    async fn insert(&self, report: &PositionReport) -> Result<(), StoreError> {
        self.insert_report(report)
            .await
            .map_err(|e| StoreError::new("insert position", e))
    }

    async fn latest_for(&self, entity: EntityId) -> Result<Option<PositionReport>, StoreError> {
        self.latest_by_entity(entity)
            .await
            .map_err(|e| StoreError::new("latest position", e))
    }

    async fn within_radius(
        &self,
        center: Coordinate,
        radius_m: f64,
        since: DateTime<Utc>,
        exclude: EntityId,
    ) -> Result<Vec<PositionReport>, StoreError> {
        self.find_within_radius(center, radius_m, since, exclude)
            .await
            .map_err(|e| StoreError::new("nearby positions", e))
    }
}

/// Durable store composed with the Dragonfly last-position cache.
///
/// Inserts write through to the cache; a cache failure is logged and
/// swallowed, since the durable write already succeeded. Latest-position
/// reads try the cache first and fall back to `PostgreSQL` on a miss or
/// a cache error.
#[derive(Clone)]
pub struct CachedPositionStore {
    store: PgPositionStore,
    cache: LatestPositionCache,
}

impl CachedPositionStore {
    /// Compose a durable store with a cache.
    pub const fn new(store: PgPositionStore, cache: LatestPositionCache) -> Self {
        Self { store, cache }
    }
}

impl PositionStore for CachedPositionStore {
    async fn insert(&self, report: &PositionReport) -> Result<(), StoreError> {
        self.store
            .insert_report(report)
            .await
            .map_err(|e| StoreError::new("insert position", e))?;

        if let Err(e) = self.cache.store(report).await {
            tracing::warn!(
                entity = %report.entity_id,
                error = %e,
                "last-position cache write failed"
            );
        }
        Ok(())
    }

    async fn latest_for(&self, entity: EntityId) -> Result<Option<PositionReport>, StoreError> {
        match self.cache.fetch(entity).await {
            Ok(Some(report)) => return Ok(Some(report)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(entity = %entity, error = %e, "last-position cache read failed");
            }
        }
        self.store
            .latest_by_entity(entity)
            .await
            .map_err(|e| StoreError::new("latest position", e))
    }

    async fn within_radius(
        &self,
        center: Coordinate,
        radius_m: f64,
        since: DateTime<Utc>,
        exclude: EntityId,
    ) -> Result<Vec<PositionReport>, StoreError> {
        self.store
            .find_within_radius(center, radius_m, since, exclude)
            .await
            .map_err(|e| StoreError::new("nearby positions", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_maps_to_report() {
        let captured_at = Utc::now();
        let row = PositionRow {
            id: Uuid::new_v4(),
            entity_id: Uuid::new_v4(),
            longitude: -122.42,
            latitude: 37.77,
            accuracy_m: Some(8.0),
            altitude_m: None,
            speed_mps: Some(1.4),
            heading_deg: Some(270.0),
            battery_pct: Some(81.0),
            is_moving: Some(true),
            captured_at,
        };
        let id = row.id;

        let report = PositionReport::from(row);
        assert_eq!(report.id.into_inner(), id);
        assert!((report.coordinate.longitude + 122.42).abs() < 1e-12);
        assert_eq!(report.is_moving, Some(true));
        assert_eq!(report.captured_at, captured_at);
    }

    #[test]
    fn retention_cutoff_is_thirty_days() {
        let now = Utc::now();
        let cutoff = PgPositionStore::retention_cutoff(now);
        assert_eq!(
            now.signed_duration_since(cutoff),
            TimeDelta::days(RETENTION_DAYS)
        );
    }
}
