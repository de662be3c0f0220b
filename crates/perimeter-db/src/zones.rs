//! Zone catalog over the `zones` table.
//!
//! [`PgZoneStore`] implements the read-only [`ZoneCatalog`] contract: one
//! parameterized statement per call, so the returned set is internally
//! consistent (no half-updated zone, no duplicates). Rows that cannot be
//! converted into a domain [`Zone`] (unknown shape kind, missing shape
//! columns, mangled ring JSON) are skipped with a data-quality warning
//! rather than failing the whole catalog read.

use perimeter_core::stores::{StoreError, ZoneCatalog};
use perimeter_types::{AlertConfig, Coordinate, EntityId, Zone, ZoneId, ZoneShape};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;
use crate::postgres::PostgresPool;

/// Columns selected for every zone read.
const ZONE_COLUMNS: &str = "id, owner_id, name, description, kind, \
     center_longitude, center_latitude, radius_m, ring, active, authorized, \
     alert_on_enter, alert_on_exit, alert_on_dwell, dwell_seconds";

/// Database row mapping for the `zones` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ZoneRow {
    /// Primary key.
    pub id: Uuid,
    /// Owner entity.
    pub owner_id: Uuid,
    /// Zone name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Shape kind: `circle` or `polygon`.
    pub kind: String,
    /// Circle center longitude (circle zones only).
    pub center_longitude: Option<f64>,
    /// Circle center latitude (circle zones only).
    pub center_latitude: Option<f64>,
    /// Circle radius in meters (circle zones only).
    pub radius_m: Option<f64>,
    /// Polygon ring as `[[lon, lat], ...]` (polygon zones only).
    pub ring: Option<serde_json::Value>,
    /// Active flag.
    pub active: bool,
    /// Authorized entity IDs (besides the owner).
    pub authorized: Vec<Uuid>,
    /// Raise enter alerts.
    pub alert_on_enter: bool,
    /// Raise exit alerts.
    pub alert_on_exit: bool,
    /// Raise dwell alerts.
    pub alert_on_dwell: bool,
    /// Dwell duration in seconds.
    pub dwell_seconds: i32,
}

impl ZoneRow {
    /// Convert the row into a domain [`Zone`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::MalformedRow`] when the shape columns do not
    /// form a valid tagged shape. Geometric validity (radius bounds,
    /// ring length) is the engine's concern, not the row mapping's.
    pub fn into_zone(self) -> Result<Zone, DbError> {
        let malformed = |reason: String| DbError::MalformedRow {
            table: "zones",
            id: self.id,
            reason,
        };

        let shape = match self.kind.as_str() {
            "circle" => {
                let longitude = self
                    .center_longitude
                    .ok_or_else(|| malformed("circle without center_longitude".to_owned()))?;
                let latitude = self
                    .center_latitude
                    .ok_or_else(|| malformed("circle without center_latitude".to_owned()))?;
                let radius_m = self
                    .radius_m
                    .ok_or_else(|| malformed("circle without radius_m".to_owned()))?;
                ZoneShape::Circle {
                    center: Coordinate::new(longitude, latitude),
                    radius_m,
                }
            }
            "polygon" => {
                let ring_value = self
                    .ring
                    .clone()
                    .ok_or_else(|| malformed("polygon without ring".to_owned()))?;
                let pairs: Vec<[f64; 2]> = serde_json::from_value(ring_value)
                    .map_err(|e| malformed(format!("unparseable ring: {e}")))?;
                ZoneShape::Polygon {
                    ring: pairs
                        .into_iter()
                        .map(|[longitude, latitude]| Coordinate::new(longitude, latitude))
                        .collect(),
                }
            }
            other => return Err(malformed(format!("unknown shape kind {other:?}"))),
        };

        let dwell_seconds = u32::try_from(self.dwell_seconds)
            .map_err(|_| malformed(format!("negative dwell_seconds {}", self.dwell_seconds)))?;

        Ok(Zone {
            id: ZoneId::from(self.id),
            name: self.name,
            description: self.description,
            owner: EntityId::from(self.owner_id),
            shape,
            active: self.active,
            authorized: self.authorized.into_iter().map(EntityId::from).collect(),
            alerts: AlertConfig {
                on_enter: self.alert_on_enter,
                on_exit: self.alert_on_exit,
                on_dwell: self.alert_on_dwell,
                dwell_seconds,
            },
        })
    }
}

/// Zone catalog accessor over `PostgreSQL`.
#[derive(Clone)]
pub struct PgZoneStore {
    pool: PgPool,
}

impl PgZoneStore {
    /// Create a store over a connected pool.
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Convert fetched rows, skipping malformed ones with a warning.
    fn collect_zones(rows: Vec<ZoneRow>) -> Vec<Zone> {
        rows.into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.into_zone() {
                    Ok(zone) => Some(zone),
                    Err(e) => {
                        tracing::warn!(zone = %id, error = %e, "skipping malformed zone row");
                        None
                    }
                }
            })
            .collect()
    }
}

impl ZoneCatalog for PgZoneStore {
    async fn zones_visible_to(&self, entity: EntityId) -> Result<Vec<Zone>, StoreError> {
        let sql = format!(
            "SELECT {ZONE_COLUMNS} FROM zones \
             WHERE active AND (owner_id = $1 OR $1 = ANY(authorized))"
        );
        let rows: Vec<ZoneRow> = sqlx::query_as(&sql)
            .bind(entity.into_inner())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::new("visible zones", e))?;

        Ok(Self::collect_zones(rows))
    }

    async fn zone_by_id(&self, zone: ZoneId) -> Result<Option<Zone>, StoreError> {
        let sql = format!("SELECT {ZONE_COLUMNS} FROM zones WHERE id = $1");
        let row: Option<ZoneRow> = sqlx::query_as(&sql)
            .bind(zone.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::new("zone by id", e))?;

        Ok(row.and_then(|row| {
            let id = row.id;
            match row.into_zone() {
                Ok(zone) => Some(zone),
                Err(e) => {
                    tracing::warn!(zone = %id, error = %e, "skipping malformed zone row");
                    None
                }
            }
        }))
    }
}
