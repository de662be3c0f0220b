//! Core entity structs for the Perimeter tracking platform.
//!
//! Covers [`Coordinate`], [`PositionReport`] (and its ingestion-side
//! counterpart [`NewPositionReport`]), and the [`Zone`] definition with its
//! tagged [`ZoneShape`] and per-zone [`AlertConfig`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{EntityId, PositionId, ZoneId};

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// A geographic coordinate in degrees.
///
/// Longitude is bounded to [-180, 180] and latitude to [-90, 90]; range
/// checking lives in `perimeter-geo` and runs before any evaluation, so
/// code downstream of validation may assume both fields are in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinate {
    /// Longitude in degrees east, [-180, 180].
    pub longitude: f64,
    /// Latitude in degrees north, [-90, 90].
    pub latitude: f64,
}

impl Coordinate {
    /// Create a coordinate from longitude and latitude in degrees.
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

// ---------------------------------------------------------------------------
// Position reports
// ---------------------------------------------------------------------------

/// A single recorded position of a tracked entity.
///
/// Immutable once created: written once at ingestion, read many times by
/// containment evaluation and proximity queries. Reports expire from the
/// position store after the 30-day retention window; expiry is a
/// storage-layer concern and is never evaluated by the engine core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PositionReport {
    /// Unique identifier of this report.
    pub id: PositionId,
    /// The entity this position belongs to.
    pub entity_id: EntityId,
    /// The reported coordinate.
    pub coordinate: Coordinate,
    /// Reported GPS accuracy in meters, if known.
    pub accuracy_m: Option<f64>,
    /// Altitude in meters above sea level, if known.
    pub altitude_m: Option<f64>,
    /// Ground speed in meters per second, if known.
    pub speed_mps: Option<f64>,
    /// Heading in degrees clockwise from north, [0, 360), if known.
    pub heading_deg: Option<f64>,
    /// Device battery percentage, [0, 100], if known.
    pub battery_pct: Option<f64>,
    /// Whether the device reported itself as moving.
    pub is_moving: Option<bool>,
    /// When the position was captured on the device.
    pub captured_at: DateTime<Utc>,
}

/// An incoming position report before it has been assigned an identifier.
///
/// This is the ingestion payload: the entity identity comes from the
/// already-authenticated session context, and `captured_at` defaults to
/// the ingestion time when the device did not stamp the fix itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NewPositionReport {
    /// The entity reporting its position.
    pub entity_id: EntityId,
    /// The reported coordinate.
    pub coordinate: Coordinate,
    /// Reported GPS accuracy in meters, if known.
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    /// Altitude in meters above sea level, if known.
    #[serde(default)]
    pub altitude_m: Option<f64>,
    /// Ground speed in meters per second, if known.
    #[serde(default)]
    pub speed_mps: Option<f64>,
    /// Heading in degrees clockwise from north, [0, 360), if known.
    #[serde(default)]
    pub heading_deg: Option<f64>,
    /// Device battery percentage, [0, 100], if known.
    #[serde(default)]
    pub battery_pct: Option<f64>,
    /// Whether the device reported itself as moving.
    #[serde(default)]
    pub is_moving: Option<bool>,
    /// Device capture timestamp; ingestion time is used when absent.
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl NewPositionReport {
    /// Create a minimal report with only the required fields set.
    pub const fn new(entity_id: EntityId, coordinate: Coordinate) -> Self {
        Self {
            entity_id,
            coordinate,
            accuracy_m: None,
            altitude_m: None,
            speed_mps: None,
            heading_deg: None,
            battery_pct: None,
            is_moving: None,
            captured_at: None,
        }
    }

    /// Promote this input into a persisted [`PositionReport`], assigning a
    /// fresh [`PositionId`] and defaulting `captured_at` to `now`.
    pub fn into_report(self, now: DateTime<Utc>) -> PositionReport {
        PositionReport {
            id: PositionId::new(),
            entity_id: self.entity_id,
            coordinate: self.coordinate,
            accuracy_m: self.accuracy_m,
            altitude_m: self.altitude_m,
            speed_mps: self.speed_mps,
            heading_deg: self.heading_deg,
            battery_pct: self.battery_pct,
            is_moving: self.is_moving,
            captured_at: self.captured_at.unwrap_or(now),
        }
    }
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// The geographic shape of a zone.
///
/// A tagged variant over circle and polygon eliminates the null-shape
/// ambiguity of the legacy document model: a zone always has exactly one
/// well-formed shape kind, and unknown kinds fail at deserialization
/// rather than at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ZoneShape {
    /// A circular region around a center point.
    Circle {
        /// Center of the circle.
        center: Coordinate,
        /// Radius in meters, within [10, 50000].
        radius_m: f64,
    },
    /// A polygonal region described by an ordered ring of vertices.
    ///
    /// The ring is implicitly closed: the last vertex connects back to the
    /// first, which need not be repeated. At least 3 vertices are required.
    Polygon {
        /// Ordered ring of vertices.
        ring: Vec<Coordinate>,
    },
}

/// Per-zone alert configuration.
///
/// Defaults mirror the zone editor: enter and exit alerts on, dwell
/// alerts off with a 5-minute dwell duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AlertConfig {
    /// Raise an alert when an entity enters the zone.
    #[serde(default = "default_true")]
    pub on_enter: bool,
    /// Raise an alert when an entity exits the zone.
    #[serde(default = "default_true")]
    pub on_exit: bool,
    /// Raise an alert when an entity dwells inside the zone.
    #[serde(default)]
    pub on_dwell: bool,
    /// Continuous stay duration, in seconds, after which a dwell alert
    /// fires (once per stay).
    #[serde(default = "default_dwell_seconds")]
    pub dwell_seconds: u32,
}

const fn default_true() -> bool {
    true
}

const fn default_dwell_seconds() -> u32 {
    300
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            on_enter: true,
            on_exit: true,
            on_dwell: false,
            dwell_seconds: default_dwell_seconds(),
        }
    }
}

/// A geofence zone definition.
///
/// Created, updated, and deleted by its owner only (enforced by the CRUD
/// layer, outside this workspace); read by the owner and any entity in the
/// authorized set. The engine only ever sees zones through the read-only
/// catalog accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Zone {
    /// Unique identifier of the zone.
    pub id: ZoneId,
    /// Human-readable zone name (at most 100 characters).
    pub name: String,
    /// Optional description (at most 500 characters).
    pub description: Option<String>,
    /// The entity that owns this zone.
    pub owner: EntityId,
    /// The zone's geographic shape.
    pub shape: ZoneShape,
    /// Whether the zone participates in containment evaluation.
    pub active: bool,
    /// Entities authorized to see this zone (besides the owner).
    pub authorized: BTreeSet<EntityId>,
    /// Alert configuration for this zone.
    pub alerts: AlertConfig,
}
