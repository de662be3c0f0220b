//! Wire payloads published to subscriber channels.
//!
//! Three message kinds leave the engine:
//!
//! | Kind | Payload | Channels |
//! |------|---------|----------|
//! | `location.update` | [`LocationUpdate`] | entity's own channel + `operators` |
//! | `geofence.alert` | [`GeofenceAlert`] | affected entity (+ zone owner when different) |
//! | `proximity.snapshot` | [`ProximitySnapshot`] | requesting entity only |
//!
//! Payload shapes are the published contract; transport framing is an
//! external concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::AlertKind;
use crate::ids::{EntityId, ZoneId};
use crate::structs::{Coordinate, PositionReport};

/// A raw position update, published on every successful ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LocationUpdate {
    /// The entity whose position was reported.
    pub entity_id: EntityId,
    /// The full persisted report.
    pub position: PositionReport,
}

/// A containment-transition alert for a single zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GeofenceAlert {
    /// Which transition fired.
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// The zone that raised the alert.
    pub zone_id: ZoneId,
    /// Human-readable zone name, for display without a follow-up lookup.
    pub zone_name: String,
    /// The entity that triggered the transition.
    pub entity_id: EntityId,
    /// When the triggering position was captured.
    pub timestamp: DateTime<Utc>,
}

/// One entry of a proximity snapshot: another entity's last known position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NearbyEntity {
    /// The nearby entity.
    pub entity_id: EntityId,
    /// Its most recent known coordinate.
    pub coordinate: Coordinate,
    /// When that coordinate was captured.
    pub captured_at: DateTime<Utc>,
}

/// The set of entities currently near a point, for one requesting entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProximitySnapshot {
    /// Number of entries in `entities`.
    pub count: u32,
    /// Nearby entities, closest first.
    pub entities: Vec<NearbyEntity>,
}

impl ProximitySnapshot {
    /// Build a snapshot from a list of nearby entities.
    pub fn from_entities(entities: Vec<NearbyEntity>) -> Self {
        Self {
            count: u32::try_from(entities.len()).unwrap_or(u32::MAX),
            entities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geofence_alert_uses_type_field_on_the_wire() {
        let alert = GeofenceAlert {
            kind: AlertKind::Enter,
            zone_id: ZoneId::new(),
            zone_name: "Warehouse".to_owned(),
            entity_id: EntityId::new(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&alert).unwrap_or_default();
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("enter"));
    }

    #[test]
    fn snapshot_count_tracks_entries() {
        let entities = vec![NearbyEntity {
            entity_id: EntityId::new(),
            coordinate: Coordinate::new(13.4, 52.5),
            captured_at: Utc::now(),
        }];
        let snapshot = ProximitySnapshot::from_entities(entities);
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.entities.len(), 1);
    }
}
