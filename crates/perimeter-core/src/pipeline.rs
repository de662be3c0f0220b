//! The staged ingestion pipeline.
//!
//! One position ingestion drives a short, explicit pipeline instead of
//! the legacy inline fan-out chain:
//!
//! 1. Validate the coordinate (the only synchronous rejection).
//! 2. Persist the report (the only other caller-visible failure).
//! 3. Publish `location.update`.
//! 4. Fetch the zones visible to the entity.
//! 5. Evaluate every zone concurrently and independently.
//! 6. Publish the proximity snapshot.
//!
//! Each stage is bounded by its own timeout, so a slow catalog cannot
//! starve the snapshot and a slow zone cannot block its siblings. Stages
//! 3 through 6 degrade gracefully: failures are logged and the ingestion
//! still succeeds, because losing an alert is preferable to blocking the
//! primary write path.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use perimeter_geo::{shape_contains, validate_coordinate};
use perimeter_types::{
    Coordinate, EntityId, GeofenceAlert, LocationUpdate, NearbyEntity, NewPositionReport,
    PositionReport, ProximitySnapshot, Zone, ZoneId,
};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::dispatch::{Dispatcher, EventTransport};
use crate::error::EngineError;
use crate::proximity::{ProximityParams, nearby};
use crate::stores::{PositionStore, StoreError, ZoneCatalog};
use crate::tracker::ContainmentTracker;

/// The ingestion pipeline: stores, tracker, and dispatcher wired together.
///
/// One instance is shared (behind an [`Arc`]) by all concurrent
/// ingestions; the contained [`ContainmentTracker`] serializes per-pair
/// updates internally.
pub struct IngestPipeline<Z, P, T> {
    zones: Arc<Z>,
    positions: Arc<P>,
    dispatcher: Dispatcher<T>,
    tracker: ContainmentTracker,
    store_timeout: Duration,
    snapshot_params: ProximityParams,
    nearby_params: ProximityParams,
}

impl<Z, P, T> IngestPipeline<Z, P, T>
where
    Z: ZoneCatalog,
    P: PositionStore,
    T: EventTransport,
{
    /// Assemble a pipeline from its collaborators and configuration.
    pub fn new(
        zones: Arc<Z>,
        positions: Arc<P>,
        dispatcher: Dispatcher<T>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            zones,
            positions,
            dispatcher,
            tracker: ContainmentTracker::new(),
            store_timeout: config.timeouts.store(),
            snapshot_params: config.tracking.snapshot_params(),
            nearby_params: config.tracking.nearby_params(),
        }
    }

    /// Ingest one position report.
    ///
    /// Returns the persisted report. Only coordinate validation and
    /// position persistence can fail the call; alert evaluation and
    /// dispatch degrade gracefully.
    pub async fn ingest(&self, input: NewPositionReport) -> Result<PositionReport, EngineError> {
        // Stage 1: reject out-of-range coordinates before any evaluation.
        validate_coordinate(input.coordinate)?;

        let report = input.into_report(Utc::now());

        // Stage 2: persist. This is the primary write path; its failure
        // is the caller's problem.
        self.bounded("insert position", self.positions.insert(&report))
            .await?;

        // Stage 3: raw position to the entity's channel and operators.
        let update = LocationUpdate {
            entity_id: report.entity_id,
            position: report.clone(),
        };
        self.dispatcher.location_update(&update).await;

        // Stages 4 + 5: containment evaluation over visible zones.
        self.evaluate_containment(&report).await;

        // Stage 6: proximity snapshot for the reporting entity.
        self.publish_snapshot(&report).await;

        Ok(report)
    }

    /// Nearby-locations query path (wider recency window than snapshots).
    ///
    /// When `point` is omitted, the entity's last known position is used;
    /// an entity with no recorded position cannot anchor a query.
    pub async fn nearby_locations(
        &self,
        entity: EntityId,
        point: Option<Coordinate>,
        radius_m: Option<f64>,
    ) -> Result<Vec<NearbyEntity>, EngineError> {
        let point = match point {
            Some(point) => point,
            None => self
                .bounded("latest position", self.positions.latest_for(entity))
                .await?
                .ok_or(EngineError::NoKnownPosition(entity))?
                .coordinate,
        };
        validate_coordinate(point)?;

        let params = ProximityParams {
            radius_m: radius_m.unwrap_or(self.nearby_params.radius_m),
            ..self.nearby_params
        };

        self.bounded(
            "nearby positions",
            nearby(self.positions.as_ref(), entity, point, params, Utc::now()),
        )
        .await
    }

    /// Drop containment state for a retired zone.
    pub async fn forget_zone(&self, zone: ZoneId) {
        self.tracker.purge_zone(zone).await;
    }

    /// Drop containment state for an entity that is no longer tracked.
    pub async fn forget_entity(&self, entity: EntityId) {
        self.tracker.purge_entity(entity).await;
    }

    /// The containment tracker, for introspection in tests and admin
    /// tooling.
    pub const fn tracker(&self) -> &ContainmentTracker {
        &self.tracker
    }

    /// Run a store call under the store timeout, mapping both failure
    /// modes to [`EngineError::StoreUnavailable`].
    async fn bounded<V>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<V, StoreError>> + Send,
    ) -> Result<V, EngineError> {
        match timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, error = %e, "store call failed");
                Err(EngineError::StoreUnavailable { operation })
            }
            Err(_) => {
                let timeout_ms = u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(operation, timeout_ms, "store call timed out");
                Err(EngineError::StoreUnavailable { operation })
            }
        }
    }

    /// Stages 4 + 5: fetch visible zones and evaluate them all,
    /// concurrently and independently.
    async fn evaluate_containment(&self, report: &PositionReport) {
        let zones = match self
            .bounded("visible zones", self.zones.zones_visible_to(report.entity_id))
            .await
        {
            Ok(zones) => zones,
            Err(_) => {
                // Already logged by bounded(); skip containment for this
                // report rather than failing the ingestion.
                return;
            }
        };

        debug!(
            entity = %report.entity_id,
            zone_count = zones.len(),
            "evaluating containment"
        );

        let evaluations = zones
            .into_iter()
            .map(|zone| self.evaluate_zone(report, zone));
        join_all(evaluations).await;
    }

    /// Evaluate one zone for one report and dispatch any resulting alert.
    async fn evaluate_zone(&self, report: &PositionReport, zone: Zone) {
        let inside = match shape_contains(&zone.shape, report.coordinate) {
            Ok(inside) => inside,
            Err(e) => {
                // Data-quality problem in one zone; siblings keep going.
                warn!(zone = %zone.id, error = %e, "skipping zone with malformed shape");
                return;
            }
        };

        let Some(kind) = self
            .tracker
            .evaluate(&zone, report.entity_id, inside, report.captured_at)
            .await
        else {
            return;
        };

        let owner = zone.owner;
        let alert = GeofenceAlert {
            kind,
            zone_id: zone.id,
            zone_name: zone.name,
            entity_id: report.entity_id,
            timestamp: report.captured_at,
        };
        self.dispatcher.geofence_alert(owner, &alert).await;
    }

    /// Stage 6: nearby entities around the fresh report, pushed to the
    /// reporting entity only. Never fails the ingestion.
    async fn publish_snapshot(&self, report: &PositionReport) {
        let entities = match self
            .bounded(
                "proximity snapshot",
                nearby(
                    self.positions.as_ref(),
                    report.entity_id,
                    report.coordinate,
                    self.snapshot_params,
                    Utc::now(),
                ),
            )
            .await
        {
            Ok(entities) => entities,
            Err(_) => return,
        };

        let snapshot = ProximitySnapshot::from_entities(entities);
        self.dispatcher
            .proximity_snapshot(report.entity_id, &snapshot)
            .await;
    }
}
