//! Nearby-entity filter semantics over the position store.
//!
//! The actual range scan is delegated to the position store (an external
//! spatial index); this module owns the contract: great-circle distance,
//! recency, self-exclusion, one latest report per entity, closest-first
//! ordering, and the result cap that bounds fan-out cost.
//!
//! Two independently configured recency windows exist: proximity
//! snapshots pushed on ingestion default to 5 minutes, while the
//! nearby-locations query path defaults to 10 minutes. The recency
//! boundary is inclusive: a report captured exactly at `now - window`
//! still qualifies.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, TimeDelta, Utc};
use perimeter_geo::distance_meters;
use perimeter_types::{Coordinate, EntityId, NearbyEntity, PositionReport};

use crate::stores::{PositionStore, StoreError};

/// Parameters of one proximity query.
#[derive(Debug, Clone, Copy)]
pub struct ProximityParams {
    /// Search radius in meters.
    pub radius_m: f64,
    /// Maximum age of a qualifying report.
    pub window: TimeDelta,
    /// Maximum number of results returned.
    pub cap: usize,
}

impl ProximityParams {
    /// Create query parameters.
    pub const fn new(radius_m: f64, window: TimeDelta, cap: usize) -> Self {
        Self {
            radius_m,
            window,
            cap,
        }
    }
}

/// The most recent position of every *other* entity within `radius_m` of
/// `point`, captured within the recency window, closest first, capped.
///
/// The store may over-return (coarse index, extra columns, stale rows);
/// the contract filters are re-applied here over whatever comes back.
pub async fn nearby<P: PositionStore>(
    store: &P,
    entity: EntityId,
    point: Coordinate,
    params: ProximityParams,
    now: DateTime<Utc>,
) -> Result<Vec<NearbyEntity>, StoreError> {
    let cutoff = now
        .checked_sub_signed(params.window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let candidates = store
        .within_radius(point, params.radius_m, cutoff, entity)
        .await?;

    // Keep only the most recent qualifying report per entity.
    let mut latest: BTreeMap<EntityId, PositionReport> = BTreeMap::new();
    for report in candidates {
        if report.entity_id == entity {
            continue;
        }
        // Inclusive boundary: captured exactly at the cutoff qualifies.
        if report.captured_at < cutoff {
            continue;
        }
        match latest.entry(report.entity_id) {
            Entry::Occupied(mut slot) => {
                if slot.get().captured_at < report.captured_at {
                    slot.insert(report);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(report);
            }
        }
    }

    let mut ranked: Vec<(f64, NearbyEntity)> = latest
        .into_values()
        .filter_map(|report| {
            let distance = distance_meters(point, report.coordinate);
            (distance <= params.radius_m).then(|| {
                (
                    distance,
                    NearbyEntity {
                        entity_id: report.entity_id,
                        coordinate: report.coordinate,
                        captured_at: report.captured_at,
                    },
                )
            })
        })
        .collect();

    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
    ranked.truncate(params.cap);

    Ok(ranked.into_iter().map(|(_, entry)| entry).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use perimeter_types::NewPositionReport;
    use tokio::sync::Mutex;

    /// In-memory position store that returns everything it holds,
    /// deliberately ignoring the query filters so the tests prove the
    /// engine re-applies them.
    #[derive(Default)]
    struct OverReturningStore {
        reports: Mutex<Vec<PositionReport>>,
    }

    impl OverReturningStore {
        async fn push(&self, entity: EntityId, point: Coordinate, captured_at: DateTime<Utc>) {
            let mut input = NewPositionReport::new(entity, point);
            input.captured_at = Some(captured_at);
            self.reports.lock().await.push(input.into_report(captured_at));
        }
    }

    impl PositionStore for OverReturningStore {
        async fn insert(&self, report: &PositionReport) -> Result<(), StoreError> {
            self.reports.lock().await.push(report.clone());
            Ok(())
        }

        async fn latest_for(
            &self,
            entity: EntityId,
        ) -> Result<Option<PositionReport>, StoreError> {
            Ok(self
                .reports
                .lock()
                .await
                .iter()
                .filter(|r| r.entity_id == entity)
                .max_by_key(|r| r.captured_at)
                .cloned())
        }

        async fn within_radius(
            &self,
            _center: Coordinate,
            _radius_m: f64,
            _since: DateTime<Utc>,
            _exclude: EntityId,
        ) -> Result<Vec<PositionReport>, StoreError> {
            Ok(self.reports.lock().await.clone())
        }
    }

    fn minutes_ago(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
        now.checked_sub_signed(TimeDelta::minutes(minutes)).unwrap_or(now)
    }

    fn five_minute_params() -> ProximityParams {
        ProximityParams::new(1_000.0, TimeDelta::minutes(5), 50)
    }

    #[tokio::test]
    async fn excludes_the_requesting_entity() {
        let store = OverReturningStore::default();
        let me = EntityId::new();
        let other = EntityId::new();
        let now = Utc::now();
        let origin = Coordinate::new(0.0, 0.0);

        store.push(me, origin, now).await;
        store.push(other, Coordinate::new(0.001, 0.0), now).await;

        let found = nearby(&store, me, origin, five_minute_params(), now)
            .await
            .unwrap_or_default();
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|e| e.entity_id == other));
    }

    #[tokio::test]
    async fn recency_boundary_is_inclusive() {
        let store = OverReturningStore::default();
        let me = EntityId::new();
        let at_boundary = EntityId::new();
        let too_old = EntityId::new();
        let now = Utc::now();
        let origin = Coordinate::new(0.0, 0.0);

        // Captured exactly at now - window: qualifies.
        store
            .push(at_boundary, Coordinate::new(0.001, 0.0), minutes_ago(now, 5))
            .await;
        // One second older than the window: excluded.
        store
            .push(
                too_old,
                Coordinate::new(0.001, 0.0),
                minutes_ago(now, 5)
                    .checked_sub_signed(TimeDelta::seconds(1))
                    .unwrap_or(now),
            )
            .await;

        let found = nearby(&store, me, origin, five_minute_params(), now)
            .await
            .unwrap_or_default();
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|e| e.entity_id == at_boundary));
    }

    #[tokio::test]
    async fn distance_filter_is_reapplied_over_store_results() {
        let store = OverReturningStore::default();
        let me = EntityId::new();
        let near = EntityId::new();
        let far = EntityId::new();
        let now = Utc::now();
        let origin = Coordinate::new(0.0, 0.0);

        store.push(near, Coordinate::new(0.005, 0.0), now).await;
        // Roughly 111 km away; the over-returning store hands it back
        // anyway and the engine must drop it.
        store.push(far, Coordinate::new(1.0, 0.0), now).await;

        let found = nearby(&store, me, origin, five_minute_params(), now)
            .await
            .unwrap_or_default();
        assert_eq!(found.len(), 1);
        assert!(found.iter().all(|e| e.entity_id == near));
    }

    #[tokio::test]
    async fn results_are_closest_first_and_capped() {
        let store = OverReturningStore::default();
        let me = EntityId::new();
        let now = Utc::now();
        let origin = Coordinate::new(0.0, 0.0);

        for step in 1..=5_u8 {
            let longitude = f64::from(step) * 0.001;
            store
                .push(EntityId::new(), Coordinate::new(longitude, 0.0), now)
                .await;
        }

        let params = ProximityParams::new(1_000.0, TimeDelta::minutes(5), 3);
        let found = nearby(&store, me, origin, params, now)
            .await
            .unwrap_or_default();

        assert_eq!(found.len(), 3, "cap bounds the fan-out");
        let distances: Vec<f64> = found
            .iter()
            .map(|e| distance_meters(origin, e.coordinate))
            .collect();
        assert!(
            distances.windows(2).all(|pair| match pair {
                [a, b] => a <= b,
                _ => true,
            }),
            "closest first"
        );
    }

    #[tokio::test]
    async fn only_the_latest_report_per_entity_is_returned() {
        let store = OverReturningStore::default();
        let me = EntityId::new();
        let wanderer = EntityId::new();
        let now = Utc::now();
        let origin = Coordinate::new(0.0, 0.0);

        store
            .push(wanderer, Coordinate::new(0.004, 0.0), minutes_ago(now, 3))
            .await;
        store
            .push(wanderer, Coordinate::new(0.001, 0.0), minutes_ago(now, 1))
            .await;

        let found = nearby(&store, me, origin, five_minute_params(), now)
            .await
            .unwrap_or_default();
        assert_eq!(found.len(), 1);
        let entry = found.first();
        assert!(entry.is_some_and(|e| (e.coordinate.longitude - 0.001).abs() < 1e-12));
    }
}
