//! The per-(entity, zone) containment state machine.
//!
//! For every pair the tracker remembers whether the entity is currently
//! inside the zone and, while inside, when the stay began and whether the
//! dwell alert has already fired for it. Given a fresh containment
//! predicate result it computes the transition and emits at most the
//! alert kinds the zone is configured to care about:
//!
//! | previous | now inside | action |
//! |----------|------------|--------|
//! | no record / outside | false | no-op, no record created |
//! | no record / outside | true | record the stay; ENTER if configured |
//! | inside | true | DWELL once per stay after the dwell duration |
//! | inside | false | clear the stay; EXIT if configured |
//!
//! Records are created lazily on the first inside evaluation of a pair
//! and may be purged when a zone is retired or an entity loses
//! authorization -- dwell history for the pair is lost, and dwell simply
//! restarts on the next entry.
//!
//! # Concurrency
//!
//! Updates to a single pair's record are serialized through a per-key
//! [`Mutex`], so two racing reports for the same entity cannot double-fire
//! ENTER or lose a dwell-flag update. Cross-pair evaluations share only a
//! short-lived read lock on the pair map.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use perimeter_types::{AlertConfig, AlertKind, EntityId, Zone, ZoneId};
use tokio::sync::{Mutex, RwLock};

type PairKey = (EntityId, ZoneId);

/// One continuous stay inside a zone.
#[derive(Debug, Clone, Copy)]
struct Stay {
    /// When the entity entered the zone.
    since: DateTime<Utc>,
    /// Whether the dwell alert has fired for this stay.
    dwell_fired: bool,
}

/// Mutable state of one (entity, zone) pair. `stay == None` means the
/// entity is outside the zone.
#[derive(Debug, Default)]
struct PairState {
    stay: Option<Stay>,
}

/// The containment state table, shared across concurrent ingestions.
#[derive(Debug, Default)]
pub struct ContainmentTracker {
    pairs: RwLock<HashMap<PairKey, Arc<Mutex<PairState>>>>,
}

impl ContainmentTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one position against one zone.
    ///
    /// `now_inside` is the containment predicate result for the position;
    /// `at` is the position's capture timestamp, which also drives the
    /// dwell clock. Returns the alert to fire, if any.
    pub async fn evaluate(
        &self,
        zone: &Zone,
        entity: EntityId,
        now_inside: bool,
        at: DateTime<Utc>,
    ) -> Option<AlertKind> {
        let key = (entity, zone.id);

        // Fast path: a pair that has never been inside creates no record
        // for an outside reading.
        let slot = { self.pairs.read().await.get(&key).map(Arc::clone) };
        let slot = match slot {
            Some(slot) => slot,
            None if !now_inside => return None,
            None => {
                let mut pairs = self.pairs.write().await;
                Arc::clone(pairs.entry(key).or_default())
            }
        };

        let mut state = slot.lock().await;
        Self::transition(&mut state, zone.alerts, now_inside, at)
    }

    /// Apply the transition table to one pair's state.
    fn transition(
        state: &mut PairState,
        alerts: AlertConfig,
        now_inside: bool,
        at: DateTime<Utc>,
    ) -> Option<AlertKind> {
        match (state.stay, now_inside) {
            // Outside and staying outside.
            (None, false) => None,

            // The outside-to-inside flip: the stay starts now.
            (None, true) => {
                state.stay = Some(Stay {
                    since: at,
                    dwell_fired: false,
                });
                alerts.on_enter.then_some(AlertKind::Enter)
            }

            // Still inside: only the dwell clock is of interest, and it
            // fires at most once per continuous stay.
            (Some(stay), true) => {
                if alerts.on_dwell && !stay.dwell_fired {
                    let elapsed = at.signed_duration_since(stay.since);
                    if elapsed.num_seconds() >= i64::from(alerts.dwell_seconds) {
                        state.stay = Some(Stay {
                            dwell_fired: true,
                            ..stay
                        });
                        return Some(AlertKind::Dwell);
                    }
                }
                None
            }

            // The inside-to-outside flip: clearing the stay re-arms the
            // dwell alert for the next entry.
            (Some(_), false) => {
                state.stay = None;
                alerts.on_exit.then_some(AlertKind::Exit)
            }
        }
    }

    /// Whether the tracker currently considers `entity` inside `zone`.
    pub async fn is_inside(&self, entity: EntityId, zone: ZoneId) -> bool {
        let slot = { self.pairs.read().await.get(&(entity, zone)).map(Arc::clone) };
        match slot {
            Some(slot) => slot.lock().await.stay.is_some(),
            None => false,
        }
    }

    /// Drop all state for a retired zone.
    pub async fn purge_zone(&self, zone: ZoneId) {
        self.pairs
            .write()
            .await
            .retain(|(_, z), _| *z != zone);
    }

    /// Drop all state for an entity that is no longer tracked or lost
    /// authorization.
    pub async fn purge_entity(&self, entity: EntityId) {
        self.pairs
            .write()
            .await
            .retain(|(e, _), _| *e != entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use perimeter_types::{Coordinate, ZoneShape};

    fn zone_with_alerts(alerts: AlertConfig) -> Zone {
        Zone {
            id: ZoneId::new(),
            name: "Test zone".to_owned(),
            description: None,
            owner: EntityId::new(),
            shape: ZoneShape::Circle {
                center: Coordinate::new(0.0, 0.0),
                radius_m: 100.0,
            },
            active: true,
            authorized: std::collections::BTreeSet::new(),
            alerts,
        }
    }

    fn all_alerts() -> AlertConfig {
        AlertConfig {
            on_enter: true,
            on_exit: true,
            on_dwell: true,
            dwell_seconds: 60,
        }
    }

    fn at_seconds(base: DateTime<Utc>, offset: i64) -> DateTime<Utc> {
        base.checked_add_signed(TimeDelta::seconds(offset))
            .unwrap_or(base)
    }

    #[tokio::test]
    async fn outside_to_outside_is_silent_and_recordless() {
        let tracker = ContainmentTracker::new();
        let zone = zone_with_alerts(all_alerts());
        let entity = EntityId::new();
        let now = Utc::now();

        assert_eq!(tracker.evaluate(&zone, entity, false, now).await, None);
        assert!(!tracker.is_inside(entity, zone.id).await);
        assert!(tracker.pairs.read().await.is_empty());
    }

    #[tokio::test]
    async fn enter_fires_exactly_once_per_stay() {
        let tracker = ContainmentTracker::new();
        let zone = zone_with_alerts(all_alerts());
        let entity = EntityId::new();
        let base = Utc::now();

        assert_eq!(
            tracker.evaluate(&zone, entity, true, base).await,
            Some(AlertKind::Enter)
        );
        // A second inside reading is not a fresh entry.
        assert_eq!(
            tracker
                .evaluate(&zone, entity, true, at_seconds(base, 5))
                .await,
            None
        );
        assert!(tracker.is_inside(entity, zone.id).await);
    }

    #[tokio::test]
    async fn dwell_fires_once_after_the_duration_and_rearms_on_reentry() {
        let tracker = ContainmentTracker::new();
        let zone = zone_with_alerts(all_alerts());
        let entity = EntityId::new();
        let base = Utc::now();

        assert_eq!(
            tracker.evaluate(&zone, entity, true, base).await,
            Some(AlertKind::Enter)
        );
        // Not enough time elapsed yet.
        assert_eq!(
            tracker
                .evaluate(&zone, entity, true, at_seconds(base, 30))
                .await,
            None
        );
        // The boundary is inclusive: exactly dwell_seconds fires.
        assert_eq!(
            tracker
                .evaluate(&zone, entity, true, at_seconds(base, 60))
                .await,
            Some(AlertKind::Dwell)
        );
        // Once per stay, no matter how long the stay continues.
        assert_eq!(
            tracker
                .evaluate(&zone, entity, true, at_seconds(base, 120))
                .await,
            None
        );
        // Exit clears the dwell flag.
        assert_eq!(
            tracker
                .evaluate(&zone, entity, false, at_seconds(base, 130))
                .await,
            Some(AlertKind::Exit)
        );
        // Re-entry starts a fresh stay whose dwell can fire again.
        assert_eq!(
            tracker
                .evaluate(&zone, entity, true, at_seconds(base, 140))
                .await,
            Some(AlertKind::Enter)
        );
        assert_eq!(
            tracker
                .evaluate(&zone, entity, true, at_seconds(base, 205))
                .await,
            Some(AlertKind::Dwell)
        );
    }

    #[tokio::test]
    async fn disabled_flags_suppress_events_but_state_still_flips() {
        let tracker = ContainmentTracker::new();
        let zone = zone_with_alerts(AlertConfig {
            on_enter: false,
            on_exit: false,
            on_dwell: false,
            dwell_seconds: 60,
        });
        let entity = EntityId::new();
        let base = Utc::now();

        assert_eq!(tracker.evaluate(&zone, entity, true, base).await, None);
        assert!(tracker.is_inside(entity, zone.id).await);
        assert_eq!(
            tracker
                .evaluate(&zone, entity, false, at_seconds(base, 10))
                .await,
            None
        );
        assert!(!tracker.is_inside(entity, zone.id).await);
    }

    #[tokio::test]
    async fn dwell_is_not_evaluated_on_the_entry_step() {
        let tracker = ContainmentTracker::new();
        let zone = zone_with_alerts(AlertConfig {
            on_enter: false,
            on_exit: false,
            on_dwell: true,
            dwell_seconds: 0,
        });
        let entity = EntityId::new();
        let base = Utc::now();

        // Even with a zero dwell duration, the entry evaluation itself
        // produces no DWELL; the next inside reading does.
        assert_eq!(tracker.evaluate(&zone, entity, true, base).await, None);
        assert_eq!(
            tracker.evaluate(&zone, entity, true, base).await,
            Some(AlertKind::Dwell)
        );
    }

    #[tokio::test]
    async fn racing_reports_for_one_pair_fire_a_single_enter() {
        let tracker = Arc::new(ContainmentTracker::new());
        let zone = Arc::new(zone_with_alerts(all_alerts()));
        let entity = EntityId::new();
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            let zone = Arc::clone(&zone);
            handles.push(tokio::spawn(async move {
                tracker.evaluate(&zone, entity, true, now).await
            }));
        }

        let mut enters: i32 = 0;
        for handle in handles {
            if let Ok(Some(AlertKind::Enter)) = handle.await {
                enters = enters.saturating_add(1);
            }
        }
        assert_eq!(enters, 1, "exactly one racing report may observe the flip");
    }

    #[tokio::test]
    async fn purging_a_zone_loses_the_stay() {
        let tracker = ContainmentTracker::new();
        let zone = zone_with_alerts(all_alerts());
        let entity = EntityId::new();
        let base = Utc::now();

        assert_eq!(
            tracker.evaluate(&zone, entity, true, base).await,
            Some(AlertKind::Enter)
        );
        tracker.purge_zone(zone.id).await;
        assert!(!tracker.is_inside(entity, zone.id).await);

        // The next inside reading is a fresh entry: dwell restarts.
        assert_eq!(
            tracker
                .evaluate(&zone, entity, true, at_seconds(base, 10))
                .await,
            Some(AlertKind::Enter)
        );
    }

    #[tokio::test]
    async fn purging_an_entity_only_touches_that_entity() {
        let tracker = ContainmentTracker::new();
        let zone = zone_with_alerts(all_alerts());
        let first = EntityId::new();
        let second = EntityId::new();
        let now = Utc::now();

        tracker.evaluate(&zone, first, true, now).await;
        tracker.evaluate(&zone, second, true, now).await;
        tracker.purge_entity(first).await;

        assert!(!tracker.is_inside(first, zone.id).await);
        assert!(tracker.is_inside(second, zone.id).await);
    }
}
