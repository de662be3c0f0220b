//! Channel keys, message kinds, and the fire-and-forget event dispatcher.
//!
//! The dispatcher is an explicitly constructed instance injected into the
//! ingestion pipeline -- there is no process-wide transport handle. A
//! dispatcher built without a transport yields the typed
//! [`DispatchError::TransportNotConfigured`] instead of an access fault,
//! and like every other publish failure it is logged and swallowed:
//! ingestion of a position must never fail merely because no one is
//! listening.
//!
//! # Routing
//!
//! | Kind | Channels |
//! |------|----------|
//! | `location.update` | `entity:<id>` + `operators` |
//! | `geofence.alert` | `entity:<id>`; also the zone owner's channel when the owner differs |
//! | `proximity.snapshot` | requesting entity's channel only |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use perimeter_types::{EntityId, GeofenceAlert, LocationUpdate, ProximitySnapshot};
use serde::Serialize;
use tokio::time::timeout;
use tracing::warn;

/// A subscriber channel, rendered as an opaque string for the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// The private channel of a single entity (`entity:<id>`).
    Entity(EntityId),
    /// The broadcast channel for privileged observers (`operators`).
    Operators,
}

impl core::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Entity(id) => write!(f, "entity:{id}"),
            Self::Operators => f.write_str("operators"),
        }
    }
}

/// The three message kinds the engine publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A raw position update.
    LocationUpdate,
    /// A containment-transition alert.
    GeofenceAlert,
    /// A nearby-entities snapshot.
    ProximitySnapshot,
}

impl MessageKind {
    /// Stable wire name of the message kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocationUpdate => "location.update",
            Self::GeofenceAlert => "geofence.alert",
            Self::ProximitySnapshot => "proximity.snapshot",
        }
    }
}

impl core::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a publish attempt.
///
/// None of these ever propagate out of the dispatcher's public methods;
/// they exist so failures are typed, loggable, and testable.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher was constructed without a transport.
    #[error("event transport is not configured")]
    TransportNotConfigured,

    /// The transport did not accept the message within the publish
    /// timeout.
    #[error("publish to {channel} timed out after {timeout_ms} ms")]
    Timeout {
        /// The target channel key.
        channel: String,
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The transport rejected the message.
    #[error("publish to {channel} failed: {message}")]
    Publish {
        /// The target channel key.
        channel: String,
        /// Transport-specific failure description.
        message: String,
    },

    /// The payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The publish/subscribe transport seam.
///
/// Channel keys are opaque strings to the transport; no acknowledgement
/// is required or awaited. The production implementation lives in the
/// service binary (NATS); tests use recording or failing fakes.
pub trait EventTransport: Send + Sync {
    /// Publish one message to one channel.
    fn publish(
        &self,
        channel: &ChannelKey,
        kind: MessageKind,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// Fire-and-forget publisher over an [`EventTransport`].
///
/// Every publish is bounded by the configured timeout. The routing
/// methods ([`location_update`], [`geofence_alert`],
/// [`proximity_snapshot`]) log failures at `warn` and return `()`;
/// [`try_publish`] exposes the typed result for tests and callers that
/// care.
///
/// [`location_update`]: Dispatcher::location_update
/// [`geofence_alert`]: Dispatcher::geofence_alert
/// [`proximity_snapshot`]: Dispatcher::proximity_snapshot
/// [`try_publish`]: Dispatcher::try_publish
#[derive(Debug)]
pub struct Dispatcher<T> {
    transport: Option<Arc<T>>,
    publish_timeout: Duration,
}

impl<T: EventTransport> Dispatcher<T> {
    /// Create a dispatcher over a connected transport.
    pub const fn new(transport: Arc<T>, publish_timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            publish_timeout,
        }
    }

    /// Create a dispatcher with no transport attached.
    ///
    /// Every publish attempt yields
    /// [`DispatchError::TransportNotConfigured`], which the routing
    /// methods log and swallow. Useful before the transport is up and in
    /// tests that only exercise the storage path.
    pub const fn unconfigured(publish_timeout: Duration) -> Self {
        Self {
            transport: None,
            publish_timeout,
        }
    }

    /// Publish one payload to one channel, returning the typed result.
    pub async fn try_publish(
        &self,
        channel: &ChannelKey,
        kind: MessageKind,
        payload: &impl Serialize,
    ) -> Result<(), DispatchError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or(DispatchError::TransportNotConfigured)?;
        let value = serde_json::to_value(payload)?;

        match timeout(self.publish_timeout, transport.publish(channel, kind, &value)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                channel: channel.to_string(),
                timeout_ms: u64::try_from(self.publish_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }),
        }
    }

    /// Publish and swallow the result, logging failures at `warn`.
    async fn publish_or_log(
        &self,
        channel: &ChannelKey,
        kind: MessageKind,
        payload: &impl Serialize,
    ) {
        if let Err(e) = self.try_publish(channel, kind, payload).await {
            warn!(channel = %channel, kind = %kind, error = %e, "event dropped");
        }
    }

    /// Publish a raw position update to the entity's channel and to the
    /// operators broadcast channel.
    pub async fn location_update(&self, update: &LocationUpdate) {
        self.publish_or_log(
            &ChannelKey::Entity(update.entity_id),
            MessageKind::LocationUpdate,
            update,
        )
        .await;
        self.publish_or_log(&ChannelKey::Operators, MessageKind::LocationUpdate, update)
            .await;
    }

    /// Publish a geofence alert to the affected entity and, when the
    /// zone owner is someone else, to the owner's channel as well.
    pub async fn geofence_alert(&self, zone_owner: EntityId, alert: &GeofenceAlert) {
        self.publish_or_log(
            &ChannelKey::Entity(alert.entity_id),
            MessageKind::GeofenceAlert,
            alert,
        )
        .await;
        if zone_owner != alert.entity_id {
            self.publish_or_log(
                &ChannelKey::Entity(zone_owner),
                MessageKind::GeofenceAlert,
                alert,
            )
            .await;
        }
    }

    /// Publish a proximity snapshot to the requesting entity only.
    pub async fn proximity_snapshot(&self, entity: EntityId, snapshot: &ProximitySnapshot) {
        self.publish_or_log(
            &ChannelKey::Entity(entity),
            MessageKind::ProximitySnapshot,
            snapshot,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perimeter_types::AlertKind;
    use perimeter_types::{Coordinate, NewPositionReport, ZoneId};
    use tokio::sync::Mutex;

    /// Records every publish for assertions.
    #[derive(Default)]
    struct RecordingTransport {
        messages: Mutex<Vec<(String, MessageKind)>>,
    }

    impl EventTransport for RecordingTransport {
        async fn publish(
            &self,
            channel: &ChannelKey,
            kind: MessageKind,
            _payload: &serde_json::Value,
        ) -> Result<(), DispatchError> {
            self.messages.lock().await.push((channel.to_string(), kind));
            Ok(())
        }
    }

    /// Always refuses the message.
    struct FailingTransport;

    impl EventTransport for FailingTransport {
        async fn publish(
            &self,
            channel: &ChannelKey,
            _kind: MessageKind,
            _payload: &serde_json::Value,
        ) -> Result<(), DispatchError> {
            Err(DispatchError::Publish {
                channel: channel.to_string(),
                message: "no subscribers".to_owned(),
            })
        }
    }

    fn sample_update(entity: EntityId) -> LocationUpdate {
        let report = NewPositionReport::new(entity, Coordinate::new(0.0, 0.0))
            .into_report(Utc::now());
        LocationUpdate {
            entity_id: entity,
            position: report,
        }
    }

    #[test]
    fn channel_keys_render_as_documented() {
        let entity = EntityId::new();
        assert_eq!(
            ChannelKey::Entity(entity).to_string(),
            format!("entity:{entity}")
        );
        assert_eq!(ChannelKey::Operators.to_string(), "operators");
    }

    #[tokio::test]
    async fn location_update_goes_to_entity_and_operators() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(Arc::clone(&transport), Duration::from_secs(1));
        let entity = EntityId::new();

        dispatcher.location_update(&sample_update(entity)).await;

        let messages = transport.messages.lock().await;
        assert_eq!(messages.len(), 2);
        assert!(
            messages
                .iter()
                .any(|(channel, _)| channel == &format!("entity:{entity}"))
        );
        assert!(messages.iter().any(|(channel, _)| channel == "operators"));
    }

    #[tokio::test]
    async fn alert_reaches_owner_only_when_different() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(Arc::clone(&transport), Duration::from_secs(1));
        let entity = EntityId::new();
        let owner = EntityId::new();

        let alert = GeofenceAlert {
            kind: AlertKind::Enter,
            zone_id: ZoneId::new(),
            zone_name: "Depot".to_owned(),
            entity_id: entity,
            timestamp: Utc::now(),
        };

        dispatcher.geofence_alert(owner, &alert).await;
        assert_eq!(transport.messages.lock().await.len(), 2);

        // When the triggering entity owns the zone, only one copy goes out.
        transport.messages.lock().await.clear();
        dispatcher.geofence_alert(entity, &alert).await;
        assert_eq!(transport.messages.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let dispatcher = Dispatcher::new(Arc::new(FailingTransport), Duration::from_secs(1));
        // Must not panic or propagate; the method returns ().
        dispatcher
            .location_update(&sample_update(EntityId::new()))
            .await;
    }

    #[tokio::test]
    async fn unconfigured_transport_is_a_typed_error() {
        let dispatcher = Dispatcher::<RecordingTransport>::unconfigured(Duration::from_secs(1));
        let result = dispatcher
            .try_publish(
                &ChannelKey::Operators,
                MessageKind::LocationUpdate,
                &sample_update(EntityId::new()),
            )
            .await;
        assert!(matches!(result, Err(DispatchError::TransportNotConfigured)));

        // And the fire-and-forget path swallows it.
        dispatcher
            .location_update(&sample_update(EntityId::new()))
            .await;
    }
}
