//! NATS integration: the outbound event transport and the intake
//! subjects.
//!
//! Outbound, channel keys map to subjects under `perimeter.events.*`:
//!
//! | Channel key | Subject |
//! |-------------|---------|
//! | `entity:<id>` | `perimeter.events.entity.<id>` |
//! | `operators` | `perimeter.events.operators` |
//!
//! Every published message is a JSON envelope `{"kind": ..., "payload":
//! ...}` so subscribers on a wildcard can demultiplex without inspecting
//! the subject.
//!
//! Inbound, clients publish position reports on
//! `perimeter.ingest.position.<entity_id>` and nearby-location requests
//! on `perimeter.ingest.nearby.<entity_id>`. The final subject token
//! must match the payload's entity; identity itself is established by
//! the gateway in front of the broker, not here.

use perimeter_core::dispatch::{ChannelKey, DispatchError, EventTransport, MessageKind};
use perimeter_types::{Coordinate, EntityId};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServiceError;

/// Wildcard subject for incoming position reports.
pub const POSITION_INGEST_SUBJECTS: &str = "perimeter.ingest.position.*";

/// Wildcard subject for incoming nearby-location requests.
pub const NEARBY_REQUEST_SUBJECTS: &str = "perimeter.ingest.nearby.*";

/// A nearby-locations request payload.
///
/// Both fields are optional: a missing point anchors the query on the
/// entity's last known position, and a missing radius uses the
/// configured default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NearbyRequest {
    /// Query anchor point.
    #[serde(default)]
    pub point: Option<Coordinate>,
    /// Search radius in meters.
    #[serde(default)]
    pub radius_m: Option<f64>,
}

/// NATS-backed implementation of the engine's event transport.
pub struct NatsTransport {
    client: async_nats::Client,
}

impl NatsTransport {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Nats`] if the connection cannot be
    /// established.
    pub async fn connect(url: &str) -> Result<Self, ServiceError> {
        info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ServiceError::Nats(format!("failed to connect to {url}: {e}")))?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// A clone of the underlying client, for intake subscriptions and
    /// request replies.
    pub fn client(&self) -> async_nats::Client {
        self.client.clone()
    }

    /// Map an opaque channel key to its NATS subject.
    fn subject_for(channel: &ChannelKey) -> String {
        match channel {
            ChannelKey::Entity(id) => format!("perimeter.events.entity.{id}"),
            ChannelKey::Operators => "perimeter.events.operators".to_owned(),
        }
    }

    /// Subscribe to incoming position reports.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Nats`] if the subscription fails.
    pub async fn subscribe_positions(&self) -> Result<async_nats::Subscriber, ServiceError> {
        subscribe(&self.client, POSITION_INGEST_SUBJECTS).await
    }

    /// Subscribe to incoming nearby-location requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Nats`] if the subscription fails.
    pub async fn subscribe_nearby(&self) -> Result<async_nats::Subscriber, ServiceError> {
        subscribe(&self.client, NEARBY_REQUEST_SUBJECTS).await
    }
}

/// Subscribe to a subject, wrapping the error with context.
async fn subscribe(
    client: &async_nats::Client,
    subject: &'static str,
) -> Result<async_nats::Subscriber, ServiceError> {
    debug!(subject = subject, "subscribing");
    let subscriber = client
        .subscribe(subject.to_owned())
        .await
        .map_err(|e| ServiceError::Nats(format!("failed to subscribe to {subject}: {e}")))?;
    info!(subject = subject, "subscription established");
    Ok(subscriber)
}

impl EventTransport for NatsTransport {
    async fn publish(
        &self,
        channel: &ChannelKey,
        kind: MessageKind,
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let subject = Self::subject_for(channel);
        let envelope = serde_json::json!({
            "kind": kind.as_str(),
            "payload": payload,
        });
        let bytes = serde_json::to_vec(&envelope).map_err(DispatchError::Payload)?;

        self.client
            .publish(subject, bytes.into())
            .await
            .map_err(|e| DispatchError::Publish {
                channel: channel.to_string(),
                message: e.to_string(),
            })
    }
}

/// Extract the entity identifier from the last token of an intake
/// subject.
pub fn entity_from_subject(subject: &str) -> Option<EntityId> {
    let token = subject.rsplit('.').next()?;
    Uuid::parse_str(token).ok().map(EntityId::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_keys_map_to_event_subjects() {
        let entity = EntityId::new();
        assert_eq!(
            NatsTransport::subject_for(&ChannelKey::Entity(entity)),
            format!("perimeter.events.entity.{entity}")
        );
        assert_eq!(
            NatsTransport::subject_for(&ChannelKey::Operators),
            "perimeter.events.operators"
        );
    }

    #[test]
    fn entity_is_parsed_from_the_last_subject_token() {
        let entity = EntityId::new();
        let subject = format!("perimeter.ingest.position.{entity}");
        assert_eq!(entity_from_subject(&subject), Some(entity));
    }

    #[test]
    fn malformed_subject_tokens_are_rejected() {
        assert_eq!(entity_from_subject("perimeter.ingest.position.not-a-uuid"), None);
        assert_eq!(entity_from_subject(""), None);
    }

    #[test]
    fn nearby_request_accepts_an_empty_body() {
        let request: NearbyRequest = serde_json::from_str("{}").unwrap_or_default();
        assert!(request.point.is_none());
        assert!(request.radius_m.is_none());
    }
}
