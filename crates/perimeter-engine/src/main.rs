//! Perimeter geofencing engine service binary.
//!
//! Wires the ingestion pipeline to its production collaborators: the
//! `PostgreSQL` zone catalog and position store, the Dragonfly
//! last-position cache, and the NATS event transport. Position reports
//! and nearby-location requests arrive over NATS intake subjects; alerts
//! and snapshots leave over the `perimeter.events.*` subjects.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `perimeter-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and build the stores
//! 4. Connect to Dragonfly and compose the cached position store
//! 5. Connect to NATS and build the event transport
//! 6. Assemble the dispatcher and ingestion pipeline
//! 7. Run the intake loop until ctrl-c

mod error;
mod nats;

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use perimeter_core::dispatch::Dispatcher;
use perimeter_core::{EngineConfig, IngestPipeline};
use perimeter_db::{
    CachedPositionStore, LatestPositionCache, PgPositionStore, PgZoneStore, PostgresPool,
};
use perimeter_types::{NewPositionReport, ProximitySnapshot};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServiceError;
use crate::nats::{NatsTransport, NearbyRequest, entity_from_subject};

/// The fully wired pipeline type used by the service.
type EnginePipeline = IngestPipeline<PgZoneStore, CachedPositionStore, NatsTransport>;

/// Application entry point for the geofencing engine.
///
/// Initializes all subsystems and runs the intake loop. Returns an
/// error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with_target(true)
        .init();

    info!(service = config.service.name, "perimeter-engine starting");
    info!(
        nats_url = config.infrastructure.nats_url,
        intake_concurrency = config.service.intake_concurrency,
        snapshot_window_secs = config.tracking.snapshot_window_secs,
        nearby_window_secs = config.tracking.nearby_window_secs,
        "Configuration loaded"
    );

    // 3. Connect to PostgreSQL and build the stores.
    let pg = PostgresPool::connect_url(&config.infrastructure.postgres_url)
        .await
        .map_err(ServiceError::Db)?;
    let zones = Arc::new(PgZoneStore::new(&pg));

    // 4. Connect to Dragonfly and compose the cached position store.
    let cache = LatestPositionCache::connect(&config.infrastructure.dragonfly_url)
        .await
        .map_err(ServiceError::Db)?;
    let positions = Arc::new(CachedPositionStore::new(PgPositionStore::new(&pg), cache));

    // 5. Connect to NATS.
    let transport = Arc::new(NatsTransport::connect(&config.infrastructure.nats_url).await?);

    // 6. Assemble the dispatcher and the ingestion pipeline.
    let dispatcher = Dispatcher::new(Arc::clone(&transport), config.timeouts.publish());
    let responder = Arc::new(Dispatcher::new(
        Arc::clone(&transport),
        config.timeouts.publish(),
    ));
    let pipeline = Arc::new(IngestPipeline::new(zones, positions, dispatcher, &config));
    info!("Ingestion pipeline assembled");

    // 7. Run the intake loop until ctrl-c.
    run_intake(&config, pipeline, responder, &transport).await?;

    info!("perimeter-engine stopped");
    Ok(())
}

/// Load configuration from `perimeter-config.yaml` (or the path in
/// `PERIMETER_CONFIG`), falling back to defaults with environment
/// overrides when the file is absent.
fn load_config() -> Result<EngineConfig, ServiceError> {
    let path =
        std::env::var("PERIMETER_CONFIG").unwrap_or_else(|_| "perimeter-config.yaml".to_owned());
    let path = Path::new(&path);
    if path.exists() {
        Ok(EngineConfig::from_file(path)?)
    } else {
        let mut config = EngineConfig::default();
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }
}

/// The intake loop: pull messages from both subscriptions and hand each
/// one to a bounded worker task until shutdown.
async fn run_intake(
    config: &EngineConfig,
    pipeline: Arc<EnginePipeline>,
    responder: Arc<Dispatcher<NatsTransport>>,
    transport: &NatsTransport,
) -> Result<(), ServiceError> {
    let client = transport.client();
    let mut position_sub = transport.subscribe_positions().await?;
    let mut nearby_sub = transport.subscribe_nearby().await?;
    let semaphore = Arc::new(Semaphore::new(config.service.intake_concurrency));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
            maybe = position_sub.next() => {
                let Some(message) = maybe else {
                    warn!("position subscription closed");
                    return Ok(());
                };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    return Ok(());
                };
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    handle_position(&pipeline, &message).await;
                    drop(permit);
                });
            }
            maybe = nearby_sub.next() => {
                let Some(message) = maybe else {
                    warn!("nearby subscription closed");
                    return Ok(());
                };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    return Ok(());
                };
                let pipeline = Arc::clone(&pipeline);
                let responder = Arc::clone(&responder);
                let client = client.clone();
                tokio::spawn(async move {
                    handle_nearby(&pipeline, &responder, &client, message).await;
                    drop(permit);
                });
            }
        }
    }
}

/// Handle one incoming position report.
async fn handle_position(pipeline: &EnginePipeline, message: &async_nats::Message) {
    let subject: &str = &message.subject;
    let Some(entity) = entity_from_subject(subject) else {
        warn!(subject, "dropping report with unparseable subject");
        return;
    };

    let input: NewPositionReport = match serde_json::from_slice(&message.payload) {
        Ok(input) => input,
        Err(e) => {
            warn!(subject, error = %e, "dropping unparseable position report");
            return;
        }
    };

    // The gateway authenticated the subject token; a payload claiming a
    // different identity is dropped.
    if input.entity_id != entity {
        warn!(
            subject,
            payload_entity = %input.entity_id,
            "dropping report whose payload entity does not match the subject"
        );
        return;
    }

    match pipeline.ingest(input).await {
        Ok(report) => {
            debug!(entity = %entity, position = %report.id, "position ingested");
        }
        Err(e) => {
            warn!(entity = %entity, error = %e, "position ingestion failed");
        }
    }
}

/// Handle one nearby-locations request, replying on the request's reply
/// subject when present and falling back to the entity's event channel
/// otherwise.
async fn handle_nearby(
    pipeline: &EnginePipeline,
    responder: &Dispatcher<NatsTransport>,
    client: &async_nats::Client,
    message: async_nats::Message,
) {
    let subject: &str = &message.subject;
    let Some(entity) = entity_from_subject(subject) else {
        warn!(subject, "dropping request with unparseable subject");
        return;
    };

    let request: NearbyRequest = if message.payload.is_empty() {
        NearbyRequest::default()
    } else {
        match serde_json::from_slice(&message.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(subject, error = %e, "dropping unparseable nearby request");
                return;
            }
        }
    };

    let body = match pipeline
        .nearby_locations(entity, request.point, request.radius_m)
        .await
    {
        Ok(entities) => {
            let snapshot = ProximitySnapshot::from_entities(entities);
            if message.reply.is_none() {
                responder.proximity_snapshot(entity, &snapshot).await;
                return;
            }
            serde_json::to_vec(&snapshot).ok()
        }
        Err(e) => {
            warn!(entity = %entity, error = %e, "nearby query failed");
            serde_json::to_vec(&serde_json::json!({ "error": e.to_string() })).ok()
        }
    };

    let (Some(reply), Some(body)) = (message.reply, body) else {
        return;
    };
    if let Err(e) = client.publish(reply, body.into()).await {
        warn!(entity = %entity, error = %e, "nearby reply failed");
    }
}
