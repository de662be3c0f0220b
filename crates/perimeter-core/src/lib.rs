//! Geospatial evaluation and real-time alert dispatch for the Perimeter
//! tracking platform.
//!
//! This crate owns the engine core: the containment state machine that
//! turns successive position reports into enter/exit/dwell transitions,
//! the proximity query semantics, and the dispatcher that publishes the
//! resulting events to subscriber channels. Storage and transport are
//! collaborator contracts ([`stores`], [`dispatch::EventTransport`])
//! implemented elsewhere.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `perimeter-config.yaml`
//!   into strongly-typed structs.
//! - [`dispatch`] -- Channel keys, message kinds, the [`EventTransport`]
//!   seam, and the fire-and-forget [`Dispatcher`].
//! - [`error`] -- [`EngineError`].
//! - [`pipeline`] -- The staged ingestion pipeline driving persistence,
//!   containment evaluation, and proximity snapshots.
//! - [`proximity`] -- Nearby-entity filter semantics over the position
//!   store.
//! - [`stores`] -- Collaborator contracts for the zone catalog and the
//!   position store.
//! - [`tracker`] -- The per-(entity, zone) containment state machine.
//!
//! [`EventTransport`]: dispatch::EventTransport
//! [`Dispatcher`]: dispatch::Dispatcher

pub mod config;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod proximity;
pub mod stores;
pub mod tracker;

// Re-export primary types at crate root.
pub use config::{ConfigError, EngineConfig};
pub use dispatch::{ChannelKey, DispatchError, Dispatcher, EventTransport, MessageKind};
pub use error::EngineError;
pub use pipeline::IngestPipeline;
pub use proximity::{ProximityParams, nearby};
pub use stores::{PositionStore, StoreError, ZoneCatalog};
pub use tracker::ContainmentTracker;
