//! Data layer (`PostgreSQL` + Dragonfly) for the Perimeter tracking
//! platform.
//!
//! `PostgreSQL` is the durable store for zone definitions and the
//! append-only position history; Dragonfly (Redis-compatible) holds the
//! hot last-known-position cache consulted by the latest-position path.
//! The store traits this crate implements are defined in
//! `perimeter-core`; the engine never sees SQL or cache keys.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool configuration and handle.
//! - [`zones`] -- [`PgZoneStore`], the zone catalog over the `zones` table.
//! - [`positions`] -- [`PgPositionStore`] and the cache-composing
//!   [`CachedPositionStore`] over the `positions` table.
//! - [`cache`] -- [`LatestPositionCache`], TTL-bounded last-position keys.
//! - [`error`] -- [`DbError`].

pub mod cache;
pub mod error;
pub mod positions;
pub mod postgres;
pub mod zones;

// Re-export primary types at crate root.
pub use cache::LatestPositionCache;
pub use error::DbError;
pub use positions::{CachedPositionStore, PgPositionStore, PositionRow};
pub use postgres::{PostgresConfig, PostgresPool};
pub use zones::{PgZoneStore, ZoneRow};
