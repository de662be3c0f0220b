//! Dragonfly (Redis-compatible) last-known-position cache.
//!
//! Dragonfly holds the hot last-position record for every entity so the
//! latest-position path does not touch `PostgreSQL` on every lookup.
//! Entries are written through on ingestion and expire on their own, so
//! a stale cache can only ever miss, never lie for long.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `entity:{id}:last_position` | JSON | The entity's most recent [`PositionReport`] |

use fred::prelude::*;
use fred::types::Expiration;
use perimeter_types::{EntityId, PositionReport};

use crate::error::DbError;

/// Default time-to-live for last-position keys, in seconds.
///
/// An hour comfortably covers both proximity recency windows while still
/// letting idle entities age out of the hot set.
const DEFAULT_TTL_SECS: i64 = 3_600;

/// Connection handle to a Dragonfly (Redis-compatible) instance holding
/// last-known positions.
#[derive(Clone)]
pub struct LatestPositionCache {
    client: Client,
    ttl_secs: i64,
}

impl LatestPositionCache {
    /// Connect to Dragonfly at the given URL.
    ///
    /// The URL follows the Redis URL scheme: `redis://host:port` or
    /// `redis://host:port/db`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self {
            client,
            ttl_secs: DEFAULT_TTL_SECS,
        })
    }

    /// Override the key time-to-live.
    #[must_use]
    pub const fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// The cache key for an entity's last position.
    fn key(entity: EntityId) -> String {
        format!("entity:{entity}:last_position")
    }

    /// Write through an entity's latest report.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn store(&self, report: &PositionReport) -> Result<(), DbError> {
        let json = serde_json::to_string(report)?;
        let _: () = self
            .client
            .set(
                Self::key(report.entity_id),
                json.as_str(),
                Some(Expiration::EX(self.ttl_secs)),
                None,
                false,
            )
            .await?;
        Ok(())
    }

    /// Read an entity's last known position, if cached.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the cached value does not
    /// deserialize. Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn fetch(&self, entity: EntityId) -> Result<Option<PositionReport>, DbError> {
        let value: Option<String> = self.client.get(Self::key(entity)).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::Serialization)
    }

    /// Drop an entity's cached position.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn clear(&self, entity: EntityId) -> Result<(), DbError> {
        let _: u32 = self.client.del(Self::key(entity)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pattern_is_stable() {
        let entity = EntityId::new();
        assert_eq!(
            LatestPositionCache::key(entity),
            format!("entity:{entity}:last_position")
        );
    }
}
