//! Error types for the engine service binary.

/// Errors that can abort service startup or the intake loop.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] perimeter_core::ConfigError),

    /// A database or cache connection failed.
    #[error("data layer error: {0}")]
    Db(#[from] perimeter_db::DbError),

    /// A NATS connection or subscription failed.
    #[error("NATS error: {0}")]
    Nats(String),
}
