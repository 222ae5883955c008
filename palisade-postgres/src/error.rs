//! Error types for the PostgreSQL binding.

use palisade_core::DriverError;
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors raised by the PostgreSQL binding itself.
///
/// Protocol-level failures surface through
/// [`palisade_core::Error`]; this type covers the driver seam underneath it
/// and the pool's own configuration and lifecycle.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error came from the pool rather than the database.
    pub fn is_pool_error(&self) -> bool {
        matches!(self, Self::Pool(_))
    }
}

impl From<PgError> for DriverError {
    fn from(err: PgError) -> Self {
        DriverError::new(err)
    }
}
