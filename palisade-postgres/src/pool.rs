//! The shared connection pool every virtual connection draws from.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use palisade_core::client::PoolClient;
use palisade_core::{DriverError, SessionConfig, TenantContext, VirtualConnection};

use crate::config::PgConfig;
use crate::error::{PgError, PgResult};
use crate::lease::PgSession;

/// A shared PostgreSQL connection pool.
///
/// The pool is the one resource shared across tenants. It owns the physical
/// connections and their lifetime; virtual connections handed out by
/// [`connection`](Self::connection) only lease from it. Handles are cheap to
/// clone and all draw from the same pool.
#[derive(Clone)]
pub struct PgPool {
    inner: Pool,
    config: Arc<PgConfig>,
    session: Arc<SessionConfig>,
}

impl PgPool {
    /// Create a pool from configuration with default pool sizing.
    pub async fn new(config: PgConfig) -> PgResult<Self> {
        Self::with_pool_config(config, PoolConfig::default()).await
    }

    /// Create a pool with custom sizing and session variables.
    pub async fn with_pool_config(config: PgConfig, pool_config: PoolConfig) -> PgResult<Self> {
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(config.to_pg_config(), NoTls, mgr_config);

        let pool = Pool::builder(mgr)
            .max_size(pool_config.max_connections)
            .wait_timeout(pool_config.connection_timeout)
            .create_timeout(pool_config.connection_timeout)
            .recycle_timeout(pool_config.idle_timeout)
            .build()
            .map_err(|e| PgError::config(format!("failed to create pool: {}", e)))?;

        info!(
            host = %config.host,
            port = %config.port,
            database = %config.database,
            max_connections = %pool_config.max_connections,
            "PostgreSQL connection pool created"
        );

        Ok(Self {
            inner: pool,
            config: Arc::new(config),
            session: Arc::new(pool_config.session),
        })
    }

    /// Create a builder for configuring the pool.
    pub fn builder() -> PgPoolBuilder {
        PgPoolBuilder::new()
    }

    /// Create a virtual connection scoped to one tenant context.
    ///
    /// This is the only statement surface tenants get; the pool itself hands
    /// out no unscoped connections to application code.
    pub fn connection(&self, context: TenantContext) -> VirtualConnection<PgPool> {
        VirtualConnection::with_session(self.clone(), context, (*self.session).clone())
    }

    /// The pool configuration.
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    /// The session variables written by virtual connections.
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Current pool occupancy.
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        PoolStatus {
            available: status.available as usize,
            size: status.size as usize,
            max_size: status.max_size as usize,
            waiting: status.waiting,
        }
    }

    /// Check pool health by running a trivial query.
    pub async fn is_healthy(&self) -> bool {
        match self.inner.get().await {
            Ok(client) => client.query_one("SELECT 1", &[]).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Close the pool and all its connections.
    ///
    /// Only this owning handle may do so; virtual connections refuse.
    pub fn close(&self) {
        self.inner.close();
        info!("PostgreSQL connection pool closed");
    }
}

#[async_trait]
impl PoolClient for PgPool {
    type Connection = PgSession;

    async fn acquire(&self) -> Result<PgSession, DriverError> {
        debug!("acquiring connection from pool");
        let client = self
            .inner
            .get()
            .await
            .map_err(|e| DriverError::new(PgError::Pool(e)))?;
        Ok(PgSession::new(client))
    }
}

/// Pool occupancy information.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    /// Number of available (idle) connections.
    pub available: usize,
    /// Current total size of the pool.
    pub size: usize,
    /// Maximum size of the pool.
    pub max_size: usize,
    /// Number of tasks waiting for a connection.
    pub waiting: usize,
}

/// Sizing and session-variable configuration for the pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: usize,
    /// Maximum time to wait for a connection.
    pub connection_timeout: Option<Duration>,
    /// Maximum idle time before a connection is recycled.
    pub idle_timeout: Option<Duration>,
    /// Session variables virtual connections write.
    pub session: SessionConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connection_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(600)),
            session: SessionConfig::default(),
        }
    }
}

/// Builder for creating a connection pool.
#[derive(Debug, Default)]
pub struct PgPoolBuilder {
    config: Option<PgConfig>,
    url: Option<String>,
    pool_config: PoolConfig,
}

impl PgPoolBuilder {
    /// Create a new pool builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: PgConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.pool_config.max_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connection_timeout = Some(timeout);
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = Some(timeout);
        self
    }

    /// Set the session variables virtual connections write.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.pool_config.session = session;
        self
    }

    /// Build the connection pool.
    pub async fn build(self) -> PgResult<PgPool> {
        let config = if let Some(config) = self.config {
            config
        } else if let Some(url) = self.url {
            PgConfig::from_url(url)?
        } else {
            return Err(PgError::config("no database URL or config provided"));
        };

        PgPool::with_pool_config(config, self.pool_config).await
    }
}
