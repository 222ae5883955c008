//! Tenant-scoped virtual connections over a shared pool.

use std::sync::Arc;

use crate::client::{PoolClient, RowOf};
use crate::context::TenantContext;
use crate::error::{Error, Result};
use crate::executor::ScopedExecutor;
use crate::session::SessionConfig;
use crate::stream::ScopedRowStream;
use crate::transaction::ScopedTransaction;
use crate::value::SqlValue;

/// A logical, tenant-scoped handle multiplexed over a shared connection pool.
///
/// Create one per logical caller (typically per request) and discard it after
/// use; construction is cheap and holds no physical connection. Every
/// statement issued through the handle leases a connection just long enough
/// to run `[context-set, statement, context-reset]`; transactions and streams
/// pin a lease for their own lifetime instead.
///
/// The handle never owns the pool. Dropping it releases nothing shared, and
/// [`close`](Self::close) is refused so a caller cannot tear down the pool
/// that every other tenant is multiplexed over.
#[derive(Clone)]
pub struct VirtualConnection<P: PoolClient> {
    pool: P,
    session: Arc<SessionConfig>,
    context: TenantContext,
}

impl<P: PoolClient> VirtualConnection<P> {
    /// Create a virtual connection with the default session variables.
    pub fn new(pool: P, context: TenantContext) -> Self {
        Self::with_session(pool, context, SessionConfig::default())
    }

    /// Create a virtual connection with custom session variables.
    pub fn with_session(pool: P, context: TenantContext, session: SessionConfig) -> Self {
        Self {
            pool,
            session: Arc::new(session),
            context,
        }
    }

    /// The tenant context this handle is bound to.
    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    /// The session variables this handle writes.
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    fn executor(&self) -> ScopedExecutor<'_, P> {
        ScopedExecutor::new(&self.pool, &self.session, &self.context)
    }

    /// Run a query and return all rows, bracketed with context set/reset on a
    /// lease held for just this statement.
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<RowOf<P>>> {
        self.executor().query(sql, params).await
    }

    /// Run a statement and return the affected-row count, bracketed the same
    /// way as [`query`](Self::query).
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.executor().execute(sql, params).await
    }

    /// Run a streamed query; the returned stream holds its lease until the
    /// rows are exhausted or the stream errors, then cleans up exactly once.
    pub async fn query_stream(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ScopedRowStream<P::Connection>> {
        self.executor().query_stream(sql, params).await
    }

    /// Begin a transaction pinned to one physical connection.
    ///
    /// Context is bound once at `BEGIN`; statements issued through the
    /// returned handle skip per-statement scoping, and the reset/release pair
    /// runs inside `commit`/`rollback`.
    pub async fn begin_transaction(&self) -> Result<ScopedTransaction<P>> {
        ScopedTransaction::begin(&self.pool, self.session.clone(), &self.context).await
    }

    /// Refused: the shared pool's lifetime is not this handle's to manage.
    ///
    /// Always returns [`Error::VirtualClose`]; close the owning pool handle
    /// instead.
    pub fn close(&self) -> Result<()> {
        Err(Error::VirtualClose)
    }

    /// Refused, like [`close`](Self::close).
    pub fn destroy(&self) -> Result<()> {
        self.close()
    }
}
