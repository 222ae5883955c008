//! The set/execute/reset protocol for one-off statements.

use tracing::{debug, warn};

use crate::client::{ClientConnection, Lease, PoolClient, RowOf};
use crate::context::TenantContext;
use crate::error::{Error, Result};
use crate::session::SessionConfig;
use crate::stream::ScopedRowStream;
use crate::value::SqlValue;

/// Executes single statements under the session-context protocol.
///
/// For every statement outside an explicit transaction:
/// 1. acquire a fresh lease, scoped to this statement only;
/// 2. bind the tenant context as session-local state on that lease;
/// 3. run the caller's statement, capturing the outcome without raising;
/// 4. restore the no-context baseline, even when the statement failed;
/// 5. return the lease to the pool;
/// 6. only then surface the captured outcome.
///
/// Two concurrently issued statements never share a physical connection at
/// the same instant, because each runs on its own lease; correctness comes
/// from this per-lease bracketing, not from any global lock. Statements
/// issued inside a transaction never pass through here — the transaction's
/// pinned lease carries its context from `BEGIN` to `COMMIT`/`ROLLBACK`.
pub struct ScopedExecutor<'a, P: PoolClient> {
    pool: &'a P,
    session: &'a SessionConfig,
    context: &'a TenantContext,
}

impl<'a, P: PoolClient> ScopedExecutor<'a, P> {
    /// Create an executor for one tenant context.
    pub fn new(pool: &'a P, session: &'a SessionConfig, context: &'a TenantContext) -> Self {
        Self {
            pool,
            session,
            context,
        }
    }

    /// Run a query statement under the protocol and return its rows.
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<RowOf<P>>> {
        let mut lease = self.acquire_bound().await?;

        debug!(sql = %sql, context = %self.context, "executing scoped query");
        let outcome = lease.query(sql, params).await;

        restore_lease(lease, &self.session.reset_sql()).await;
        outcome.map_err(Error::statement)
    }

    /// Run a statement under the protocol and return the affected-row count.
    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut lease = self.acquire_bound().await?;

        debug!(sql = %sql, context = %self.context, "executing scoped statement");
        let outcome = lease.execute(sql, params).await;

        restore_lease(lease, &self.session.reset_sql()).await;
        outcome.map_err(Error::statement)
    }

    /// Start a streamed query under the protocol.
    ///
    /// The lease moves into the returned stream, which resets and releases it
    /// exactly once when the stream ends or errors. A setup failure cleans up
    /// here, before the error is surfaced.
    pub async fn query_stream(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ScopedRowStream<P::Connection>> {
        let mut lease = self.acquire_bound().await?;

        debug!(sql = %sql, context = %self.context, "starting scoped stream");
        match lease.query_stream(sql, params).await {
            Ok(rows) => Ok(ScopedRowStream::bracketed(
                rows,
                lease,
                self.session.reset_sql(),
            )),
            Err(err) => {
                restore_lease(lease, &self.session.reset_sql()).await;
                Err(Error::statement(err))
            }
        }
    }

    /// Acquire a fresh lease and bind the tenant context on it.
    ///
    /// On a context-set failure the caller's statement must not run; the
    /// lease is discarded (its session state is unknown) and the failure is
    /// surfaced as [`Error::ContextSet`].
    pub(crate) async fn acquire_bound(&self) -> Result<Lease<P::Connection>> {
        let conn = self.pool.acquire().await.map_err(Error::Acquire)?;
        let mut lease = Lease::new(conn);

        lease.mark_dirty();
        match lease.batch_execute(&self.session.set_sql(self.context)).await {
            Ok(()) => Ok(lease),
            Err(err) => {
                lease.discard();
                Err(Error::ContextSet(err))
            }
        }
    }
}

/// Restore a lease to its no-context baseline and return it to the pool.
///
/// A reset failure never masks the statement outcome the caller is waiting
/// for: it is reported as a secondary condition and the lease is discarded
/// instead of returned, so the pool only ever recycles baseline connections.
pub(crate) async fn restore_lease<C: ClientConnection>(mut lease: Lease<C>, reset_sql: &str) {
    match lease.batch_execute(reset_sql).await {
        Ok(()) => {
            lease.mark_clean();
            lease.release();
        }
        Err(err) => {
            warn!(error = %err, "context reset failed; discarding lease");
            lease.discard();
        }
    }
}
