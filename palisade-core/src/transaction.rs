//! Pinned-lease transactions with deferred context reset.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{Lease, PoolClient, RowOf};
use crate::context::TenantContext;
use crate::error::{Error, Result};
use crate::executor::{restore_lease, ScopedExecutor};
use crate::session::SessionConfig;
use crate::stream::ScopedRowStream;
use crate::value::SqlValue;

/// Lifecycle of a transaction; the terminal states are permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// `BEGIN` has been issued and neither commit nor rollback has run.
    Active,
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        write!(f, "{}", s)
    }
}

/// A transaction pinned to one physical connection.
///
/// `begin` acquires a lease, binds the tenant context once, and issues the
/// engine's `BEGIN`; the handle is returned already active. Every statement
/// issued through it reuses the pinned lease with no per-statement set or
/// reset. Context-reset and the lease's return happen exactly once, inside
/// `commit` or `rollback`.
///
/// A statement failure leaves the transaction active: the engine has aborted
/// it, so any further round trip on the connection (a reset included) would
/// itself fail and mask the real error. The caller decides when to finalize.
/// Dropping an active transaction discards the pinned connection instead of
/// returning it, which rolls the transaction back on the server side.
pub struct ScopedTransaction<P: PoolClient> {
    lease: Option<Lease<P::Connection>>,
    session: Arc<SessionConfig>,
    state: TransactionState,
    aborted: bool,
}

impl<P: PoolClient> ScopedTransaction<P> {
    /// Acquire a lease, bind context, and issue `BEGIN`.
    pub(crate) async fn begin(
        pool: &P,
        session: Arc<SessionConfig>,
        context: &TenantContext,
    ) -> Result<Self> {
        let executor = ScopedExecutor::new(pool, &session, context);
        let mut lease = executor.acquire_bound().await?;

        debug!(context = %context, "beginning scoped transaction");
        match lease.batch_execute("BEGIN").await {
            Ok(()) => Ok(Self {
                lease: Some(lease),
                session,
                state: TransactionState::Active,
                aborted: false,
            }),
            Err(err) => {
                // Context is already bound; restore before surfacing.
                restore_lease(lease, &session.reset_sql()).await;
                Err(Error::statement(err))
            }
        }
    }

    /// The transaction's current lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether a statement inside this transaction has failed since `BEGIN`.
    ///
    /// The engine rejects further statements on an aborted transaction until
    /// it is finalized; the reset that normally precedes a lease's return is
    /// deferred to [`commit`](Self::commit) / [`rollback`](Self::rollback)
    /// for the same reason.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(Error::transaction_state(self.state))
        }
    }

    fn lease_mut(&mut self) -> &mut Lease<P::Connection> {
        self.lease
            .as_mut()
            .expect("active transaction without a pinned lease")
    }

    /// Run a query on the pinned lease and return its rows.
    pub async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<RowOf<P>>> {
        self.ensure_active()?;

        debug!(sql = %sql, "executing query in transaction");
        match self.lease_mut().query(sql, params).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                self.aborted = true;
                Err(Error::statement(err))
            }
        }
    }

    /// Run a statement on the pinned lease and return the affected-row count.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.ensure_active()?;

        debug!(sql = %sql, "executing statement in transaction");
        match self.lease_mut().execute(sql, params).await {
            Ok(count) => Ok(count),
            Err(err) => {
                self.aborted = true;
                Err(Error::statement(err))
            }
        }
    }

    /// Start a streamed query on the pinned lease.
    ///
    /// The stream holds no lease of its own; context cleanup stays deferred
    /// to this transaction's commit or rollback.
    pub async fn query_stream(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<ScopedRowStream<P::Connection>> {
        self.ensure_active()?;

        debug!(sql = %sql, "starting stream in transaction");
        match self.lease_mut().query_stream(sql, params).await {
            Ok(rows) => Ok(ScopedRowStream::retained(rows)),
            Err(err) => {
                self.aborted = true;
                Err(Error::statement(err))
            }
        }
    }

    /// Commit the transaction, then reset context and release the lease.
    ///
    /// Committing an aborted transaction is forwarded to the engine, which
    /// resolves it as a rollback; the protocol's reset/release then proceeds
    /// normally.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.finalize("COMMIT", TransactionState::Committed).await
    }

    /// Roll the transaction back, then reset context and release the lease.
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.finalize("ROLLBACK", TransactionState::RolledBack).await
    }

    async fn finalize(&mut self, command: &str, on_success: TransactionState) -> Result<()> {
        let mut lease = self
            .lease
            .take()
            .expect("active transaction without a pinned lease");

        debug!(command = %command, aborted = self.aborted, "finalizing transaction");
        let outcome = lease.batch_execute(command).await;

        self.state = match &outcome {
            Ok(()) => on_success,
            // A failed COMMIT leaves the engine rolled back either way.
            Err(_) => TransactionState::RolledBack,
        };

        restore_lease(lease, &self.session.reset_sql()).await;
        outcome.map_err(Error::statement)
    }
}

impl<P: PoolClient> Drop for ScopedTransaction<P> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && self.lease.is_some() {
            // The pinned lease is dirty and will be discarded by its own
            // drop; the server rolls the transaction back on disconnect.
            warn!("transaction dropped while active; discarding its connection");
        }
    }
}
