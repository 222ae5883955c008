//! The narrow seam to the pooled database client.
//!
//! The core never reaches into the pool's internals; it consumes exactly the
//! contract below: acquire a connection, run statements on it, stream rows,
//! and either return the connection or discard it. Pool implementations
//! (deadpool-backed PostgreSQL, in-memory mocks) live behind these traits.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::DriverError;
use crate::value::SqlValue;

/// A finite stream of rows produced by a cursor-style execution.
pub type RowStream<R> = BoxStream<'static, std::result::Result<R, DriverError>>;

/// One physical connection, exclusively checked out.
#[async_trait]
pub trait ClientConnection: Send + 'static {
    /// The driver's row type.
    type Row: Send + 'static;

    /// Execute a query and return all rows.
    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<Vec<Self::Row>, DriverError>;

    /// Execute a statement and return the number of affected rows.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<u64, DriverError>;

    /// Execute a parameterless statement, discarding any result.
    ///
    /// Used for the protocol's own round trips: context-set, context-reset
    /// and transaction control words.
    async fn batch_execute(&mut self, sql: &str) -> std::result::Result<(), DriverError>;

    /// Start a cursor-style execution and return the row stream.
    ///
    /// The stream must stay valid for as long as the connection is checked
    /// out; callers keep the connection alive until the stream finishes.
    async fn query_stream(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<RowStream<Self::Row>, DriverError>;

    /// Detach this connection from its pool and close it.
    ///
    /// Called instead of a normal return when the connection may carry
    /// residual session state (context set but not reset, or an open
    /// transaction). Dropping the connection without calling this returns it
    /// to the pool for reuse.
    fn discard(self);
}

/// A shared pool of physical connections.
///
/// Handles are cheap to clone; all clones draw from the same pool.
#[async_trait]
pub trait PoolClient: Clone + Send + Sync + 'static {
    /// The connection type handed out by this pool.
    type Connection: ClientConnection;

    /// Check a connection out of the pool, waiting if none is idle.
    async fn acquire(&self) -> std::result::Result<Self::Connection, DriverError>;
}

/// Row type handed out by a pool's connections.
pub type RowOf<P> = <<P as PoolClient>::Connection as ClientConnection>::Row;

/// An exclusively-held physical connection checked out for a bounded window:
/// one statement, one transaction, or one stream.
///
/// The lease tracks whether the connection currently carries session state
/// the pool must not see. It is marked dirty right before context-set goes
/// out and clean again once context-reset succeeded. Dropping a clean lease
/// returns the connection to the pool; dropping a dirty one detaches and
/// closes it, so a connection never re-enters the pool mid-protocol — even
/// when the owning operation was cancelled at an await point.
pub struct Lease<C: ClientConnection> {
    conn: Option<C>,
    dirty: bool,
}

impl<C: ClientConnection> Lease<C> {
    /// Wrap a freshly acquired connection.
    pub fn new(conn: C) -> Self {
        Self {
            conn: Some(conn),
            dirty: false,
        }
    }

    /// Mark the connection as carrying session state.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Mark the connection as restored to its baseline.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Whether the connection currently carries session state.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn conn_mut(&mut self) -> &mut C {
        self.conn
            .as_mut()
            .expect("lease used after release/discard")
    }

    /// Execute a query on the leased connection.
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<Vec<C::Row>, DriverError> {
        self.conn_mut().query(sql, params).await
    }

    /// Execute a statement on the leased connection.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<u64, DriverError> {
        self.conn_mut().execute(sql, params).await
    }

    /// Execute a parameterless statement on the leased connection.
    pub async fn batch_execute(&mut self, sql: &str) -> std::result::Result<(), DriverError> {
        self.conn_mut().batch_execute(sql).await
    }

    /// Start a cursor-style execution on the leased connection.
    pub async fn query_stream(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> std::result::Result<RowStream<C::Row>, DriverError> {
        self.conn_mut().query_stream(sql, params).await
    }

    /// Return the connection to the pool.
    ///
    /// Equivalent to dropping the lease: a dirty lease is discarded instead
    /// of returned.
    pub fn release(self) {}

    /// Detach the connection from the pool and close it, regardless of the
    /// dirty flag.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.discard();
        }
    }
}

impl<C: ClientConnection> Drop for Lease<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.dirty {
                tracing::debug!("discarding lease dropped mid-protocol");
                conn.discard();
            }
            // A clean connection goes back to the pool through its own drop.
        }
    }
}
