//! The leased-connection implementation over deadpool objects.

use async_trait::async_trait;
use deadpool_postgres::Object;
use futures::{StreamExt, TryStreamExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

use palisade_core::client::{ClientConnection, RowStream};
use palisade_core::{DriverError, SqlValue};

use crate::error::PgError;
use crate::types::values_to_params;

/// One physical PostgreSQL connection checked out of the shared pool.
///
/// Wraps the deadpool object behind the core's narrow
/// [`ClientConnection`] contract: dropping the session recycles the
/// connection, [`discard`](ClientConnection::discard) detaches and closes it
/// so a connection that still carries session variables (or an open
/// transaction) never returns to the pool.
pub struct PgSession {
    client: Object,
}

impl PgSession {
    pub(crate) fn new(client: Object) -> Self {
        Self { client }
    }

    fn driver_err(err: tokio_postgres::Error) -> DriverError {
        DriverError::new(PgError::Postgres(err))
    }
}

#[async_trait]
impl ClientConnection for PgSession {
    type Row = Row;

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        debug!(sql = %sql, "executing query");

        let stmt = self
            .client
            .prepare_cached(sql)
            .await
            .map_err(Self::driver_err)?;
        let params = values_to_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref() as _).collect();

        self.client
            .query(&stmt, &refs)
            .await
            .map_err(Self::driver_err)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        debug!(sql = %sql, "executing statement");

        let stmt = self
            .client
            .prepare_cached(sql)
            .await
            .map_err(Self::driver_err)?;
        let params = values_to_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref() as _).collect();

        self.client
            .execute(&stmt, &refs)
            .await
            .map_err(Self::driver_err)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        debug!(sql = %sql, "executing batch");
        self.client
            .batch_execute(sql)
            .await
            .map_err(Self::driver_err)
    }

    async fn query_stream(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<RowStream<Row>, DriverError> {
        debug!(sql = %sql, "starting row stream");

        let stmt = self
            .client
            .prepare_cached(sql)
            .await
            .map_err(Self::driver_err)?;
        let params = values_to_params(params);

        let rows = self
            .client
            .query_raw(&stmt, params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)))
            .await
            .map_err(Self::driver_err)?;

        Ok(rows.map_err(Self::driver_err).boxed())
    }

    fn discard(self) {
        debug!("detaching connection from the pool");
        // Taking the client out of the deadpool wrapper closes the physical
        // connection when it drops instead of recycling it.
        let _client = Object::take(self.client);
    }
}
