//! # palisade-core
//!
//! Driver-agnostic core of Palisade: tenant-scoped virtual connections over a
//! shared pool of physical database connections.
//!
//! The crate implements the session-context protocol that keeps row-level
//! security working under connection multiplexing:
//! - Every one-off statement is bracketed as `[context-set, statement,
//!   context-reset]` on a lease held exclusively for that statement.
//! - Transactions pin one lease, set context once at `BEGIN`, and reset once
//!   after `COMMIT`/`ROLLBACK`.
//! - Streams hold their lease until the row stream ends or errors, then clean
//!   up exactly once.
//! - A lease abandoned mid-protocol is detached and closed, never recycled
//!   with residual session state.
//!
//! The physical pool stays behind the narrow [`client::PoolClient`] /
//! [`client::ClientConnection`] traits, so the protocol is testable without a
//! database and portable across pool implementations.
//!
//! ## Example
//!
//! ```rust,ignore
//! use palisade_core::{TenantContext, VirtualConnection};
//!
//! let conn = VirtualConnection::new(pool, TenantContext::new("tenant-1", "actor-10"));
//!
//! // [context-set, statement, context-reset] on a fresh lease:
//! let rows = conn.query("select * from posts", &[]).await?;
//!
//! // context-set once, reset once after commit:
//! let mut tx = conn.begin_transaction().await?;
//! tx.execute("insert into posts (title) values ($1)", &["hello".into()]).await?;
//! tx.commit().await?;
//! ```

pub mod client;
pub mod connection;
pub mod context;
pub mod error;
pub mod executor;
pub mod session;
pub mod stream;
pub mod transaction;
pub mod value;

pub use client::{ClientConnection, Lease, PoolClient, RowStream};
pub use connection::VirtualConnection;
pub use context::{ActorId, TenantContext, TenantId};
pub use error::{DriverError, Error, Result};
pub use executor::ScopedExecutor;
pub use session::SessionConfig;
pub use stream::ScopedRowStream;
pub use transaction::{ScopedTransaction, TransactionState};
pub use value::SqlValue;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::client::{ClientConnection, PoolClient};
    pub use crate::connection::VirtualConnection;
    pub use crate::context::{ActorId, TenantContext, TenantId};
    pub use crate::error::{Error, Result};
    pub use crate::session::SessionConfig;
    pub use crate::value::SqlValue;
}
