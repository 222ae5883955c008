//! # Palisade
//!
//! Row-level-security multi-tenancy for pooled PostgreSQL connections.
//!
//! Palisade lets many identity-scoped callers share one pool of physical
//! database connections while guaranteeing that every statement runs with the
//! correct per-tenant session context:
//! - Virtual, tenant-scoped connection handles over a shared `deadpool` pool
//! - A set/execute/reset session-variable protocol bracketing every statement
//! - Pinned leases with a checked state machine for explicit transactions
//! - Streaming results with deferred, exactly-once context cleanup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use palisade::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPool::builder()
//!         .url("postgresql://localhost/mydb")
//!         .max_connections(10)
//!         .build()
//!         .await?;
//!
//!     let conn = pool.connection(TenantContext::new("tenant-1", "actor-10"));
//!
//!     // Runs as [context-set, statement, context-reset] on one lease.
//!     let rows = conn
//!         .query("select * from posts", &[])
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Driver-agnostic tenancy core: contexts, the scoping protocol, leases.
pub mod core {
    pub use palisade_core::*;
}

/// PostgreSQL binding: pool, configuration, RLS policy DDL.
pub mod postgres {
    pub use palisade_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use palisade_core::prelude::*;
    pub use palisade_postgres::prelude::*;
}

// Re-export key types at the crate root
pub use palisade_core::{Error, SessionConfig, TenantContext, VirtualConnection};
pub use palisade_postgres::{PgConfig, PgPool};
