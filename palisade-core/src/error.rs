//! Error types for the session-context protocol.

use std::fmt;

use thiserror::Error;

use crate::transaction::TransactionState;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An opaque error produced by the underlying pool or driver.
///
/// The core never inspects driver errors beyond carrying them; classification
/// into the protocol taxonomy happens at the call site that observed the
/// failure (acquire vs. context-set vs. statement).
#[derive(Debug)]
pub struct DriverError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl DriverError {
    /// Wrap a driver error.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    /// Create a driver error from a bare message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }

    /// Borrow the underlying error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Errors surfaced by virtual connections, transactions and streams.
#[derive(Debug, Error)]
pub enum Error {
    /// The pool could not hand out a lease (exhausted or timed out).
    /// Surfaced directly; retry policy belongs to the caller.
    #[error("lease acquisition failed: {0}")]
    Acquire(#[source] DriverError),

    /// The caller's statement failed, including row-level security policy
    /// violations reported by the engine. Rethrown after cleanup completed
    /// or was correctly deferred.
    #[error("statement failed: {0}")]
    Statement(#[source] DriverError),

    /// The context-set call itself failed; the caller's statement never ran.
    #[error("session context setup failed: {0}")]
    ContextSet(#[source] DriverError),

    /// Commit or rollback requested on a transaction that already finished.
    /// A programmer error; fail fast, non-recoverable.
    #[error("transaction is already {state}")]
    TransactionState {
        /// The terminal state the transaction is in.
        state: TransactionState,
    },

    /// Close/destroy requested through a virtual connection. The shared
    /// pool's lifetime belongs to the pool handle that created it.
    #[error("cannot close a virtual connection; close the owning pool instead")]
    VirtualClose,
}

impl Error {
    /// Wrap a driver failure observed while acquiring a lease.
    pub fn acquire(err: impl Into<DriverError>) -> Self {
        Self::Acquire(err.into())
    }

    /// Wrap a driver failure observed while executing a statement.
    pub fn statement(err: impl Into<DriverError>) -> Self {
        Self::Statement(err.into())
    }

    /// Wrap a driver failure observed while binding session context.
    pub fn context_set(err: impl Into<DriverError>) -> Self {
        Self::ContextSet(err.into())
    }

    /// Fail-fast error for a transaction in a terminal state.
    pub fn transaction_state(state: TransactionState) -> Self {
        Self::TransactionState { state }
    }

    /// Check if this is a lease acquisition error.
    pub fn is_acquire(&self) -> bool {
        matches!(self, Self::Acquire(_))
    }

    /// Check if this is a statement error.
    pub fn is_statement(&self) -> bool {
        matches!(self, Self::Statement(_))
    }
}

impl From<String> for DriverError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&str> for DriverError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}
