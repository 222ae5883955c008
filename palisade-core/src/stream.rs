//! Streamed results with deferred, exactly-once context cleanup.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::Stream;
use futures::FutureExt;
use tracing::debug;

use crate::client::{ClientConnection, Lease, RowStream};
use crate::error::{Error, Result};
use crate::executor::restore_lease;

/// Where the stream is in its lifecycle.
///
/// `Streaming` turns into `Cleanup` on whichever of end, error or caller
/// drop happens first; `Cleanup` runs the one-shot reset/release future and
/// then yields the buffered terminal item. The linear phase transitions make
/// a second cleanup structurally impossible — there is no flag to race on.
enum Phase<C: ClientConnection> {
    Streaming {
        rows: RowStream<C::Row>,
        // Boxed so the stream stays `Unpin` for any connection type.
        bracket: Option<Box<Bracket<C>>>,
    },
    Cleanup {
        fut: BoxFuture<'static, ()>,
        pending: Option<Error>,
    },
    Done,
}

/// The lease and reset statement a stand-alone stream is responsible for.
struct Bracket<C: ClientConnection> {
    lease: Lease<C>,
    reset_sql: String,
}

/// A finite, non-restartable sequence of rows scoped to one tenant context.
///
/// Obtained from [`VirtualConnection::query_stream`] — in which case the
/// stream owns the lease its rows travel on and resets/releases it exactly
/// once after the terminal event — or from a transaction's `query_stream`,
/// in which case the pinned lease stays with the transaction and cleanup is
/// deferred to its commit/rollback.
///
/// The terminal error, if any, is yielded only after cleanup completed, so a
/// caller that has seen the stream finish can immediately reuse the pool
/// without observing residual context. Dropping the stream mid-flight
/// discards the lease instead of returning it.
///
/// [`VirtualConnection::query_stream`]: crate::VirtualConnection::query_stream
pub struct ScopedRowStream<C: ClientConnection> {
    phase: Phase<C>,
    delivered: u64,
}

impl<C: ClientConnection> ScopedRowStream<C> {
    /// Stream that owns its lease and cleans up on completion.
    pub(crate) fn bracketed(rows: RowStream<C::Row>, lease: Lease<C>, reset_sql: String) -> Self {
        Self {
            phase: Phase::Streaming {
                rows,
                bracket: Some(Box::new(Bracket { lease, reset_sql })),
            },
            delivered: 0,
        }
    }

    /// Stream inside a transaction; the pinned lease stays with the
    /// transaction and no cleanup runs here.
    pub(crate) fn retained(rows: RowStream<C::Row>) -> Self {
        Self {
            phase: Phase::Streaming {
                rows,
                bracket: None,
            },
            delivered: 0,
        }
    }

    /// Number of rows yielded so far.
    pub fn rows_delivered(&self) -> u64 {
        self.delivered
    }

    /// Swap to the cleanup phase, buffering the terminal item.
    fn start_cleanup(&mut self, pending: Option<Error>) {
        let phase = std::mem::replace(&mut self.phase, Phase::Done);
        let bracket = match phase {
            Phase::Streaming { bracket, .. } => bracket,
            _ => None,
        };

        let fut: BoxFuture<'static, ()> = match bracket {
            Some(bracket) => {
                debug!(rows = self.delivered, "stream finished; restoring lease");
                let Bracket { lease, reset_sql } = *bracket;
                async move { restore_lease(lease, &reset_sql).await }.boxed()
            }
            None => {
                debug!(rows = self.delivered, "stream finished inside transaction");
                futures::future::ready(()).boxed()
            }
        };

        self.phase = Phase::Cleanup { fut, pending };
    }
}

impl<C: ClientConnection> std::fmt::Debug for ScopedRowStream<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match &self.phase {
            Phase::Streaming { .. } => "Streaming",
            Phase::Cleanup { .. } => "Cleanup",
            Phase::Done => "Done",
        };
        f.debug_struct("ScopedRowStream")
            .field("phase", &phase)
            .field("delivered", &self.delivered)
            .finish()
    }
}

impl<C: ClientConnection> Stream for ScopedRowStream<C> {
    type Item = Result<C::Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.phase {
                Phase::Streaming { rows, .. } => match Pin::new(rows).poll_next(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Some(Ok(row))) => {
                        this.delivered += 1;
                        return Poll::Ready(Some(Ok(row)));
                    }
                    Poll::Ready(Some(Err(err))) => {
                        this.start_cleanup(Some(Error::statement(err)));
                    }
                    Poll::Ready(None) => {
                        this.start_cleanup(None);
                    }
                },
                Phase::Cleanup { fut, pending } => match fut.poll_unpin(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(()) => {
                        let item = pending.take().map(Err);
                        this.phase = Phase::Done;
                        return Poll::Ready(item);
                    }
                },
                Phase::Done => return Poll::Ready(None),
            }
        }
    }
}
