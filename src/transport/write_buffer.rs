//! Outbound byte queue and write-readiness subscription.
//!
//! Bytes that could not be written immediately wait here in FIFO order.
//! While anything is queued (or a flush is outstanding) exactly one
//! [`WriteReadiness`] subscription exists; it is created when buffering
//! starts and dropped when the queue drains, so an idle transport never
//! wakes up for writability.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::task::noop_waker_ref;
use tokio::io::AsyncWrite;
use tokio::task::AbortHandle;

/// Delay before re-polling a stream that reported `WouldBlock` instead of
/// registering a waker.
pub(crate) const NOT_READY_BACKOFF: Duration = Duration::from_millis(10);

// ============================================================================
// WriteReadiness
// ============================================================================

/// An active write-readiness subscription.
///
/// Backed by the task that waits for the stream to become writable and
/// drains the queue.
#[derive(Debug)]
pub(crate) struct WriteReadiness {
    task: AbortHandle,
}

impl WriteReadiness {
    fn cancel(self) {
        self.task.abort();
    }
}

// ============================================================================
// WriteBuffer
// ============================================================================

/// FIFO of bytes accepted by `send` but not yet written.
#[derive(Debug, Default)]
pub(crate) struct WriteBuffer {
    pending: VecDeque<u8>,
    readiness: Option<WriteReadiness>,
}

impl WriteBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bytes queued and not yet written.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// `true` iff a write-readiness subscription is active.
    #[inline]
    pub(crate) fn is_awaiting_writability(&self) -> bool {
        self.readiness.is_some()
    }

    /// Appends bytes behind everything already queued.
    pub(crate) fn enqueue(&mut self, data: &[u8]) {
        self.pending.extend(data);
    }

    /// Subscribes to write-readiness unless already subscribed.
    ///
    /// `subscribe` is only invoked when a new subscription is needed.
    pub(crate) fn begin_waiting(&mut self, subscribe: impl FnOnce() -> AbortHandle) {
        if self.readiness.is_none() {
            self.readiness = Some(WriteReadiness { task: subscribe() });
        }
    }

    /// Cancels the subscription, if any.
    pub(crate) fn stop_waiting(&mut self) {
        if let Some(readiness) = self.readiness.take() {
            readiness.cancel();
        }
    }

    /// Forgets the subscription without cancelling it.
    ///
    /// Used by the subscription task itself when it is about to finish.
    pub(crate) fn release_subscription(&mut self) {
        self.readiness = None;
    }

    /// Drops every queued byte and the subscription. Returns bytes dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.stop_waiting();
        dropped
    }

    /// Writes queued bytes in order until the queue is empty and flushed.
    ///
    /// Returns `Pending` with `cx` registered as soon as the writer stops
    /// accepting bytes; the bytes written so far are removed from the queue.
    /// A writer that answers `WouldBlock` has registered nothing, so that
    /// error is returned as is and the caller decides when to retry.
    pub(crate) fn poll_drain<W>(&mut self, cx: &mut Context<'_>, writer: &mut W) -> Poll<io::Result<()>>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        while !self.pending.is_empty() {
            let (front, _) = self.pending.as_slices();
            match Pin::new(&mut *writer).poll_write(cx, front) {
                Poll::Ready(Ok(0)) => return Poll::Ready(Err(io::ErrorKind::WriteZero.into())),
                Poll::Ready(Ok(written)) => {
                    self.pending.drain(..written);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }

        Pin::new(writer).poll_flush(cx)
    }
}

// ============================================================================
// Non-blocking Attempts
// ============================================================================

/// Writes as much of `data` as the writer takes right now.
///
/// A writer that is not ready yields [`io::ErrorKind::WouldBlock`].
pub(crate) fn try_write<W>(writer: &mut W, data: &[u8]) -> io::Result<usize>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut cx = Context::from_waker(noop_waker_ref());
    match Pin::new(writer).poll_write(&mut cx, data) {
        Poll::Ready(Ok(0)) if !data.is_empty() => Err(io::ErrorKind::WriteZero.into()),
        Poll::Ready(result) => result,
        Poll::Pending => Err(io::ErrorKind::WouldBlock.into()),
    }
}

/// Flushes without waiting. Returns `false` if the flush is still pending.
pub(crate) fn try_flush<W>(writer: &mut W) -> io::Result<bool>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut cx = Context::from_waker(noop_waker_ref());
    match Pin::new(writer).poll_flush(&mut cx) {
        Poll::Ready(Ok(())) => Ok(true),
        Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Poll::Ready(Err(e)) => Err(e),
        Poll::Pending => Ok(false),
    }
}

/// Starts a shutdown without waiting for it to complete.
pub(crate) fn try_shutdown<W>(writer: &mut W) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut cx = Context::from_waker(noop_waker_ref());
    match Pin::new(writer).poll_shutdown(&mut cx) {
        Poll::Ready(Err(e)) if e.kind() != io::ErrorKind::WouldBlock => Err(e),
        _ => Ok(()),
    }
}

// ============================================================================
// Tests
// ============================================================================
