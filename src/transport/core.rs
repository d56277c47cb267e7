//! Core TransportHandle struct, accessors and teardown.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::client::StreamClient;
use crate::connect::BoxedStream;
use crate::error::{Error, Result};
use crate::identifiers::TransportId;

use super::options::TransportConfig;
use super::state::State;
use super::write_buffer::{WriteBuffer, try_shutdown};

// ============================================================================
// Types
// ============================================================================

/// Mutable state guarded by one lock.
pub(crate) struct Shared {
    /// Lifecycle state.
    pub state: State,
    /// Live stream; `Some` only while `Open`.
    pub stream: Option<BoxedStream>,
    /// Outbound queue and writability subscription.
    pub writes: WriteBuffer,
    /// Waker of the read parked on `stream`, woken on close.
    pub read_waker: Option<Waker>,
}

/// Internal shared state for a transport.
pub(crate) struct TransportInner {
    /// Identifier used in logs.
    pub id: TransportId,
    /// Address this transport was created for.
    pub target: String,
    /// Tunables.
    pub config: TransportConfig,
    /// Callback receiver.
    pub client: Arc<dyn StreamClient>,
    /// Runtime the transport was created on; every task is spawned here.
    pub runtime: Handle,
    /// Set once, by close or a terminal connect failure.
    pub cancelled: AtomicBool,
    /// Serializes client callbacks; reentrant so callbacks may call back in.
    pub dispatch: ReentrantMutex<()>,
    /// State, stream and write queue.
    pub shared: Mutex<Shared>,
}

// ============================================================================
// TransportHandle
// ============================================================================

/// Handle to one bidirectional byte-stream transport.
///
/// Cloning is cheap; all clones refer to the same transport. Every
/// in-flight operation (connect, read, writability wait) holds a clone,
/// so the transport outlives its last external handle until those
/// operations finish.
#[derive(Clone)]
pub struct TransportHandle {
    pub(crate) inner: Arc<TransportInner>,
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TransportHandle {
    /// Creates a handle in `Connecting` state with no stream yet.
    ///
    /// Captures the current tokio runtime so later calls may come from any
    /// thread.
    pub(crate) fn new(
        target: String,
        client: Arc<dyn StreamClient>,
        config: TransportConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("Transport must be created within a tokio runtime: {e}")))?;

        let id = TransportId::generate();
        debug!(transport = %id, address = %target, "Transport created");

        Ok(Self {
            inner: Arc::new(TransportInner {
                id,
                target,
                config,
                client,
                runtime,
                cancelled: AtomicBool::new(false),
                dispatch: ReentrantMutex::new(()),
                shared: Mutex::new(Shared {
                    state: State::Connecting,
                    stream: None,
                    writes: WriteBuffer::new(),
                    read_waker: None,
                }),
            }),
        })
    }

    /// Spawns `task` on the transport's runtime.
    pub(crate) fn spawn<F>(&self, task: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.runtime.spawn(task)
    }
}

// ============================================================================
// TransportHandle - Accessors
// ============================================================================

impl TransportHandle {
    /// Returns the transport ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.inner.id
    }

    /// Returns the address this transport was created for.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Returns the configuration in effect.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> State {
        self.inner.shared.lock().state
    }

    /// Returns the number of bytes queued but not yet written.
    #[inline]
    #[must_use]
    pub fn buffered_amount(&self) -> usize {
        self.inner.shared.lock().writes.len()
    }

    /// Returns `true` while a write-readiness subscription is active.
    #[inline]
    #[must_use]
    pub fn is_awaiting_writability(&self) -> bool {
        self.inner.shared.lock().writes.is_awaiting_writability()
    }

    /// Returns `true` once close started or connecting failed.
    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }
}

// ============================================================================
// TransportHandle - Dispatch
// ============================================================================

impl TransportHandle {
    /// Runs a client callback unless the transport was cancelled.
    ///
    /// Returns `false` if the callback was suppressed.
    pub(crate) fn dispatch(&self, callback: impl FnOnce(&dyn StreamClient, &Self)) -> bool {
        let _guard = self.inner.dispatch.lock();
        if self.is_cancelled() {
            return false;
        }
        callback(&*self.inner.client, self);
        true
    }

    /// Reports a fatal error, then tears the transport down.
    pub(crate) fn fail(&self, error: &Error) {
        let _guard = self.inner.dispatch.lock();
        if self.is_cancelled() {
            debug!(transport = %self.inner.id, error = %error, "Failure after cancellation ignored");
            return;
        }

        warn!(transport = %self.inner.id, kind = %error.kind(), error = %error, "Transport failed");
        self.inner.client.on_fail(self, error);
        self.close();
    }
}

// ============================================================================
// TransportHandle - Close
// ============================================================================

impl TransportHandle {
    /// Closes the transport.
    ///
    /// Idempotent and synchronous: in-flight operations are cancelled, the
    /// writability subscription is dropped, the stream is released, queued
    /// bytes are discarded without being flushed, and `on_close` fires
    /// exactly once before this returns. Later calls do nothing.
    pub fn close(&self) {
        let _guard = self.inner.dispatch.lock();
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let (stream, read_waker, dropped) = {
            let mut shared = self.inner.shared.lock();
            shared.state = State::Closing;
            let dropped = shared.writes.clear();
            (shared.stream.take(), shared.read_waker.take(), dropped)
        };

        if let Some(waker) = read_waker {
            waker.wake();
        }

        if dropped > 0 {
            debug!(transport = %self.inner.id, dropped, "Discarding unsent bytes");
        }

        if let Some(mut stream) = stream
            && let Err(e) = try_shutdown(&mut stream)
        {
            let error = Error::close(e);
            warn!(transport = %self.inner.id, error = %error, "Stream release failed");
            self.inner.client.on_fail(self, &error);
        }

        self.inner.shared.lock().state = State::Closed;
        debug!(transport = %self.inner.id, "Transport closed");
        self.inner.client.on_close(self);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    use crate::client::{ChannelClient, TransportEvent};
    use crate::error::ErrorKind;

    fn connecting(client: ChannelClient) -> TransportHandle {
        TransportHandle::new("tcp://h:1".into(), Arc::new(client), TransportConfig::new()).expect("runtime")
    }

    /// Stream whose release always fails. Reads never complete.
    struct StuckShutdown;

    impl AsyncRead for StuckShutdown {
        fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for StuckShutdown {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::ConnectionAborted.into()))
        }
    }

    #[test]
    fn test_handle_is_clone_send_sync() {
        fn assert_traits<T: Clone + Send + Sync + fmt::Debug>() {}
        assert_traits::<TransportHandle>();
    }

    #[test]
    fn test_new_requires_runtime() {
        let (client, _rx) = ChannelClient::new();
        let err = TransportHandle::new("tcp://h:1".into(), Arc::new(client), TransportConfig::new())
            .expect_err("no runtime");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_new_handle_is_connecting() {
        let (client, _rx) = ChannelClient::new();
        let handle = connecting(client);

        assert_eq!(handle.state(), State::Connecting);
        assert_eq!(handle.buffered_amount(), 0);
        assert!(!handle.is_awaiting_writability());
        assert_eq!(handle.target(), "tcp://h:1");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, mut rx) = ChannelClient::new();
        let handle = connecting(client);

        handle.close();
        handle.close();
        handle.close();

        assert_eq!(handle.state(), State::Closed);
        assert_eq!(rx.try_recv().map(|(_, e)| e), Ok(TransportEvent::Close));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_suppressed_after_close() {
        let (client, mut rx) = ChannelClient::new();
        let handle = connecting(client);
        handle.close();
        let _ = rx.try_recv();

        assert!(!handle.dispatch(|client, t| client.on_open(t)));
        handle.fail(&Error::connect("late"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_release_failure_fails_then_closes() {
        let (client, mut rx) = ChannelClient::new();
        let handle = TransportHandle::from_stream(StuckShutdown, Arc::new(client), TransportConfig::new())
            .expect("valid config");
        assert_eq!(rx.recv().await.map(|(_, e)| e), Some(TransportEvent::Open));

        handle.close();
        assert_eq!(handle.state(), State::Closed);

        let (_, event) = rx.try_recv().expect("fail");
        assert!(event.is_fail(ErrorKind::Close));
        assert_eq!(rx.try_recv().map(|(_, e)| e), Ok(TransportEvent::Close));

        handle.close();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
