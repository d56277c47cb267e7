//! Outbound path: immediate writes, buffering and readiness-driven drain.

// ============================================================================
// Imports
// ============================================================================

use std::future::poll_fn;
use std::io;
use std::task::Poll;

use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::core::{Shared, TransportHandle};
use super::state::State;
use super::write_buffer::{NOT_READY_BACKOFF, try_flush, try_write};

// ============================================================================
// TransportHandle - Send
// ============================================================================

impl TransportHandle {
    /// Sends bytes.
    ///
    /// Writes immediately when nothing is queued; whatever the stream does
    /// not take right now is queued behind earlier bytes and written once
    /// the stream becomes writable. Returns the number of bytes accepted,
    /// which is always all of them.
    ///
    /// May be called from any thread, inside or outside the runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::NotOpen`] if the transport is not open
    /// - [`Error::BufferFull`] if queuing would exceed the configured ceiling
    /// - [`Error::Write`] on a hard write error; `on_fail` and `on_close`
    ///   have been delivered by the time this returns
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        let mut shared = self.inner.shared.lock();

        if shared.state != State::Open {
            return Err(Error::NotOpen { state: shared.state });
        }
        if data.is_empty() {
            return Ok(0);
        }

        let buffered = shared.writes.len();
        let limit = self.inner.config.max_buffered_amount;
        if buffered.saturating_add(data.len()) > limit {
            debug!(transport = %self.inner.id, buffered, limit, len = data.len(), "Send refused, buffer full");
            return Err(Error::BufferFull { buffered, limit });
        }

        // Never overtake bytes that are already waiting.
        if !shared.writes.is_empty() || shared.writes.is_awaiting_writability() {
            shared.writes.enqueue(data);
            trace!(transport = %self.inner.id, queued = data.len(), buffered = shared.writes.len(), "Send queued");
            return Ok(data.len());
        }

        match self.write_now(&mut shared, data) {
            Ok(()) => Ok(data.len()),
            Err(e) => {
                drop(shared);
                let error = Error::write(e);
                self.fail(&error);
                Err(error)
            }
        }
    }

    /// Attempts an immediate write, queuing any remainder.
    fn write_now(&self, shared: &mut Shared, data: &[u8]) -> io::Result<()> {
        let Shared { stream, writes, .. } = shared;
        let Some(stream) = stream.as_mut() else {
            return Ok(());
        };

        let written = match try_write(stream, data) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => return Err(e),
        };

        if written < data.len() {
            writes.enqueue(&data[written..]);
            trace!(transport = %self.inner.id, written, queued = data.len() - written, "Partial write");
        } else if try_flush(stream)? {
            trace!(transport = %self.inner.id, written, "Write complete");
            return Ok(());
        }

        writes.begin_waiting(|| self.spawn_drain());
        Ok(())
    }

    /// Spawns the task that waits for writability and drains the queue.
    fn spawn_drain(&self) -> tokio::task::AbortHandle {
        let handle = self.clone();
        trace!(transport = %self.inner.id, "Awaiting writability");
        self.spawn(async move { handle.drain().await }).abort_handle()
    }

    async fn drain(self) {
        let result = loop {
            let attempt = poll_fn(|cx| {
                let mut shared = self.inner.shared.lock();
                if self.is_cancelled() {
                    return Poll::Ready(Ok(()));
                }

                let Shared { stream, writes, .. } = &mut *shared;
                let Some(stream) = stream.as_mut() else {
                    return Poll::Ready(Ok(()));
                };

                match writes.poll_drain(cx, stream) {
                    Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => Poll::Ready(Err(e)),
                    Poll::Ready(result) => {
                        writes.release_subscription();
                        Poll::Ready(result)
                    }
                    Poll::Pending => Poll::Pending,
                }
            })
            .await;

            match attempt {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!(transport = %self.inner.id, "Stream not ready, backing off");
                    tokio::time::sleep(NOT_READY_BACKOFF).await;
                }
                other => break other,
            }
        };

        match result {
            Ok(()) => trace!(transport = %self.inner.id, "Send buffer drained"),
            Err(e) => self.fail(&Error::write(e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Waker};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

    use super::*;

    use crate::client::{ChannelClient, TransportEvent};
    use crate::error::ErrorKind;
    use crate::identifiers::TransportId;
    use crate::transport::TransportConfig;

    type Events = tokio::sync::mpsc::UnboundedReceiver<(TransportId, TransportEvent)>;

    #[derive(Default)]
    struct Script {
        budget: usize,
        broken: bool,
        written: Vec<u8>,
        waker: Option<Waker>,
    }

    /// Stream whose writability is driven by the test. Reads never complete.
    #[derive(Clone, Default)]
    struct Valve(Arc<Mutex<Script>>);

    impl Valve {
        fn open(&self, bytes: usize) {
            let mut script = self.0.lock();
            script.budget += bytes;
            if let Some(waker) = script.waker.take() {
                waker.wake();
            }
        }

        fn break_pipe(&self) {
            let mut script = self.0.lock();
            script.broken = true;
            if let Some(waker) = script.waker.take() {
                waker.wake();
            }
        }

        fn written(&self) -> Vec<u8> {
            self.0.lock().written.clone()
        }
    }

    impl AsyncRead for Valve {
        fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for Valve {
        fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            let mut script = self.0.lock();
            if script.broken {
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            if script.budget == 0 {
                script.waker = Some(cx.waker().clone());
                return Poll::Pending;
            }
            let n = buf.len().min(script.budget);
            script.budget -= n;
            script.written.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn open_with<S: crate::IoStream>(stream: S, config: TransportConfig) -> (TransportHandle, Events) {
        let (client, mut rx) = ChannelClient::new();
        let handle = TransportHandle::from_stream(stream, Arc::new(client), config).expect("valid config");
        assert_eq!(rx.recv().await.map(|(_, e)| e), Some(TransportEvent::Open));
        (handle, rx)
    }

    async fn wait_drained(handle: &TransportHandle) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.buffered_amount() > 0 || handle.is_awaiting_writability() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("drained in time");
    }

    #[tokio::test]
    async fn test_partial_write_buffers_remainder() {
        let valve = Valve::default();
        valve.open(600);
        let (handle, _rx) = open_with(valve.clone(), TransportConfig::new()).await;

        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(handle.send(&data).expect("send"), 1000);
        assert_eq!(handle.buffered_amount(), 400);
        assert!(handle.is_awaiting_writability());

        valve.open(150);
        tokio::task::yield_now().await;
        valve.open(250);
        wait_drained(&handle).await;

        assert_eq!(handle.buffered_amount(), 0);
        assert!(!handle.is_awaiting_writability());
        assert_eq!(valve.written(), data);
        handle.close();
    }

    #[tokio::test]
    async fn test_later_sends_never_overtake_queued_bytes() {
        let valve = Valve::default();
        valve.open(3);
        let (handle, _rx) = open_with(valve.clone(), TransportConfig::new()).await;

        handle.send(b"abcdef").expect("send");
        handle.send(b"ghi").expect("send");
        handle.send(b"jkl").expect("send");
        assert_eq!(handle.buffered_amount(), 9);

        valve.open(usize::MAX / 2);
        wait_drained(&handle).await;
        assert_eq!(valve.written(), b"abcdefghijkl");
        handle.close();
    }

    #[tokio::test]
    async fn test_would_block_queues_everything() {
        let valve = Valve::default();
        let (handle, _rx) = open_with(valve.clone(), TransportConfig::new()).await;

        assert_eq!(handle.send(b"blocked").expect("send"), 7);
        assert_eq!(handle.buffered_amount(), 7);
        assert!(handle.is_awaiting_writability());
        handle.close();
    }

    #[tokio::test]
    async fn test_hard_write_error_fails_then_closes() {
        let valve = Valve::default();
        valve.break_pipe();
        let (handle, mut rx) = open_with(valve, TransportConfig::new()).await;

        let err = handle.send(b"x").expect_err("broken pipe");
        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(handle.state(), State::Closed);

        let (_, event) = rx.recv().await.expect("fail");
        assert!(event.is_fail(ErrorKind::Write));
        assert_eq!(rx.recv().await.map(|(_, e)| e), Some(TransportEvent::Close));
    }

    #[tokio::test]
    async fn test_drain_error_fails_then_closes() {
        let valve = Valve::default();
        valve.open(2);
        let (handle, mut rx) = open_with(valve.clone(), TransportConfig::new()).await;

        handle.send(b"abcd").expect("send");
        assert_eq!(handle.buffered_amount(), 2);

        valve.break_pipe();
        let (_, event) = rx.recv().await.expect("fail");
        assert!(event.is_fail(ErrorKind::Write));
        assert_eq!(rx.recv().await.map(|(_, e)| e), Some(TransportEvent::Close));
        assert_eq!(handle.state(), State::Closed);
        assert_eq!(handle.buffered_amount(), 0);
    }

    #[tokio::test]
    async fn test_close_drops_unsent_bytes() {
        let (local, mut peer) = tokio::io::duplex(4);
        let (handle, mut rx) = open_with(local, TransportConfig::new()).await;

        handle.send(b"0123456789").expect("send");
        assert_eq!(handle.buffered_amount(), 6);

        handle.close();
        assert_eq!(handle.buffered_amount(), 0);
        assert!(!handle.is_awaiting_writability());
        assert_eq!(rx.recv().await.map(|(_, e)| e), Some(TransportEvent::Close));

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.expect("eof");
        assert_eq!(received, b"0123");
    }

    /// Writer that never registers a waker and always answers `WouldBlock`.
    #[derive(Clone, Default)]
    struct NeverReady(Arc<AtomicUsize>);

    impl AsyncRead for NeverReady {
        fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for NeverReady {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Poll::Ready(Err(io::ErrorKind::WouldBlock.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_would_block_stream_is_not_busy_polled() {
        let stream = NeverReady::default();
        let (handle, _rx) = open_with(stream.clone(), TransportConfig::new()).await;

        handle.send(b"x").expect("send");
        tokio::time::sleep(Duration::from_millis(100)).await;

        // One immediate attempt plus roughly one per back-off period.
        let polls = stream.0.load(Ordering::SeqCst);
        assert!(polls <= 50, "polled {polls} times");
        assert_eq!(handle.buffered_amount(), 1);
        assert!(handle.is_awaiting_writability());
        handle.close();
    }

    #[tokio::test]
    async fn test_send_from_plain_thread_drains() {
        let (local, mut peer) = tokio::io::duplex(4);
        let (handle, _rx) = open_with(local, TransportConfig::new()).await;

        let sender = handle.clone();
        let accepted = std::thread::spawn(move || sender.send(b"0123456789"))
            .join()
            .expect("send does not panic")
            .expect("send");
        assert_eq!(accepted, 10);
        assert!(handle.is_awaiting_writability());

        let mut received = [0u8; 10];
        tokio::time::timeout(Duration::from_secs(5), peer.read_exact(&mut received))
            .await
            .expect("drained in time")
            .expect("read");
        assert_eq!(&received, b"0123456789");

        wait_drained(&handle).await;
        handle.close();
    }

    #[tokio::test]
    async fn test_buffer_ceiling() {
        let valve = Valve::default();
        valve.open(4);
        let config = TransportConfig::new().with_max_buffered_amount(8);
        let (handle, _rx) = open_with(valve, config).await;

        let err = handle.send(&[0u8; 9]).expect_err("over ceiling");
        assert!(matches!(err, Error::BufferFull { buffered: 0, limit: 8 }));

        handle.send(&[1u8; 6]).expect("send");
        assert_eq!(handle.buffered_amount(), 2);

        let err = handle.send(&[2u8; 7]).expect_err("over ceiling");
        assert!(matches!(err, Error::BufferFull { buffered: 2, limit: 8 }));
        assert_eq!(handle.buffered_amount(), 2);
        handle.close();
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let (local, _peer) = tokio::io::duplex(64);
        let (handle, _rx) = open_with(local, TransportConfig::new()).await;

        assert_eq!(handle.send(b"").expect("empty send"), 0);

        handle.close();
        let err = handle.send(b"late").expect_err("closed");
        assert!(matches!(err, Error::NotOpen { state: State::Closed }));
    }
}
