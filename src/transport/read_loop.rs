//! Sequential read loop.
//!
//! One read is outstanding at a time. Each completed read is delivered to
//! the client before the next one is issued, so `on_data` sees the stream
//! in order. The loop ends on EOF (which closes the transport), on a read
//! error (reported, transport left open) or on cancellation (silent). A
//! stream that answers `WouldBlock` is re-polled after a short back-off.

// ============================================================================
// Imports
// ============================================================================

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, trace, warn};

use crate::error::Error;

use super::core::TransportHandle;
use super::write_buffer::NOT_READY_BACKOFF;

// ============================================================================
// ReadOutcome
// ============================================================================

/// Result of one read.
#[derive(Debug)]
enum ReadOutcome {
    /// `n > 0` bytes landed at the start of the buffer.
    Data(usize),
    /// Peer shut down its sending side.
    Eof,
    /// The stream answered `WouldBlock` without registering a waker.
    NotReady,
    /// The read failed.
    Failed(io::Error),
    /// The transport was closed while reading.
    Cancelled,
}

// ============================================================================
// Read Loop
// ============================================================================

/// Reads until EOF, error or cancellation.
pub(crate) async fn run(handle: TransportHandle) {
    let mut buf = vec![0u8; handle.config().read_buffer_size];

    loop {
        let outcome = poll_fn(|cx| poll_read(&handle, cx, &mut buf)).await;

        match outcome {
            ReadOutcome::Data(n) => {
                trace!(transport = %handle.id(), bytes = n, "Data received");
                let delivered = handle.dispatch(|client, transport| client.on_data(transport, &buf[..n]));
                if !delivered {
                    break;
                }
            }
            ReadOutcome::Eof => {
                debug!(transport = %handle.id(), "Stream ended by peer");
                handle.close();
                break;
            }
            ReadOutcome::NotReady => {
                trace!(transport = %handle.id(), "Stream not ready, backing off");
                tokio::time::sleep(NOT_READY_BACKOFF).await;
            }
            ReadOutcome::Failed(e) => {
                let error = Error::read(e);
                warn!(transport = %handle.id(), error = %error, "Read failed, reading stopped");
                handle.dispatch(|client, transport| client.on_receive_error(transport, &error));
                break;
            }
            ReadOutcome::Cancelled => break,
        }
    }

    trace!(transport = %handle.id(), "Read loop terminated");
}

/// Polls one read on the shared stream.
///
/// The waker is parked in the shared state so `close` can wake the loop
/// after taking the stream away.
fn poll_read(handle: &TransportHandle, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<ReadOutcome> {
    let mut shared = handle.inner.shared.lock();

    if handle.is_cancelled() {
        return Poll::Ready(ReadOutcome::Cancelled);
    }
    let Some(stream) = shared.stream.as_mut() else {
        return Poll::Ready(ReadOutcome::Cancelled);
    };

    let mut read_buf = ReadBuf::new(buf);
    match Pin::new(stream).poll_read(cx, &mut read_buf) {
        Poll::Ready(Ok(())) => {
            shared.read_waker = None;
            match read_buf.filled().len() {
                0 => Poll::Ready(ReadOutcome::Eof),
                n => Poll::Ready(ReadOutcome::Data(n)),
            }
        }
        Poll::Ready(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => {
            shared.read_waker = None;
            Poll::Ready(ReadOutcome::NotReady)
        }
        Poll::Ready(Err(e)) => {
            shared.read_waker = None;
            Poll::Ready(ReadOutcome::Failed(e))
        }
        Poll::Pending => {
            shared.read_waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
