//! Client callback surface.
//!
//! A [`StreamClient`] receives everything a transport reports. Callbacks for
//! one transport never run concurrently with each other, and a client may
//! call [`TransportHandle::send`] or [`TransportHandle::close`] from inside
//! any callback.
//!
//! # Callback Order
//!
//! ```text
//! on_open ─► on_data* ─► on_receive_error? ─► … ─► on_close
//!    │                                              ▲
//!    └──── on_fail (write/close error) ─────────────┘
//!
//! connect failure: on_fail  (terminal, no on_close)
//! ```
//!
//! `on_close` is always the last callback a transport delivers.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;

use crate::error::{Error, ErrorKind};
use crate::identifiers::TransportId;
use crate::transport::TransportHandle;

// ============================================================================
// StreamClient
// ============================================================================

/// Receives transport lifecycle and data callbacks.
///
/// All methods default to doing nothing.
pub trait StreamClient: Send + Sync + 'static {
    /// The stream is connected and ready for [`TransportHandle::send`].
    fn on_open(&self, transport: &TransportHandle) {
        let _ = transport;
    }

    /// Bytes arrived, in stream order.
    fn on_data(&self, transport: &TransportHandle, data: &[u8]) {
        let _ = (transport, data);
    }

    /// A read failed. Reading stops; the transport stays open.
    fn on_receive_error(&self, transport: &TransportHandle, error: &Error) {
        let _ = (transport, error);
    }

    /// Connecting, writing or releasing the stream failed.
    fn on_fail(&self, transport: &TransportHandle, error: &Error) {
        let _ = (transport, error);
    }

    /// The transport is closed. No further callbacks follow.
    fn on_close(&self, transport: &TransportHandle) {
        let _ = transport;
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Owned form of a [`StreamClient`] callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// See [`StreamClient::on_open`].
    Open,
    /// See [`StreamClient::on_data`].
    Data(Vec<u8>),
    /// See [`StreamClient::on_receive_error`].
    ReceiveError {
        /// Error kind.
        kind: ErrorKind,
        /// Rendered error.
        message: String,
    },
    /// See [`StreamClient::on_fail`].
    Fail {
        /// Error kind.
        kind: ErrorKind,
        /// Rendered error.
        message: String,
    },
    /// See [`StreamClient::on_close`].
    Close,
}

impl TransportEvent {
    /// Returns `true` for [`TransportEvent::Fail`] of the given kind.
    #[must_use]
    pub fn is_fail(&self, expected: ErrorKind) -> bool {
        matches!(self, Self::Fail { kind, .. } if *kind == expected)
    }
}

// ============================================================================
// ChannelClient
// ============================================================================

/// Forwards callbacks into an unbounded channel.
///
/// Each event is tagged with the [`TransportId`] it came from, so one
/// receiver can serve several transports.
///
/// # Example
///
/// ```ignore
/// let (client, mut events) = ChannelClient::new();
/// let transport = TransportHandle::builder("tcp://127.0.0.1:7000").connect(Arc::new(client))?;
///
/// while let Some((_, event)) = events.recv().await {
///     if event == TransportEvent::Close {
///         break;
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelClient {
    tx: mpsc::UnboundedSender<(TransportId, TransportEvent)>,
}

impl ChannelClient {
    /// Creates a client and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(TransportId, TransportEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, transport: &TransportHandle, event: TransportEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.tx.send((transport.id(), event));
    }
}

impl StreamClient for ChannelClient {
    fn on_open(&self, transport: &TransportHandle) {
        self.forward(transport, TransportEvent::Open);
    }

    fn on_data(&self, transport: &TransportHandle, data: &[u8]) {
        self.forward(transport, TransportEvent::Data(data.to_vec()));
    }

    fn on_receive_error(&self, transport: &TransportHandle, error: &Error) {
        self.forward(
            transport,
            TransportEvent::ReceiveError {
                kind: error.kind(),
                message: error.to_string(),
            },
        );
    }

    fn on_fail(&self, transport: &TransportHandle, error: &Error) {
        self.forward(
            transport,
            TransportEvent::Fail {
                kind: error.kind(),
                message: error.to_string(),
            },
        );
    }

    fn on_close(&self, transport: &TransportHandle) {
        self.forward(transport, TransportEvent::Close);
    }
}

// ============================================================================
// Tests
// ============================================================================
