//! Connection establishment over the network.
//!
//! [`Connector`] is the I/O facility seam: it turns a [`ConnectRequest`]
//! into an open duplex byte stream. [`NetConnector`] is the production
//! implementation (TCP, optional TLS, optional WebSocket upgrade); tests
//! substitute in-memory connectors.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::tls::TlsSettings;

use super::target::Target;
use super::upgrade::websocket_handshake;

// ============================================================================
// Stream Types
// ============================================================================

/// An open, non-blocking duplex byte stream.
///
/// A stream that is not ready should return `Poll::Pending` with the waker
/// registered. Streams that return `Err(WouldBlock)` instead are re-polled
/// after a short back-off.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> IoStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased [`IoStream`] owned by a transport.
pub type BoxedStream = Box<dyn IoStream>;

// ============================================================================
// ConnectRequest
// ============================================================================

/// Parameters of one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    target: Target,
    tls: Option<TlsSettings>,
    websocket_protocols: Vec<String>,
}

impl ConnectRequest {
    /// Creates a request for `target`.
    ///
    /// `tls` is `Some` when a TLS handshake must run.
    #[must_use]
    pub fn new(target: Target, tls: Option<TlsSettings>, websocket_protocols: Vec<String>) -> Self {
        Self {
            target,
            tls,
            websocket_protocols,
        }
    }

    /// Where to connect.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// TLS settings, if a handshake is required.
    #[inline]
    #[must_use]
    pub fn tls(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }

    /// Subprotocols offered during a WebSocket upgrade.
    #[inline]
    #[must_use]
    pub fn websocket_protocols(&self) -> &[String] {
        &self.websocket_protocols
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Establishes duplex streams.
///
/// Implementations must not block the calling thread. The returned future
/// is always driven to completion, even when the transport that asked for
/// it has been closed in the meantime.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects according to `request`.
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`] if the connection cannot be made
    /// - [`Error::CertificateRejected`] if the certificate policy refused the peer
    /// - [`Error::Upgrade`] if the WebSocket handshake fails
    async fn connect(&self, request: &ConnectRequest) -> Result<BoxedStream>;
}

// ============================================================================
// NetConnector
// ============================================================================

/// Connects over TCP, then optionally TLS and a WebSocket upgrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetConnector;

#[async_trait]
impl Connector for NetConnector {
    async fn connect(&self, request: &ConnectRequest) -> Result<BoxedStream> {
        let target = request.target();

        let tcp = TcpStream::connect((target.host(), target.port()))
            .await
            .map_err(|e| Error::connect(format!("{}: {e}", target.origin())))?;
        tcp.set_nodelay(true)
            .map_err(|e| Error::connect(format!("{}: {e}", target.origin())))?;

        trace!(address = %target, "TCP connected");

        let mut stream: BoxedStream = match request.tls() {
            Some(settings) => Box::new(handshake_tls(tcp, target, settings).await?),
            None => Box::new(tcp),
        };

        if target.is_websocket() {
            websocket_handshake(&mut stream, target, request.websocket_protocols()).await?;
        }

        debug!(address = %target, tls = request.tls().is_some(), "Stream established");
        Ok(stream)
    }
}

async fn handshake_tls(
    tcp: TcpStream,
    target: &Target,
    settings: &TlsSettings,
) -> Result<TlsStream<TcpStream>> {
    let origin = target.origin();
    let config = settings.client_config(&origin)?;

    let server_name = ServerName::try_from(target.host().to_owned())
        .map_err(|e| Error::invalid_address(format!("{}: {e}", target.host())))?;

    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::from_connect_io(e, &origin))?;

    trace!(origin = %origin, "TLS handshake completed");
    Ok(stream)
}

// ============================================================================
// Tests
// ============================================================================
