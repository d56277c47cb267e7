//! Socket Stream - Async, cancellable, backpressure-aware byte-stream transport.
//!
//! This library connects to a remote endpoint over TCP (optionally TLS,
//! optionally behind a WebSocket upgrade) and exposes the connection as a
//! callback-driven, bidirectional byte stream.
//!
//! # Architecture
//!
//! A [`TransportHandle`] moves through `Connecting → Open → Closing → Closed`:
//!
//! - **Establishment**: a [`Connector`] produces the stream; a
//!   [`CertificatePolicy`] decides on the peer certificate during TLS
//! - **Read loop**: one read at a time, delivered to [`StreamClient::on_data`] in order
//! - **Backpressure**: [`TransportHandle::send`] writes what the stream takes
//!   now and queues the rest until the stream is writable again
//! - **Close**: idempotent and synchronous; unsent bytes are dropped
//!
//! Key design principles:
//!
//! - Every in-flight operation holds a clone of the handle
//! - Cancellation suppresses callbacks; it never aborts the I/O underneath
//! - `on_close` is the last callback a transport delivers
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use socket_stream::{ChannelClient, StrictPolicy, TransportEvent, TransportHandle, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (client, mut events) = ChannelClient::new();
//!     let transport = TransportHandle::create(
//!         "tls://example.com:443",
//!         Arc::new(client),
//!         true,
//!         Arc::new(StrictPolicy),
//!     )?;
//!
//!     while let Some((_, event)) = events.recv().await {
//!         match event {
//!             TransportEvent::Open => {
//!                 transport.send(b"hello")?;
//!             }
//!             TransportEvent::Data(bytes) => {
//!                 println!("received {} bytes", bytes.len());
//!                 transport.close();
//!             }
//!             TransportEvent::Close => break,
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`StreamClient`] callbacks and [`ChannelClient`] |
//! | [`connect`] | Address parsing and the [`Connector`] seam |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`tls`] | Certificate policies and TLS settings |
//! | [`transport`] | [`TransportHandle`] and its configuration |

// ============================================================================
// Modules
// ============================================================================

/// Client callback surface.
pub mod client;

/// Connection establishment.
///
/// Address parsing, the [`Connector`] seam and its network implementation.
pub mod connect;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// TLS certificate policy and client configuration.
pub mod tls;

/// Transport handle and lifecycle.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ChannelClient, StreamClient, TransportEvent};

// Connect types
pub use connect::{BoxedStream, ConnectRequest, Connector, IoStream, NetConnector, Scheme, Target};

// Error types
pub use error::{Error, ErrorKind, Result};

// Identifier types
pub use identifiers::TransportId;

// TLS types
pub use tls::{
    CertificateErrors, CertificateFlaw, CertificatePolicy, HostExceptionPolicy, PeerCertificate,
    StrictPolicy, TlsSettings,
};

// Transport types
pub use transport::{State, TransportBuilder, TransportConfig, TransportHandle};
