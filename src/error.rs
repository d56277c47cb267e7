//! Error types for the socket stream transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Builder-time validation returns [`Result<T>`] which uses [`Error`].
//! Once a [`TransportHandle`](crate::TransportHandle) exists, failures are
//! delivered to the [`StreamClient`](crate::StreamClient) callbacks instead.
//!
//! ```ignore
//! use socket_stream::{Result, TransportHandle};
//!
//! fn open(client: Arc<MyClient>) -> Result<TransportHandle> {
//!     TransportHandle::builder("wss://example.com/socket").connect(client)
//! }
//! ```
//!
//! # Error Categories
//!
//! | Kind | Variants |
//! |------|----------|
//! | Connect | [`Error::InvalidAddress`], [`Error::Connect`], [`Error::ConnectTimeout`], [`Error::Upgrade`] |
//! | Certificate | [`Error::CertificateRejected`] |
//! | Read | [`Error::Read`] |
//! | Write | [`Error::Write`] |
//! | Close | [`Error::Close`] |
//! | Usage | [`Error::Config`], [`Error::NotOpen`], [`Error::BufferFull`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::State;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// ErrorKind
// ============================================================================

/// Coarse classification reported alongside every failure callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Resolution, TCP connect, TLS handshake or upgrade failed.
    Connect,
    /// The certificate policy rejected the peer certificate.
    Certificate,
    /// A read on the open stream failed.
    Read,
    /// A write on the open stream failed.
    Write,
    /// Releasing the stream during close failed.
    Close,
    /// The caller misused the transport or its configuration.
    Usage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Certificate => "certificate",
            Self::Read => "read",
            Self::Write => "write",
            Self::Close => "close",
            Self::Usage => "usage",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// The target address could not be parsed or uses an unsupported scheme.
    #[error("Invalid address: {message}")]
    InvalidAddress {
        /// Description of the problem.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection establishment failed.
    #[error("Connection failed: {message}")]
    Connect {
        /// Description of the connection error.
        message: String,
    },

    /// Connection establishment did not finish in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The certificate policy rejected the peer certificate.
    #[error("Certificate rejected for {origin}: {message}")]
    CertificateRejected {
        /// Origin the certificate was presented for.
        origin: String,
        /// Description of the rejection.
        message: String,
    },

    /// The WebSocket opening handshake failed.
    #[error("WebSocket upgrade failed: {message}")]
    Upgrade {
        /// Description of the handshake failure.
        message: String,
    },

    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// A read on the open stream failed.
    #[error("Read failed: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: IoError,
    },

    /// A write on the open stream failed.
    #[error("Write failed: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: IoError,
    },

    /// Releasing the stream during close failed.
    #[error("Close failed: {source}")]
    Close {
        /// Underlying I/O error.
        #[source]
        source: IoError,
    },

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Operation requires an open transport.
    #[error("Transport is not open (state: {state})")]
    NotOpen {
        /// State the transport was in.
        state: State,
    },

    /// Accepting the bytes would exceed the send buffer ceiling.
    #[error("Send buffer full: {buffered} bytes buffered, limit {limit}")]
    BufferFull {
        /// Bytes buffered at the time of the call.
        buffered: usize,
        /// Configured ceiling.
        limit: usize,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid address error.
    #[inline]
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::ConnectTimeout { timeout_ms }
    }

    /// Creates a certificate rejection error.
    #[inline]
    pub fn certificate_rejected(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CertificateRejected {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Creates a WebSocket upgrade error.
    #[inline]
    pub fn upgrade(message: impl Into<String>) -> Self {
        Self::Upgrade {
            message: message.into(),
        }
    }

    /// Creates a read error.
    #[inline]
    pub fn read(source: IoError) -> Self {
        Self::Read { source }
    }

    /// Creates a write error.
    #[inline]
    pub fn write(source: IoError) -> Self {
        Self::Write { source }
    }

    /// Creates a close error.
    #[inline]
    pub fn close(source: IoError) -> Self {
        Self::Close { source }
    }

    /// Classifies an I/O error raised while establishing a connection.
    ///
    /// TLS handshakes that failed because the peer certificate was refused
    /// surface as [`Error::CertificateRejected`]; everything else is a
    /// plain [`Error::Connect`].
    pub fn from_connect_io(err: IoError, origin: &str) -> Self {
        let rejected = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            .is_some_and(|tls| matches!(tls, rustls::Error::InvalidCertificate(_)));

        if rejected {
            Self::certificate_rejected(origin, err.to_string())
        } else {
            Self::connect(err.to_string())
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the coarse kind used by the client callback surface.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress { .. }
            | Self::Connect { .. }
            | Self::ConnectTimeout { .. }
            | Self::Upgrade { .. }
            | Self::Tls(_) => ErrorKind::Connect,
            Self::CertificateRejected { .. } => ErrorKind::Certificate,
            Self::Read { .. } => ErrorKind::Read,
            Self::Write { .. } => ErrorKind::Write,
            Self::Close { .. } => ErrorKind::Close,
            Self::Config { .. } | Self::NotOpen { .. } | Self::BufferFull { .. } | Self::Json(_) => {
                ErrorKind::Usage
            }
        }
    }

    /// Returns `true` if this error means the connection never opened.
    #[inline]
    #[must_use]
    pub fn is_connect_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connect | ErrorKind::Certificate)
    }

    /// Returns `true` if this is a certificate rejection.
    #[inline]
    #[must_use]
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, Self::CertificateRejected { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectTimeout { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind as IoErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connect("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");

        let err = Error::NotOpen {
            state: State::Closed,
        };
        assert_eq!(err.to_string(), "Transport is not open (state: closed)");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::connect_timeout(10).kind(), ErrorKind::Connect);
        assert_eq!(Error::upgrade("bad").kind(), ErrorKind::Connect);
        assert_eq!(
            Error::certificate_rejected("wss://a:443", "no").kind(),
            ErrorKind::Certificate
        );
        assert_eq!(
            Error::write(IoError::from(IoErrorKind::BrokenPipe)).kind(),
            ErrorKind::Write
        );
        assert_eq!(
            Error::read(IoError::from(IoErrorKind::ConnectionReset)).kind(),
            ErrorKind::Read
        );
        assert_eq!(
            Error::BufferFull {
                buffered: 1,
                limit: 1
            }
            .kind(),
            ErrorKind::Usage
        );
    }

    #[test]
    fn test_certificate_error_is_connect_error() {
        let err = Error::certificate_rejected("tls://host:1", "untrusted");
        assert!(err.is_connect_error());
        assert!(err.is_certificate_error());
        assert!(!Error::config("x").is_connect_error());
    }

    #[test]
    fn test_from_connect_io_classifies_certificate() {
        let tls = rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer);
        let io = IoError::new(IoErrorKind::InvalidData, tls);
        let err = Error::from_connect_io(io, "tls://localhost:443");
        assert!(err.is_certificate_error());

        let io = IoError::from(IoErrorKind::ConnectionRefused);
        let err = Error::from_connect_io(io, "tcp://localhost:1");
        assert!(matches!(err, Error::Connect { .. }));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::Certificate.to_string(), "certificate");
        assert_eq!(ErrorKind::Write.to_string(), "write");
    }
}
