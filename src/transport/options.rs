//! Transport configuration.
//!
//! # Example
//!
//! ```ignore
//! use socket_stream::TransportConfig;
//!
//! let config = TransportConfig::new()
//!     .with_read_buffer_size(4096)
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_websocket_protocol("chat");
//!
//! // Or from JSON, missing fields take their defaults:
//! let config = TransportConfig::from_json(r#"{ "read_buffer_size": 4096 }"#)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Size of each read issued by the read loop.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Ceiling on bytes queued for sending.
pub const DEFAULT_MAX_BUFFERED_AMOUNT: usize = 100 * 1024 * 1024;

/// Time allowed for connect, TLS and upgrade together (30s).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// TransportConfig
// ============================================================================

/// Tunables of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bytes requested by each read.
    pub read_buffer_size: usize,

    /// Maximum bytes queued by [`send`](super::TransportHandle::send).
    pub max_buffered_amount: usize,

    /// Establishment deadline in milliseconds, `None` to wait forever.
    pub connect_timeout_ms: Option<u64>,

    /// Force a TLS handshake even when the scheme does not imply one.
    pub tls_required: bool,

    /// Bypass the certificate policy and accept any peer certificate.
    ///
    /// Debug and test override only.
    pub allow_any_certificate: bool,

    /// Subprotocols offered during a WebSocket upgrade.
    pub websocket_protocols: Vec<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_buffered_amount: DEFAULT_MAX_BUFFERED_AMOUNT,
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
            tls_required: false,
            allow_any_certificate: false,
            websocket_protocols: Vec::new(),
        }
    }

    /// Parses a configuration from JSON. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the document is malformed
    /// - [`Error::Config`] if a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportConfig {
    /// Sets the read size.
    #[inline]
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the send buffer ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_buffered_amount(mut self, limit: usize) -> Self {
        self.max_buffered_amount = limit;
        self
    }

    /// Sets the establishment deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Removes the establishment deadline.
    #[inline]
    #[must_use]
    pub fn without_connect_timeout(mut self) -> Self {
        self.connect_timeout_ms = None;
        self
    }

    /// Forces a TLS handshake.
    #[inline]
    #[must_use]
    pub fn with_tls_required(mut self, required: bool) -> Self {
        self.tls_required = required;
        self
    }

    /// Disables certificate checks. Debug and test use only.
    #[inline]
    #[must_use]
    pub fn with_allow_any_certificate(mut self, allow: bool) -> Self {
        self.allow_any_certificate = allow;
        self
    }

    /// Adds a WebSocket subprotocol to offer.
    #[inline]
    #[must_use]
    pub fn with_websocket_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.websocket_protocols.push(protocol.into());
        self
    }
}

// ============================================================================
// Accessors & Validation
// ============================================================================

impl TransportConfig {
    /// Establishment deadline as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(Error::config("read_buffer_size must be greater than zero"));
        }
        if self.max_buffered_amount == 0 {
            return Err(Error::config(
                "max_buffered_amount must be greater than zero",
            ));
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(Error::config("connect_timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
