//! Builder pattern for transport creation.
//!
//! Provides a fluent API for configuring and connecting a
//! [`TransportHandle`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use socket_stream::{ChannelClient, TransportConfig, TransportHandle};
//!
//! # async fn example() -> socket_stream::Result<()> {
//! let (client, mut events) = ChannelClient::new();
//! let transport = TransportHandle::builder("wss://example.com/socket")
//!     .config(TransportConfig::new().with_websocket_protocol("chat"))
//!     .connect(Arc::new(client))?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;

use crate::client::StreamClient;
use crate::connect::{Connector, Target};
use crate::error::Result;
use crate::tls::{CertificatePolicy, StrictPolicy, TlsSettings};

use super::core::TransportHandle;
use super::establish::{connect_request, default_connector};
use super::options::TransportConfig;

// ============================================================================
// TransportBuilder
// ============================================================================

/// Builder for configuring a [`TransportHandle`].
///
/// Use [`TransportHandle::builder()`] to create a new builder.
#[derive(Clone)]
pub struct TransportBuilder {
    /// Address to connect to.
    address: String,
    /// Tunables.
    config: TransportConfig,
    /// Certificate decision maker.
    policy: Arc<dyn CertificatePolicy>,
    /// Extra trusted roots.
    root_certificates: Vec<CertificateDer<'static>>,
    /// Whether the bundled webpki roots are trusted.
    webpki_roots: bool,
    /// I/O facility.
    connector: Arc<dyn Connector>,
}

// ============================================================================
// TransportBuilder Implementation
// ============================================================================

impl TransportBuilder {
    /// Creates a builder for `address` with default settings.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            config: TransportConfig::new(),
            policy: Arc::new(StrictPolicy),
            root_certificates: Vec::new(),
            webpki_roots: true,
            connector: default_connector(),
        }
    }

    /// Replaces the whole configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the policy consulted for peer certificates.
    #[inline]
    #[must_use]
    pub fn certificate_policy(mut self, policy: Arc<dyn CertificatePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Forces a TLS handshake regardless of scheme.
    #[inline]
    #[must_use]
    pub fn tls_required(mut self, required: bool) -> Self {
        self.config.tls_required = required;
        self
    }

    /// Accepts any peer certificate without consulting the policy.
    ///
    /// Debug and test override only.
    #[inline]
    #[must_use]
    pub fn allow_any_certificate(mut self, allow: bool) -> Self {
        self.config.allow_any_certificate = allow;
        self
    }

    /// Trusts an additional root certificate.
    #[inline]
    #[must_use]
    pub fn root_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.root_certificates.push(certificate);
        self
    }

    /// Controls whether the bundled webpki roots are trusted.
    #[inline]
    #[must_use]
    pub fn webpki_roots(mut self, enabled: bool) -> Self {
        self.webpki_roots = enabled;
        self
    }

    /// Replaces the I/O facility used to establish the stream.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Validates the settings and starts connecting.
    ///
    /// Returns a handle in [`State::Connecting`](super::State::Connecting);
    /// the outcome arrives through `client`. Must be called within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`](crate::Error::InvalidAddress) if the address cannot be parsed
    /// - [`Error::Config`](crate::Error::Config) if the configuration is
    ///   invalid or no tokio runtime is current
    pub fn connect(self, client: Arc<dyn StreamClient>) -> Result<TransportHandle> {
        self.config.validate()?;
        let target = Target::parse(&self.address)?;

        let tls = self.tls_settings();
        let request = connect_request(target, &self.config, tls);

        let handle = TransportHandle::new(self.address, client, self.config)?;
        handle.start_connect(self.connector, request);
        Ok(handle)
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl TransportBuilder {
    fn tls_settings(&self) -> TlsSettings {
        self.root_certificates.iter().cloned().fold(
            TlsSettings::new(Arc::clone(&self.policy))
                .with_allow_any_certificate(self.config.allow_any_certificate)
                .with_webpki_roots(self.webpki_roots),
            TlsSettings::with_root_certificate,
        )
    }
}

impl fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("root_certificates", &self.root_certificates.len())
            .field("webpki_roots", &self.webpki_roots)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
