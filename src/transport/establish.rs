//! Connection establishment and the transition to `Open`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::client::StreamClient;
use crate::connect::{BoxedStream, ConnectRequest, Connector, IoStream, NetConnector, Target};
use crate::error::{Error, Result};
use crate::tls::{CertificatePolicy, TlsSettings};

use super::builder::TransportBuilder;
use super::core::TransportHandle;
use super::options::TransportConfig;
use super::read_loop;
use super::state::State;
use super::write_buffer::try_shutdown;

// ============================================================================
// TransportHandle - Creation
// ============================================================================

impl TransportHandle {
    /// Returns a builder for a transport to `address`.
    #[inline]
    #[must_use]
    pub fn builder(address: impl Into<String>) -> TransportBuilder {
        TransportBuilder::new(address)
    }

    /// Starts connecting to `address` and returns immediately.
    ///
    /// The handle starts in [`State::Connecting`]. `client` later receives
    /// `on_open` or `on_fail`. When `tls_required` is set, or the scheme is
    /// `wss`/`tls`, a TLS handshake runs and `policy` decides whether the
    /// peer certificate is acceptable.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `address` cannot be parsed.
    pub fn create(
        address: &str,
        client: Arc<dyn StreamClient>,
        tls_required: bool,
        policy: Arc<dyn CertificatePolicy>,
    ) -> Result<Self> {
        Self::builder(address)
            .tls_required(tls_required)
            .certificate_policy(policy)
            .connect(client)
    }

    /// Wraps an already-established stream.
    ///
    /// The handle is `Open` on return and `on_open` has been delivered.
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid or no runtime is
    /// current.
    pub fn from_stream<S>(stream: S, client: Arc<dyn StreamClient>, config: TransportConfig) -> Result<Self>
    where
        S: IoStream,
    {
        config.validate()?;

        let handle = Self::new("stream".to_owned(), client, config)?;
        handle.finish_connect(Ok(Box::new(stream)));
        Ok(handle)
    }

    /// Spawns the establishment task.
    pub(crate) fn start_connect(&self, connector: Arc<dyn Connector>, request: ConnectRequest) {
        let handle = self.clone();

        self.spawn(async move {
            let outcome = establish(&*connector, &request, handle.config()).await;
            handle.finish_connect(outcome);
        });
    }

    /// Applies the outcome of establishment.
    pub(crate) fn finish_connect(&self, outcome: Result<BoxedStream>) {
        let _guard = self.inner.dispatch.lock();

        if self.is_cancelled() {
            // Closed while connecting; release what we got without a word.
            if let Ok(mut stream) = outcome {
                let _ = try_shutdown(&mut stream);
                debug!(transport = %self.inner.id, "Discarded stream of cancelled connect");
            }
            return;
        }

        match outcome {
            Ok(stream) => {
                {
                    let mut shared = self.inner.shared.lock();
                    shared.stream = Some(stream);
                    shared.state = State::Open;
                }
                debug!(transport = %self.inner.id, "Transport open");

                let reader = self.clone();
                self.spawn(async move { read_loop::run(reader).await });

                self.inner.client.on_open(self);
            }
            Err(error) => {
                self.inner.cancelled.store(true, Ordering::Release);
                self.inner.shared.lock().state = State::Closed;

                warn!(transport = %self.inner.id, kind = %error.kind(), error = %error, "Connect failed");
                self.inner.client.on_fail(self, &error);
            }
        }
    }
}

// ============================================================================
// Establishment
// ============================================================================

/// Runs the connector under the configured deadline.
async fn establish(
    connector: &dyn Connector,
    request: &ConnectRequest,
    config: &TransportConfig,
) -> Result<BoxedStream> {
    match config.connect_timeout() {
        Some(timeout) => tokio::time::timeout(timeout, connector.connect(request))
            .await
            .map_err(|_| Error::connect_timeout(config.connect_timeout_ms.unwrap_or_default()))?,
        None => connector.connect(request).await,
    }
}

/// Builds the request for `target`. TLS runs when the scheme is secure or
/// `tls_required` is set.
pub(crate) fn connect_request(target: Target, config: &TransportConfig, tls: TlsSettings) -> ConnectRequest {
    let tls = (target.is_secure() || config.tls_required).then_some(tls);
    ConnectRequest::new(target, tls, config.websocket_protocols.clone())
}

/// Default connector for [`TransportHandle::create`].
pub(crate) fn default_connector() -> Arc<dyn Connector> {
    Arc::new(NetConnector)
}

// ============================================================================
// Tests
// ============================================================================
