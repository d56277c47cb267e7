//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use socket_stream::{TransportEvent, TransportId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_rustls::TlsAcceptor;
use tracing_subscriber::EnvFilter;

/// How long any single event may take to arrive.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

pub type Events = UnboundedReceiver<(TransportId, TransportEvent)>;

/// Installs a test-friendly subscriber once. `RUST_LOG` overrides the filter.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("socket_stream=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Waits for the next event.
pub async fn next_event(events: &mut Events) -> TransportEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("event within timeout")
        .map(|(_, event)| event)
        .expect("event channel open")
}

/// Collects `Data` events until `len` bytes arrived.
pub async fn collect_data(events: &mut Events, len: usize) -> Vec<u8> {
    let mut received = Vec::with_capacity(len);
    while received.len() < len {
        match next_event(events).await {
            TransportEvent::Data(chunk) => received.extend(chunk),
            other => panic!("expected data, got {other:?}"),
        }
    }
    received
}

/// Starts a TCP echo server for one connection.
pub async fn echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let (mut reader, mut writer) = socket.split();
        let _ = tokio::io::copy(&mut reader, &mut writer).await;
    });

    port
}

// ============================================================================
// TLS
// ============================================================================

/// Self-signed certificate for `localhost` and a server config presenting it.
pub struct TlsFixture {
    pub certificate: CertificateDer<'static>,
    pub acceptor: TlsAcceptor,
}

impl TlsFixture {
    pub fn localhost() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).expect("certificate");
        let certificate = certified.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

        let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![certificate.clone()], key)
            .expect("server config");

        Self {
            certificate,
            acceptor: TlsAcceptor::from(Arc::new(config)),
        }
    }

    /// Serves one TLS connection that greets, then echoes. Returns the port.
    pub async fn serve_echo(&self) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let acceptor = self.acceptor.clone();

        tokio::spawn(async move {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            // A rejected client aborts the handshake; nothing to serve then.
            let Ok(mut tls) = acceptor.accept(socket).await else {
                return;
            };
            if tls.write_all(b"hello").await.is_err() {
                return;
            }
            let mut buf = [0u8; 1024];
            while let Ok(n) = tls.read(&mut buf).await {
                if n == 0 || tls.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        });

        port
    }
}
