//! Certificate policy decisions during real TLS handshakes.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{TlsFixture, collect_data, init_test_logging, next_event};
use parking_lot::Mutex;
use socket_stream::{
    CertificateErrors, CertificateFlaw, ChannelClient, ErrorKind, HostExceptionPolicy,
    PeerCertificate, State, StrictPolicy, TransportEvent, TransportHandle,
};

#[tokio::test]
async fn test_rejecting_policy_never_opens() {
    init_test_logging();
    let fixture = TlsFixture::localhost();
    let port = fixture.serve_echo().await;

    let seen: Arc<Mutex<Option<(CertificateErrors, String)>>> = Arc::default();
    let record = Arc::clone(&seen);
    let policy = move |_: &PeerCertificate, errors: &CertificateErrors, origin: &str| {
        *record.lock() = Some((*errors, origin.to_owned()));
        false
    };

    let (client, mut events) = ChannelClient::new();
    let handle = TransportHandle::create(
        &format!("tcp://localhost:{port}"),
        Arc::new(client),
        true,
        Arc::new(policy),
    )
    .expect("valid address");

    let event = next_event(&mut events).await;
    assert!(event.is_fail(ErrorKind::Certificate), "unexpected {event:?}");
    assert_eq!(handle.state(), State::Closed);

    let (errors, origin) = seen.lock().clone().expect("policy consulted");
    assert!(errors.contains(CertificateFlaw::UnknownIssuer));
    assert_eq!(origin, format!("tcp://localhost:{port}"));
}

#[tokio::test]
async fn test_strict_policy_rejects_self_signed() {
    init_test_logging();
    let fixture = TlsFixture::localhost();
    let port = fixture.serve_echo().await;

    let (client, mut events) = ChannelClient::new();
    let _handle = TransportHandle::create(
        &format!("tls://localhost:{port}"),
        Arc::new(client),
        false,
        Arc::new(StrictPolicy),
    )
    .expect("valid address");

    let event = next_event(&mut events).await;
    assert!(event.is_fail(ErrorKind::Certificate), "unexpected {event:?}");
}

#[tokio::test]
async fn test_accepting_policy_opens_and_echoes() {
    init_test_logging();
    let fixture = TlsFixture::localhost();
    let port = fixture.serve_echo().await;
    let expected = fixture.certificate.clone();

    let policy = move |certificate: &PeerCertificate, errors: &CertificateErrors, _: &str| {
        !errors.is_empty() && certificate.der() == &expected
    };

    let (client, mut events) = ChannelClient::new();
    let handle = TransportHandle::create(
        &format!("tls://localhost:{port}"),
        Arc::new(client),
        false,
        Arc::new(policy),
    )
    .expect("valid address");

    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    assert_eq!(collect_data(&mut events, 5).await, b"hello");

    handle.send(b"over tls").expect("send");
    assert_eq!(collect_data(&mut events, 8).await, b"over tls");

    handle.close();
    assert_eq!(next_event(&mut events).await, TransportEvent::Close);
}

#[tokio::test]
async fn test_host_exception_policy() {
    init_test_logging();
    let fixture = TlsFixture::localhost();
    let port = fixture.serve_echo().await;

    let policy = HostExceptionPolicy::new();
    policy.allow("localhost", fixture.certificate.clone());

    let (client, mut events) = ChannelClient::new();
    let handle = TransportHandle::create(
        &format!("tls://localhost:{port}"),
        Arc::new(client),
        false,
        Arc::new(policy),
    )
    .expect("valid address");

    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    handle.close();
}

#[tokio::test]
async fn test_allow_any_certificate_bypasses_policy() {
    init_test_logging();
    let fixture = TlsFixture::localhost();
    let port = fixture.serve_echo().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let policy = move |_: &PeerCertificate, _: &CertificateErrors, _: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        false
    };

    let (client, mut events) = ChannelClient::new();
    let handle = TransportHandle::builder(format!("tls://localhost:{port}"))
        .certificate_policy(Arc::new(policy))
        .allow_any_certificate(true)
        .connect(Arc::new(client))
        .expect("valid address");

    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    handle.close();
}
