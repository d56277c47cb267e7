//! Bridges rustls server certificate verification to a [`CertificatePolicy`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use tracing::{debug, trace, warn};

use super::policy::{CertificateErrors, CertificateFlaw, CertificatePolicy, PeerCertificate};

// ============================================================================
// ChainCheck
// ============================================================================

/// How the presented chain is judged.
pub(crate) enum ChainCheck {
    /// Debug override: every chain is accepted and the policy is skipped.
    AcceptAny,
    /// webpki validation against the trusted roots, then the policy.
    WebPki(Arc<WebPkiServerVerifier>),
}

// ============================================================================
// PolicyVerifier
// ============================================================================

/// Runs webpki chain validation, then lets the policy have the final word.
///
/// Handshake signatures are always checked against the provider's
/// algorithms; only the trust decision on the chain is delegated.
pub(crate) struct PolicyVerifier {
    chain: ChainCheck,
    provider: Arc<CryptoProvider>,
    policy: Arc<dyn CertificatePolicy>,
    origin: String,
}

impl PolicyVerifier {
    pub(crate) fn new(
        chain: ChainCheck,
        provider: Arc<CryptoProvider>,
        policy: Arc<dyn CertificatePolicy>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            provider,
            policy,
            origin: origin.into(),
        }
    }
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier")
            .field("origin", &self.origin)
            .field("allow_any_certificate", &matches!(self.chain, ChainCheck::AcceptAny))
            .finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let webpki = match &self.chain {
            ChainCheck::AcceptAny => {
                trace!(origin = %self.origin, "Certificate checks disabled, accepting");
                return Ok(ServerCertVerified::assertion());
            }
            ChainCheck::WebPki(webpki) => webpki,
        };

        let mut errors = CertificateErrors::empty();
        match webpki.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Ok(_) => {}
            Err(rustls::Error::InvalidCertificate(err)) => {
                errors.insert(CertificateFlaw::from(&err));
            }
            Err(other) => return Err(other),
        }

        let certificate = PeerCertificate::new(end_entity.clone().into_owned(), intermediates.len());

        if self.policy.decide(&certificate, &errors, &self.origin) {
            debug!(origin = %self.origin, ?errors, "Certificate accepted");
            Ok(ServerCertVerified::assertion())
        } else {
            warn!(origin = %self.origin, ?errors, "Certificate rejected by policy");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
