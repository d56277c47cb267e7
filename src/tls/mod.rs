//! TLS certificate policy and client configuration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `policy` | [`CertificatePolicy`] and the built-in policies |
//! | `verifier` | rustls verifier that consults the policy |

// ============================================================================
// Submodules
// ============================================================================

/// Certificate acceptance policies.
pub mod policy;

mod verifier;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};

use crate::error::{Error, Result};

use self::verifier::{ChainCheck, PolicyVerifier};

// ============================================================================
// Re-exports
// ============================================================================

pub use policy::{
    CertificateErrors, CertificateFlaw, CertificatePolicy, HostExceptionPolicy, PeerCertificate,
    StrictPolicy,
};

// ============================================================================
// TlsSettings
// ============================================================================

/// Everything the handshake needs to make certificate decisions.
#[derive(Clone)]
pub struct TlsSettings {
    policy: Arc<dyn CertificatePolicy>,
    allow_any_certificate: bool,
    root_certificates: Vec<CertificateDer<'static>>,
    use_webpki_roots: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self::new(Arc::new(StrictPolicy))
    }
}

impl TlsSettings {
    /// Creates settings that consult `policy` and trust the bundled roots.
    #[must_use]
    pub fn new(policy: Arc<dyn CertificatePolicy>) -> Self {
        Self {
            policy,
            allow_any_certificate: false,
            root_certificates: Vec::new(),
            use_webpki_roots: true,
        }
    }

    /// Skips the policy and accepts any chain.
    ///
    /// Debug and test override only; never the default.
    #[inline]
    #[must_use]
    pub fn with_allow_any_certificate(mut self, allow: bool) -> Self {
        self.allow_any_certificate = allow;
        self
    }

    /// Adds a trusted root certificate.
    #[inline]
    #[must_use]
    pub fn with_root_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.root_certificates.push(certificate);
        self
    }

    /// Controls whether the bundled webpki roots are trusted.
    #[inline]
    #[must_use]
    pub fn with_webpki_roots(mut self, enabled: bool) -> Self {
        self.use_webpki_roots = enabled;
        self
    }

    /// Returns the configured policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &Arc<dyn CertificatePolicy> {
        &self.policy
    }

    /// Returns `true` if certificate checks are bypassed.
    #[inline]
    #[must_use]
    pub fn allows_any_certificate(&self) -> bool {
        self.allow_any_certificate
    }

    /// Builds a rustls client configuration bound to `origin`.
    ///
    /// Trusted roots are only required while certificate checks are on.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if checks are on and no trusted roots are configured
    /// - [`Error::Tls`] if a root certificate cannot be parsed
    pub fn client_config(&self, origin: &str) -> Result<ClientConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let chain = if self.allow_any_certificate {
            ChainCheck::AcceptAny
        } else {
            ChainCheck::WebPki(self.webpki_verifier(&provider)?)
        };

        let verifier = PolicyVerifier::new(chain, Arc::clone(&provider), Arc::clone(&self.policy), origin);

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok(config)
    }

    fn webpki_verifier(&self, provider: &Arc<CryptoProvider>) -> Result<Arc<WebPkiServerVerifier>> {
        let mut roots = RootCertStore::empty();
        if self.use_webpki_roots {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        for certificate in &self.root_certificates {
            roots.add(certificate.clone())?;
        }
        if roots.is_empty() {
            return Err(Error::config("No trusted root certificates configured"));
        }

        WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(provider))
            .build()
            .map_err(|e| Error::config(format!("Certificate verifier: {e}")))
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("allow_any_certificate", &self.allow_any_certificate)
            .field("root_certificates", &self.root_certificates.len())
            .field("use_webpki_roots", &self.use_webpki_roots)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
