//! Certificate acceptance policies.
//!
//! A [`CertificatePolicy`] is consulted from inside the TLS handshake every
//! time the peer presents a certificate. It sees the certificate, the flaws
//! found by chain validation and the origin being connected to, and answers
//! accept or reject. Policies never touch the transport.
//!
//! # Built-in Policies
//!
//! | Policy | Behavior |
//! |--------|----------|
//! | [`StrictPolicy`] | Accept iff validation found no flaws |
//! | [`HostExceptionPolicy`] | Strict, plus pinned per-host exceptions |
//! | closures | `Fn(&PeerCertificate, &CertificateErrors, &str) -> bool` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use rustls::CertificateError;
use rustls::pki_types::CertificateDer;
use url::Url;

// ============================================================================
// CertificateFlaw
// ============================================================================

/// A single reason chain validation found a certificate unacceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CertificateFlaw {
    /// Signed by an authority that is not trusted.
    UnknownIssuer = 1 << 0,
    /// Not valid for the host being connected to.
    BadIdentity = 1 << 1,
    /// Validity period has not started yet.
    NotActivated = 1 << 2,
    /// Validity period has ended.
    Expired = 1 << 3,
    /// Revoked by its issuer.
    Revoked = 1 << 4,
    /// Signature does not verify.
    BadSignature = 1 << 5,
    /// Any other validation failure.
    Other = 1 << 6,
}

impl CertificateFlaw {
    const ALL: [Self; 7] = [
        Self::UnknownIssuer,
        Self::BadIdentity,
        Self::NotActivated,
        Self::Expired,
        Self::Revoked,
        Self::BadSignature,
        Self::Other,
    ];

    #[inline]
    const fn bit(self) -> u8 {
        self as u8
    }
}

impl From<&CertificateError> for CertificateFlaw {
    fn from(err: &CertificateError) -> Self {
        match err {
            CertificateError::UnknownIssuer => Self::UnknownIssuer,
            CertificateError::NotValidForName | CertificateError::NotValidForNameContext { .. } => {
                Self::BadIdentity
            }
            CertificateError::NotValidYet | CertificateError::NotValidYetContext { .. } => {
                Self::NotActivated
            }
            CertificateError::Expired | CertificateError::ExpiredContext { .. } => Self::Expired,
            CertificateError::Revoked => Self::Revoked,
            CertificateError::BadSignature => Self::BadSignature,
            _ => Self::Other,
        }
    }
}

// ============================================================================
// CertificateErrors
// ============================================================================

/// Set of [`CertificateFlaw`]s reported for one certificate.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CertificateErrors {
    bits: u8,
}

impl CertificateErrors {
    /// An empty set: validation succeeded.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Adds a flaw to the set.
    #[inline]
    pub fn insert(&mut self, flaw: CertificateFlaw) {
        self.bits |= flaw.bit();
    }

    /// Returns a copy of the set with `flaw` added.
    #[inline]
    #[must_use]
    pub fn with(mut self, flaw: CertificateFlaw) -> Self {
        self.insert(flaw);
        self
    }

    /// Returns `true` if `flaw` is in the set.
    #[inline]
    #[must_use]
    pub const fn contains(&self, flaw: CertificateFlaw) -> bool {
        self.bits & flaw.bit() != 0
    }

    /// Returns `true` if validation found nothing wrong.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Iterates over the flaws in the set.
    pub fn iter(&self) -> impl Iterator<Item = CertificateFlaw> + '_ {
        CertificateFlaw::ALL
            .into_iter()
            .filter(|flaw| self.contains(*flaw))
    }
}

impl fmt::Debug for CertificateErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ============================================================================
// PeerCertificate
// ============================================================================

/// End-entity certificate presented by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    der: CertificateDer<'static>,
    intermediates: usize,
}

impl PeerCertificate {
    /// Wraps a DER-encoded certificate.
    #[inline]
    #[must_use]
    pub fn new(der: CertificateDer<'static>, intermediates: usize) -> Self {
        Self { der, intermediates }
    }

    /// DER encoding of the end-entity certificate.
    #[inline]
    #[must_use]
    pub fn der(&self) -> &CertificateDer<'static> {
        &self.der
    }

    /// Number of intermediate certificates sent along with it.
    #[inline]
    #[must_use]
    pub fn intermediates(&self) -> usize {
        self.intermediates
    }
}

// ============================================================================
// CertificatePolicy
// ============================================================================

/// Decides whether a peer certificate is acceptable for an origin.
///
/// Called synchronously from the TLS handshake. Returning `false` aborts
/// the handshake with a certificate error.
pub trait CertificatePolicy: Send + Sync + 'static {
    /// Returns `true` to accept `certificate` for `origin`.
    fn decide(&self, certificate: &PeerCertificate, errors: &CertificateErrors, origin: &str)
    -> bool;
}

impl<F> CertificatePolicy for F
where
    F: Fn(&PeerCertificate, &CertificateErrors, &str) -> bool + Send + Sync + 'static,
{
    fn decide(
        &self,
        certificate: &PeerCertificate,
        errors: &CertificateErrors,
        origin: &str,
    ) -> bool {
        self(certificate, errors, origin)
    }
}

// ============================================================================
// StrictPolicy
// ============================================================================

/// Accepts a certificate only when chain validation found no flaws.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictPolicy;

impl CertificatePolicy for StrictPolicy {
    fn decide(&self, _: &PeerCertificate, errors: &CertificateErrors, _: &str) -> bool {
        errors.is_empty()
    }
}

// ============================================================================
// HostExceptionPolicy
// ============================================================================

/// Strict validation plus user-approved exceptions.
///
/// A certificate that fails validation is still accepted when it was
/// explicitly allowed for the host being connected to.
#[derive(Debug, Default)]
pub struct HostExceptionPolicy {
    allowed: RwLock<FxHashMap<String, Vec<CertificateDer<'static>>>>,
}

impl HostExceptionPolicy {
    /// Creates a policy with no exceptions.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `certificate` for `host` regardless of validation flaws.
    pub fn allow(&self, host: impl Into<String>, certificate: CertificateDer<'static>) {
        let host = host.into().to_ascii_lowercase();
        let mut allowed = self.allowed.write();
        let entries = allowed.entry(host).or_default();
        if !entries.contains(&certificate) {
            entries.push(certificate);
        }
    }

    /// Returns `true` if `certificate` was allowed for `host`.
    #[must_use]
    pub fn is_allowed(&self, host: &str, certificate: &CertificateDer<'_>) -> bool {
        self.allowed
            .read()
            .get(&host.to_ascii_lowercase())
            .is_some_and(|entries| entries.iter().any(|c| c.as_ref() == certificate.as_ref()))
    }
}

impl CertificatePolicy for HostExceptionPolicy {
    fn decide(&self, certificate: &PeerCertificate, errors: &CertificateErrors, origin: &str) -> bool {
        if errors.is_empty() {
            return true;
        }

        let Some(host) = Url::parse(origin)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
        else {
            return false;
        };

        self.is_allowed(&host, certificate.der())
    }
}

// ============================================================================
// Tests
// ============================================================================
