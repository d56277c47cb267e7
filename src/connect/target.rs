//! Connection target addresses.
//!
//! # Supported Schemes
//!
//! | Scheme | TLS | WebSocket upgrade | Default port |
//! |--------|-----|-------------------|--------------|
//! | `ws` | no | yes | 80 |
//! | `wss` | yes | yes | 443 |
//! | `tcp` | no | no | required |
//! | `tls` | yes | no | required |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

// ============================================================================
// Scheme
// ============================================================================

/// Transport flavor selected by the address scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain WebSocket upgrade.
    Ws,
    /// WebSocket upgrade over TLS.
    Wss,
    /// Raw TCP.
    Tcp,
    /// Raw TCP over TLS.
    Tls,
}

impl Scheme {
    fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "ws" => Some(Self::Ws),
            "wss" => Some(Self::Wss),
            "tcp" => Some(Self::Tcp),
            "tls" => Some(Self::Tls),
            _ => None,
        }
    }

    /// Scheme name as written in addresses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
            Self::Tcp => "tcp",
            Self::Tls => "tls",
        }
    }

    /// Returns `true` if the scheme implies TLS.
    #[inline]
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::Wss | Self::Tls)
    }

    /// Returns `true` if the scheme performs a WebSocket upgrade.
    #[inline]
    #[must_use]
    pub const fn is_websocket(self) -> bool {
        matches!(self, Self::Ws | Self::Wss)
    }

    const fn default_port(self) -> Option<u16> {
        match self {
            Self::Ws => Some(80),
            Self::Wss => Some(443),
            Self::Tcp | Self::Tls => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Target
// ============================================================================

/// A parsed, validated connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Target {
    /// Parses an address such as `wss://example.com/socket` or `tcp://10.0.0.1:7000`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is malformed, uses an
    /// unsupported scheme, or omits a required port.
    pub fn parse(address: &str) -> Result<Self> {
        let url = Url::parse(address)
            .map_err(|e| Error::invalid_address(format!("{address}: {e}")))?;

        let scheme = Scheme::parse(url.scheme()).ok_or_else(|| {
            Error::invalid_address(format!(
                "{address}: unsupported scheme '{}' (expected ws, wss, tcp or tls)",
                url.scheme()
            ))
        })?;

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(Error::invalid_address(format!("{address}: missing host"))),
        };

        let port = url
            .port()
            .or_else(|| scheme.default_port())
            .ok_or_else(|| Error::invalid_address(format!("{address}: missing port")))?;

        Ok(Self {
            url,
            scheme,
            host,
            port,
        })
    }

    /// The address as parsed.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Scheme of the address.
    #[inline]
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host name or IP literal (without brackets) to connect to.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port to connect to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` if the scheme implies TLS.
    #[inline]
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.scheme.is_secure()
    }

    /// Returns `true` if a WebSocket upgrade follows the connect.
    #[inline]
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        self.scheme.is_websocket()
    }

    /// Origin handed to certificate policies.
    ///
    /// Format: `{scheme}://{host}:{port}`
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host_header_name(), self.port)
    }

    /// Value of the HTTP `Host` header for the upgrade request.
    pub(crate) fn host_header(&self) -> String {
        match (self.url.port(), self.scheme.default_port()) {
            (Some(port), default) if Some(port) != default => {
                format!("{}:{}", self.host_header_name(), port)
            }
            _ => self.host_header_name(),
        }
    }

    /// Request target of the upgrade request: path plus query.
    pub(crate) fn resource(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_owned(),
        }
    }

    fn host_header_name(&self) -> String {
        match self.url.host() {
            Some(Host::Ipv6(ip)) => format!("[{ip}]"),
            _ => self.host.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
