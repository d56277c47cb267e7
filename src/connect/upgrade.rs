//! Client side of the WebSocket opening handshake.
//!
//! Only the HTTP/1.1 upgrade exchange is performed here. Once the server
//! answers `101 Switching Protocols` the raw stream is handed to the
//! transport untouched; framing is left to the layer above.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::target::Target;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on the response head before giving up.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

// ============================================================================
// Handshake
// ============================================================================

/// Performs the opening handshake on `stream`.
///
/// The response head is consumed byte by byte so that frames sent right
/// after it stay in the stream for the read loop.
///
/// # Errors
///
/// Returns [`Error::Upgrade`] if the exchange fails or the server's answer
/// does not complete the upgrade.
pub(crate) async fn websocket_handshake<S>(
    stream: &mut S,
    target: &Target,
    protocols: &[String],
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let key = generate_key();
    let request = build_request(target, &key, protocols);

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::upgrade(format!("sending request: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::upgrade(format!("sending request: {e}")))?;

    trace!(address = %target, "Upgrade request sent");

    let head = read_response_head(stream).await?;
    validate_response(&head, &key, protocols)?;

    debug!(address = %target, "WebSocket upgrade completed");
    Ok(())
}

fn build_request(target: &Target, key: &str, protocols: &[String]) -> String {
    let mut request = format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n",
        target.resource(),
        target.host_header(),
        key
    );

    if !protocols.is_empty() {
        request.push_str("Sec-WebSocket-Protocol: ");
        request.push_str(&protocols.join(", "));
        request.push_str("\r\n");
    }

    request.push_str("\r\n");
    request
}

async fn read_response_head<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(Error::upgrade(format!(
                "response head exceeds {MAX_RESPONSE_HEAD} bytes"
            )));
        }

        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| Error::upgrade(format!("reading response: {e}")))?;
        if n == 0 {
            return Err(Error::upgrade("connection closed during handshake"));
        }
        head.push(byte[0]);
    }

    Ok(head)
}

fn validate_response(head: &[u8], key: &str, protocols: &[String]) -> Result<()> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::upgrade("response head is not valid UTF-8"))?;

    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();

    if version != "HTTP/1.1" || code != "101" {
        return Err(Error::upgrade(format!(
            "unexpected status line: {status_line}"
        )));
    }

    let headers: FxHashMap<String, &str> = lines
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim()))
        .collect();

    let upgrade = headers.get("upgrade").copied().unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::upgrade(format!("bad Upgrade header: '{upgrade}'")));
    }

    let connection = headers.get("connection").copied().unwrap_or_default();
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(Error::upgrade(format!(
            "bad Connection header: '{connection}'"
        )));
    }

    let expected = derive_accept_key(key.as_bytes());
    match headers.get("sec-websocket-accept") {
        Some(accept) if *accept == expected => {}
        Some(accept) => {
            return Err(Error::upgrade(format!(
                "Sec-WebSocket-Accept mismatch: '{accept}'"
            )));
        }
        None => return Err(Error::upgrade("missing Sec-WebSocket-Accept")),
    }

    if let Some(chosen) = headers.get("sec-websocket-protocol")
        && !protocols.iter().any(|p| p == chosen)
    {
        return Err(Error::upgrade(format!(
            "server selected unrequested subprotocol '{chosen}'"
        )));
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
