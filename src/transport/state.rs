//! Transport lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`TransportHandle`](super::TransportHandle).
///
/// Transitions only move forward:
///
/// ```text
/// Connecting ──► Open ──► Closing ──► Closed
///      │                     ▲
///      └─────────────────────┘ (close while connecting)
///      └────────────────────────────► Closed (connect failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Establishment in progress.
    Connecting,
    /// Stream is live; reads and writes flow.
    Open,
    /// Teardown in progress.
    Closing,
    /// Terminal. The stream has been released.
    Closed,
}

impl State {
    /// Returns `true` once teardown has started or finished.
    #[inline]
    #[must_use]
    pub const fn is_terminating(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
