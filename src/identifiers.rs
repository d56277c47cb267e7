//! Type-safe identifiers.
//!
//! Every [`TransportHandle`](crate::TransportHandle) carries a [`TransportId`]
//! that appears in its log lines, so interleaved output from many
//! transports can be told apart.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// TransportId
// ============================================================================

/// Unique identifier of one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(Uuid);

impl TransportId {
    /// Generates a new random identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

// ============================================================================
// Tests
// ============================================================================
