//! Connection establishment.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `target` | Address parsing ([`Target`], [`Scheme`]) |
//! | `connector` | [`Connector`] seam and [`NetConnector`] |
//! | `upgrade` | WebSocket opening handshake (internal) |

// ============================================================================
// Submodules
// ============================================================================

/// Connection establishment over the network.
pub mod connector;

/// Connection target addresses.
pub mod target;

mod upgrade;

// ============================================================================
// Re-exports
// ============================================================================

pub use connector::{BoxedStream, ConnectRequest, Connector, IoStream, NetConnector};
pub use target::{Scheme, Target};
