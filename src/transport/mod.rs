//! Transport handle and its lifecycle.
//!
//! A [`TransportHandle`] owns one duplex byte stream from the moment it is
//! established until it is closed. Establishment, reading and waiting for
//! writability each run as a spawned task holding a clone of the handle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  create/send/close   ┌──────────────────┐
//! │    Client    │─────────────────────►│ TransportHandle  │
//! │ StreamClient │◄─────────────────────│                  │
//! └──────────────┘      callbacks       │  establish task  │──► Connector
//!                                       │  read loop task  │◄── stream
//!                                       │  drain task      │──► stream
//!                                       └──────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. `TransportHandle::create` / `builder().connect()` - `Connecting`
//! 2. Establishment succeeds - `Open`, `on_open`, read loop starts
//! 3. `send` writes now or queues behind pending bytes
//! 4. `close`, peer EOF or a write failure - `Closing` then `Closed`, `on_close`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Handle struct, accessors and teardown |
//! | `establish` | Connecting and the transition to `Open` |
//! | `read_loop` | Sequential reads and delivery |
//! | `send` | Immediate writes and readiness-driven drain |
//! | `write_buffer` | Outbound queue and readiness subscription |
//! | `builder` | Fluent construction |
//! | `options` | [`TransportConfig`] |
//! | `state` | [`State`] |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent transport construction.
pub mod builder;

/// Transport configuration.
pub mod options;

/// Lifecycle states.
pub mod state;

mod core;
mod establish;
mod read_loop;
mod send;
mod write_buffer;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::TransportBuilder;
pub use core::TransportHandle;
pub use options::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_MAX_BUFFERED_AMOUNT, DEFAULT_READ_BUFFER_SIZE,
    TransportConfig,
};
pub use state::State;
