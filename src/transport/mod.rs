//! WebSocket transport layer.
//!
//! This module maintains the single persistent connection to a Cloudlink
//! server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌─────────────────┐
//! │  Client (Rust)   │                              │  Server         │
//! │                  │          WebSocket           │                 │
//! │  Transport       │◄────────────────────────────►│  Cloudlink      │
//! │  → event channel │       wss://host/path        │  endpoint       │
//! │                  │                              │                 │
//! └──────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::connect` - Dial the endpoint (no-op while connecting/open)
//! 2. Frames flow until the socket drops, either side
//! 3. A close notification lands on the event channel, after all frames
//! 4. The session layer decides whether to call `connect` again
//!
//! The transport itself never retries.

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and connection loop.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use socket::{ConnectionState, Transport};

pub(crate) use socket::TransportEvent;
