//! Cloudlink client - async client for the Meower realtime protocol.
//!
//! This library maintains one persistent WebSocket to a Cloudlink server
//! and turns its ID-less wire protocol into ordinary request/response
//! calls and typed event streams.
//!
//! # Architecture
//!
//! The protocol carries no request identifiers, so correlation is by
//! shape: a request registers matchers for its expected success payload
//! and for server error codes, and every inbound envelope is tested
//! against all active matchers in registration order.
//!
//! - Each [`Client`] owns: one connection + dispatch loop + keepalive
//! - Requests race success shape vs. error shape vs. timeout, exactly one
//!   of which resolves each call
//! - [`Session`] replays persisted credentials across reconnects, so the
//!   logical session survives transport restarts
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cloudlink_client::{
//!     Client, ClientConfig, MemoryCredentialStore, PresenceFeed, Result, Session, UserPrompt,
//! };
//!
//! # async fn example(prompt: Arc<dyn UserPrompt>) -> Result<()> {
//! let config = ClientConfig::parse("wss://api.meower.org/v0/cloudlink")?;
//! let client = Client::new(config)?;
//!
//! // Track who is online
//! let presence = PresenceFeed::attach(&client);
//!
//! // Log in; the session re-authenticates by itself after reconnects
//! let session = Session::new(
//!     client,
//!     Arc::new(MemoryCredentialStore::new()),
//!     prompt,
//! );
//! session.start().await?;
//! session.login("alice", "secret").await?;
//!
//! println!("online: {:?}", presence.online_users());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Correlation engine: [`Client`], subscriptions, readiness |
//! | [`config`] | Endpoint and timing configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Wire envelopes and shape matchers |
//! | [`session`] | Session bootstrap and credential replay |
//! | [`transport`] | WebSocket connection (internal plumbing) |

// ============================================================================
// Modules
// ============================================================================

/// Correlation engine: the client, subscriptions, and readiness gate.
pub mod client;

/// Endpoint and timing configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Wire protocol message types and shape matchers.
pub mod protocol;

/// Session bootstrap and credential replay.
pub mod session;

/// WebSocket transport layer.
pub mod transport;

#[cfg(test)]
mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ConnectionLost, ListenerId, PendingMatch, PresenceFeed, Subscription};

// Configuration
pub use config::ClientConfig;

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{
    AuthPayload, AuthRequest, AuthResponse, Packet, Relationship, RelationshipPush,
    RelationshipState, Shape, StatusCode, StatusKind,
};

// Session types
pub use session::{
    CredentialStore, MemoryCredentialStore, Session, SessionState, UserPrompt,
};

// Transport types
pub use transport::ConnectionState;
