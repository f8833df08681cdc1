//! Envelope message type.
//!
//! Every frame on a Cloudlink socket, in either direction, is a JSON
//! envelope with a command discriminator and an opaque payload.
//!
//! # Format
//!
//! ```json
//! { "cmd": "direct", "val": { ... } }
//! ```
//!
//! Application-level commands are nested one level deep inside a `direct`
//! envelope, so an auth request travels as:
//!
//! ```json
//! { "cmd": "direct", "val": { "cmd": "authpswd", "val": { ... } } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Packet
// ============================================================================

/// A single Cloudlink envelope.
///
/// Outbound packets are constructed by callers and immutable once sent.
/// Inbound packets are untyped until matched against a declared
/// [`Shape`](crate::protocol::Shape); servers attach extra bookkeeping
/// fields which are ignored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Command discriminator (`direct`, `statuscode`, `ulist`, `ping`, ...).
    pub cmd: String,

    /// Opaque payload; its meaning depends on `cmd`.
    #[serde(default)]
    pub val: Value,
}

impl Packet {
    /// Creates a packet from a command name and payload.
    #[inline]
    #[must_use]
    pub fn new(cmd: impl Into<String>, val: impl Into<Value>) -> Self {
        Self {
            cmd: cmd.into(),
            val: val.into(),
        }
    }

    /// Wraps an application-level command in a `direct` envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the inner command
    /// fails to serialize.
    pub fn direct(inner: impl Serialize) -> Result<Self> {
        Ok(Self {
            cmd: "direct".to_string(),
            val: serde_json::to_value(inner)?,
        })
    }

    /// Creates the liveness probe packet: `{ "cmd": "ping", "val": "" }`.
    ///
    /// No reply is awaited for pings.
    #[inline]
    #[must_use]
    pub fn ping() -> Self {
        Self::new("ping", "")
    }

    /// Parses an inbound text frame.
    ///
    /// Malformed frames yield `None`; one bad frame from the server must
    /// not break dispatch for unrelated listeners.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// Serializes the packet to its wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the payload as a string slice, if it is one.
    #[inline]
    #[must_use]
    pub fn val_str(&self) -> Option<&str> {
        self.val.as_str()
    }
}

// ============================================================================
// Tests
// ============================================================================
