//! Authentication and relationship message types.
//!
//! # Wire Format
//!
//! The auth request travels as an inner command inside a `direct`
//! envelope:
//!
//! ```json
//! { "cmd": "authpswd", "val": { "username": "alice", "pswd": "secret" } }
//! ```
//!
//! The success payload arrives as a `direct` envelope tagged
//! `mode: "auth"`:
//!
//! ```json
//! {
//!   "cmd": "direct",
//!   "val": {
//!     "mode": "auth",
//!     "payload": {
//!       "username": "alice",
//!       "token": "tok123",
//!       "relationships": [{ "username": "bob", "state": 2, "updated_at": null }]
//!     }
//!   }
//! }
//! ```
//!
//! Relationship changes after login are pushed as
//! `mode: "update_relationship"` envelopes with a single-user payload.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::packet::Packet;
use super::shape::Shape;

// ============================================================================
// AuthRequest
// ============================================================================

/// Credentials for the `authpswd` command.
///
/// The server accepts a session token in place of the password, which is
/// how re-authentication after a reconnect works without retaining the
/// plaintext password.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    /// Account name.
    pub username: String,

    /// Password, or a previously issued session token.
    pub pswd: String,
}

impl AuthRequest {
    /// Creates an auth request.
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, pswd: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            pswd: pswd.into(),
        }
    }

    /// Builds the inner `authpswd` command packet.
    ///
    /// Callers wrap it with [`Packet::direct`] before sending.
    #[must_use]
    pub fn to_packet(&self) -> Packet {
        Packet::new(
            "authpswd",
            json!({ "username": self.username, "pswd": self.pswd }),
        )
    }
}

// ============================================================================
// AuthResponse
// ============================================================================

/// Success payload of an auth call.
///
/// The `mode: "auth"` discriminator is checked by [`AuthResponse::shape`];
/// it is not part of the deserialized struct.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Account and session data.
    pub payload: AuthPayload,
}

impl AuthResponse {
    /// Shape matching `{ "cmd": "direct", "val": { "mode": "auth", ... } }`.
    #[inline]
    #[must_use]
    pub fn shape() -> Shape<Self> {
        Shape::direct_mode("auth")
    }
}

/// Account data returned by a successful auth call.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    /// Canonical account name.
    pub username: String,

    /// Session token, valid until revoked server-side.
    pub token: String,

    /// Relationship list at login time; feeds the blocked-user cache.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

// ============================================================================
// Relationship
// ============================================================================

/// One user's relationship entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Relationship {
    /// The other user.
    pub username: String,

    /// Relationship kind.
    pub state: RelationshipState,

    /// Epoch seconds of the last change, when the server knows it.
    #[serde(default)]
    pub updated_at: Option<f64>,
}

/// Relationship kind, as the server encodes it.
///
/// Only removal (0) and block (2) exist on the wire; any other value is a
/// non-match at the shape boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum RelationshipState {
    /// State 0: relationship removed (unblock).
    Removed,
    /// State 2: user is blocked.
    Blocked,
}

impl TryFrom<u8> for RelationshipState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Removed),
            2 => Ok(Self::Blocked),
            other => Err(format!("unknown relationship state: {other}")),
        }
    }
}

// ============================================================================
// RelationshipPush
// ============================================================================

/// A server-pushed relationship change for one user.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipPush {
    /// The changed relationship.
    pub payload: Relationship,
}

impl RelationshipPush {
    /// Shape matching `mode: "update_relationship"` envelopes.
    #[inline]
    #[must_use]
    pub fn shape() -> Shape<Self> {
        Shape::direct_mode("update_relationship")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_request_packet() {
        let request = AuthRequest::new("alice", "secret");
        let packet = request.to_packet();

        assert_eq!(packet.cmd, "authpswd");
        assert_eq!(packet.val["username"], "alice");
        assert_eq!(packet.val["pswd"], "secret");
    }

    #[test]
    fn test_auth_response_parsing() {
        let frame = r#"{
            "cmd": "direct",
            "val": {
                "mode": "auth",
                "payload": {
                    "username": "alice",
                    "token": "tok123",
                    "relationships": [
                        { "username": "bob", "state": 2, "updated_at": null }
                    ]
                }
            }
        }"#;

        let packet = Packet::parse(frame).expect("parse packet");
        let response = AuthResponse::shape().matches(&packet).expect("match");

        assert_eq!(response.payload.username, "alice");
        assert_eq!(response.payload.token, "tok123");
        assert_eq!(response.payload.relationships.len(), 1);
        assert_eq!(
            response.payload.relationships[0].state,
            RelationshipState::Blocked
        );
    }

    #[test]
    fn test_auth_shape_ignores_other_modes() {
        let frame = r#"{
            "cmd": "direct",
            "val": { "mode": "post", "payload": { "p": "hi" } }
        }"#;

        let packet = Packet::parse(frame).expect("parse packet");
        assert!(AuthResponse::shape().matches(&packet).is_none());
    }

    #[test]
    fn test_auth_response_without_relationships() {
        let frame = r#"{
            "cmd": "direct",
            "val": {
                "mode": "auth",
                "payload": { "username": "alice", "token": "tok123" }
            }
        }"#;

        let packet = Packet::parse(frame).expect("parse packet");
        let response = AuthResponse::shape().matches(&packet).expect("match");
        assert!(response.payload.relationships.is_empty());
    }

    #[test]
    fn test_relationship_state_codes() {
        assert_eq!(RelationshipState::try_from(0), Ok(RelationshipState::Removed));
        assert_eq!(RelationshipState::try_from(2), Ok(RelationshipState::Blocked));
        assert!(RelationshipState::try_from(1).is_err());
    }

    #[test]
    fn test_relationship_push_parsing() {
        let frame = r#"{
            "cmd": "direct",
            "val": {
                "mode": "update_relationship",
                "payload": { "username": "bob", "state": 0, "updated_at": 1700000000 }
            }
        }"#;

        let packet = Packet::parse(frame).expect("parse packet");
        let push = RelationshipPush::shape().matches(&packet).expect("match");

        assert_eq!(push.payload.username, "bob");
        assert_eq!(push.payload.state, RelationshipState::Removed);
    }

    #[test]
    fn test_unknown_relationship_state_is_non_match() {
        let frame = r#"{
            "cmd": "direct",
            "val": {
                "mode": "update_relationship",
                "payload": { "username": "bob", "state": 7 }
            }
        }"#;

        let packet = Packet::parse(frame).expect("parse packet");
        assert!(RelationshipPush::shape().matches(&packet).is_none());
    }
}
