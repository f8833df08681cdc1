//! Declarative frame matchers.
//!
//! The protocol has no request IDs, so responses are recognized by their
//! shape: a caller declares what a matching payload looks like, and every
//! inbound envelope is tested against it. A [`Shape`] bundles that test
//! with the conversion into a typed value.
//!
//! Non-conforming frames are a non-match, never an error - most frames
//! are irrelevant to most listeners by design.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::packet::Packet;
use super::status::StatusCode;

// ============================================================================
// Shape
// ============================================================================

/// A matcher from an inbound [`Packet`] to a typed value.
///
/// Cheap to clone; the underlying matcher is shared.
pub struct Shape<T> {
    matcher: Arc<dyn Fn(&Packet) -> Option<T> + Send + Sync>,
}

impl<T> Clone for Shape<T> {
    fn clone(&self) -> Self {
        Self {
            matcher: Arc::clone(&self.matcher),
        }
    }
}

impl<T> fmt::Debug for Shape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape").finish_non_exhaustive()
    }
}

impl<T> Shape<T> {
    /// Creates a shape from a custom matcher closure.
    pub fn new(matcher: impl Fn(&Packet) -> Option<T> + Send + Sync + 'static) -> Self {
        Self {
            matcher: Arc::new(matcher),
        }
    }

    /// Tests a packet against this shape.
    ///
    /// Returns the typed value on a match, `None` otherwise.
    #[inline]
    #[must_use]
    pub fn matches(&self, packet: &Packet) -> Option<T> {
        (self.matcher)(packet)
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl<T: DeserializeOwned + 'static> Shape<T> {
    /// Matches `{ "cmd": <cmd>, "val": <T> }`.
    #[must_use]
    pub fn command(cmd: impl Into<String>) -> Self {
        let cmd = cmd.into();
        Self::new(move |packet| {
            if packet.cmd != cmd {
                return None;
            }
            serde_json::from_value(packet.val.clone()).ok()
        })
    }

    /// Matches `{ "cmd": "direct", "val": <T> }`.
    #[inline]
    #[must_use]
    pub fn direct() -> Self {
        Self::command("direct")
    }

    /// Matches `{ "cmd": "direct", "val": { "mode": <mode>, ... <T> } }`.
    ///
    /// The `mode` discriminator is how the server tags payloads nested in
    /// `direct` envelopes; the remaining fields deserialize into `T`.
    #[must_use]
    pub fn direct_mode(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        Self::new(move |packet| {
            if packet.cmd != "direct" {
                return None;
            }
            if packet.val.get("mode").and_then(|m| m.as_str()) != Some(mode.as_str()) {
                return None;
            }
            serde_json::from_value(packet.val.clone()).ok()
        })
    }
}

impl Shape<StatusCode> {
    /// Matches `statuscode` envelopes carrying a request-failing code.
    ///
    /// This is the error half of every [`send`](crate::Client::send) race.
    #[must_use]
    pub fn status_error() -> Self {
        Self::new(|packet| {
            if packet.cmd != "statuscode" {
                return None;
            }
            let status = StatusCode::parse(packet.val_str()?)?;
            status.is_error().then_some(status)
        })
    }

    /// Matches every parseable `statuscode` envelope, errors included.
    #[must_use]
    pub fn status_any() -> Self {
        Self::new(|packet| {
            if packet.cmd != "statuscode" {
                return None;
            }
            StatusCode::parse(packet.val_str()?)
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Greeting {
        text: String,
    }

    #[test]
    fn test_command_shape_matches() {
        let shape = Shape::<Greeting>::command("hello");
        let packet = Packet::new("hello", json!({ "text": "hi" }));

        let greeting = shape.matches(&packet).expect("match");
        assert_eq!(greeting.text, "hi");
    }

    #[test]
    fn test_command_shape_rejects_other_cmd() {
        let shape = Shape::<Greeting>::command("hello");
        let packet = Packet::new("goodbye", json!({ "text": "hi" }));
        assert!(shape.matches(&packet).is_none());
    }

    #[test]
    fn test_command_shape_rejects_nonconforming_payload() {
        let shape = Shape::<Greeting>::command("hello");
        let packet = Packet::new("hello", json!({ "unrelated": 3 }));
        assert!(shape.matches(&packet).is_none());
    }

    #[test]
    fn test_direct_mode_requires_discriminator() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            payload: u32,
        }

        let shape = Shape::<Payload>::direct_mode("auth");
        let hit = Packet::new("direct", json!({ "mode": "auth", "payload": 7 }));
        let wrong_mode = Packet::new("direct", json!({ "mode": "other", "payload": 7 }));
        let wrong_cmd = Packet::new("ulist", json!({ "mode": "auth", "payload": 7 }));

        assert_eq!(shape.matches(&hit).map(|p| p.payload), Some(7));
        assert!(shape.matches(&wrong_mode).is_none());
        assert!(shape.matches(&wrong_cmd).is_none());
    }

    #[test]
    fn test_status_error_shape() {
        let shape = Shape::status_error();

        let error = Packet::new("statuscode", "E:103 | ID conflict");
        assert!(shape.matches(&error).is_some());

        let ok = Packet::new("statuscode", "I:100 | OK");
        assert!(shape.matches(&ok).is_none());

        let not_a_status = Packet::new("direct", "E:103");
        assert!(shape.matches(&not_a_status).is_none());
    }

    #[test]
    fn test_status_any_shape() {
        let shape = Shape::status_any();
        let ok = Packet::new("statuscode", "I:100 | OK");
        assert_eq!(shape.matches(&ok).map(|s| s.code), Some(100));
    }

    #[test]
    fn test_shape_is_cloneable() {
        let shape = Shape::<Greeting>::command("hello");
        let clone = shape.clone();
        let packet = Packet::new("hello", json!({ "text": "hi" }));
        assert!(clone.matches(&packet).is_some());
    }
}
