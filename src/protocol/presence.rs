//! Presence list push.
//!
//! The server broadcasts the online-user list unsolicited as a
//! semicolon-terminated string:
//!
//! ```json
//! { "cmd": "ulist", "val": "alice;bob;" }
//! ```
//!
//! An empty list arrives as `";"`.

// ============================================================================
// Imports
// ============================================================================

use super::shape::Shape;

// ============================================================================
// Parsing
// ============================================================================

/// Parses a `ulist` payload into usernames.
///
/// `"alice;bob;"` parses to `["alice", "bob"]`; `";"` parses to `[]`.
#[must_use]
pub fn parse_ulist(raw: &str) -> Vec<String> {
    raw.split(';')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shape matching `ulist` envelopes, yielding the parsed username list.
#[must_use]
pub fn ulist_shape() -> Shape<Vec<String>> {
    Shape::new(|packet| {
        if packet.cmd != "ulist" {
            return None;
        }
        Some(parse_ulist(packet.val_str()?))
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Packet;

    use proptest::prelude::*;

    #[test]
    fn test_parse_two_users() {
        assert_eq!(parse_ulist("alice;bob;"), vec!["alice", "bob"]);
    }

    #[test]
    fn test_parse_empty_list() {
        assert_eq!(parse_ulist(";"), Vec::<String>::new());
        assert_eq!(parse_ulist(""), Vec::<String>::new());
    }

    #[test]
    fn test_parse_single_user() {
        assert_eq!(parse_ulist("alice;"), vec!["alice"]);
    }

    #[test]
    fn test_ulist_shape() {
        let packet = Packet::new("ulist", "alice;bob;");
        assert_eq!(
            ulist_shape().matches(&packet),
            Some(vec!["alice".to_string(), "bob".to_string()])
        );

        let wrong_cmd = Packet::new("direct", "alice;bob;");
        assert!(ulist_shape().matches(&wrong_cmd).is_none());

        let wrong_payload = Packet::new("ulist", 3);
        assert!(ulist_shape().matches(&wrong_payload).is_none());
    }

    proptest! {
        #[test]
        fn test_parse_never_yields_empty_names(raw in ".{0,64}") {
            for name in parse_ulist(&raw) {
                prop_assert!(!name.is_empty());
            }
        }

        #[test]
        fn test_parse_round_trips_semicolon_free_names(
            names in prop::collection::vec("[a-zA-Z0-9_]{1,12}", 0..8)
        ) {
            let mut raw = names.join(";");
            raw.push(';');
            prop_assert_eq!(parse_ulist(&raw), names);
        }
    }
}
