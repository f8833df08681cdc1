//! Server status codes.
//!
//! The server reports request outcomes and protocol-level complaints as
//! `statuscode` envelopes whose payload is a string of the form
//! `"E:101 | Syntax"` or `"I:011 | Invalid Password"`.
//!
//! `E:` codes are always errors. `I:` codes are informational except for
//! the auth-rejection family, which the server delivers with an `I:`
//! prefix but which must fail the request that triggered them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// `E:101 | Syntax` - the server could not parse a frame.
///
/// While unauthenticated, this is also the cue that the server expects a
/// credential handshake (it does not proactively prompt for auth).
pub const SYNTAX_ERROR_CODE: u16 = 101;

/// `I:` codes that reject a request despite the informational prefix:
/// invalid password, invalid token, account deleted, account banned,
/// account locked.
const REJECTING_INFO_CODES: &[u16] = &[11, 12, 13, 14, 16];

// ============================================================================
// StatusKind
// ============================================================================

/// Prefix class of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// `E:` - an error.
    Error,
    /// `I:` - informational.
    Info,
}

// ============================================================================
// StatusCode
// ============================================================================

/// A parsed `statuscode` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCode {
    /// Prefix class.
    pub kind: StatusKind,

    /// Numeric code.
    pub code: u16,

    /// Human-readable message, if the server sent one.
    pub message: String,

    /// The payload exactly as received, for caller-specific handling.
    pub raw: String,
}

impl StatusCode {
    /// Parses a `statuscode` payload string.
    ///
    /// Accepts `"E:NNN | message"`, `"I:NNN | message"` and the bare
    /// `"E:NNN"` / `"I:NNN"` forms. Anything else yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, message) = match raw.split_once('|') {
            Some((head, message)) => (head.trim(), message.trim()),
            None => (raw.trim(), ""),
        };

        let (prefix, digits) = head.split_once(':')?;
        let kind = match prefix {
            "E" => StatusKind::Error,
            "I" => StatusKind::Info,
            _ => return None,
        };
        let code = digits.trim().parse().ok()?;

        Some(Self {
            kind,
            code,
            message: message.to_string(),
            raw: raw.to_string(),
        })
    }

    /// Returns `true` if this code fails the request that triggered it.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        match self.kind {
            StatusKind::Error => true,
            StatusKind::Info => REJECTING_INFO_CODES.contains(&self.code),
        }
    }

    /// Returns `true` for the server's syntax/protocol complaint.
    #[inline]
    #[must_use]
    pub fn is_syntax_error(&self) -> bool {
        self.kind == StatusKind::Error && self.code == SYNTAX_ERROR_CODE
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_code() {
        let status = StatusCode::parse("E:101 | Syntax").expect("parse");
        assert_eq!(status.kind, StatusKind::Error);
        assert_eq!(status.code, 101);
        assert_eq!(status.message, "Syntax");
        assert!(status.is_error());
        assert!(status.is_syntax_error());
    }

    #[test]
    fn test_parse_informational_code() {
        let status = StatusCode::parse("I:100 | OK").expect("parse");
        assert_eq!(status.kind, StatusKind::Info);
        assert_eq!(status.code, 100);
        assert!(!status.is_error());
        assert!(!status.is_syntax_error());
    }

    #[test]
    fn test_rejecting_info_codes_are_errors() {
        let invalid_password = StatusCode::parse("I:011 | Invalid Password").expect("parse");
        assert!(invalid_password.is_error());

        let invalid_token = StatusCode::parse("I:012 | Invalid Token").expect("parse");
        assert!(invalid_token.is_error());
    }

    #[test]
    fn test_parse_without_message() {
        let status = StatusCode::parse("E:104").expect("parse");
        assert_eq!(status.code, 104);
        assert_eq!(status.message, "");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(StatusCode::parse("hello").is_none());
        assert!(StatusCode::parse("X:100 | ?").is_none());
        assert!(StatusCode::parse("E:abc | ?").is_none());
        assert!(StatusCode::parse("").is_none());
    }

    #[test]
    fn test_display_preserves_raw() {
        let status = StatusCode::parse("I:011 | Invalid Password").expect("parse");
        assert_eq!(status.to_string(), "I:011 | Invalid Password");
    }
}
