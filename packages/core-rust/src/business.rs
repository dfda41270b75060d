//! Business error wire encoding.
//!
//! Resolvers report expected failures by returning a [`BusinessError`]. Its
//! `Display` form is the compact JSON object `{"code":<n>,"msg":"<text>"}`,
//! which the execution engine embeds in the error message it reports. The
//! relay later finds that object anywhere inside the message and hands it to
//! the client unchanged.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pattern locating an encoded business error inside a free-text message.
///
/// `[0-9]` rather than `\d` keeps the digit class ASCII-only.
pub const BUSINESS_ERROR_PATTERN: &str = r#"\{"code":[0-9]+,"msg":".*?"\}"#;

static BUSINESS_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(BUSINESS_ERROR_PATTERN).expect("business error pattern is valid"));

/// An expected, resolver-signalled failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessError {
    pub code: u64,
    pub msg: String,
}

impl BusinessError {
    #[must_use]
    pub fn new(code: u64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }

    /// Returns the first encoded business error embedded in `message`.
    #[must_use]
    pub fn extract(message: &str) -> Option<&str> {
        BUSINESS_ERROR_RE.find(message).map(|m| m.as_str())
    }

    /// Decodes a message that is exactly one encoded business error.
    #[must_use]
    pub fn parse(message: &str) -> Option<Self> {
        serde_json::from_str(message).ok()
    }
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl std::error::Error for BusinessError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_wire_encoding() {
        let err = BusinessError::new(100, "test error");
        assert_eq!(err.to_string(), r#"{"code":100,"msg":"test error"}"#);
    }

    #[test]
    fn extract_finds_embedded_object() {
        let message = r#"graphql: resolver failed: {"code":42,"msg":"x"} (while resolving)"#;
        assert_eq!(BusinessError::extract(message), Some(r#"{"code":42,"msg":"x"}"#));
    }

    #[test]
    fn extract_returns_first_match() {
        let message = r#"{"code":1,"msg":"a"} and {"code":2,"msg":"b"}"#;
        assert_eq!(BusinessError::extract(message), Some(r#"{"code":1,"msg":"a"}"#));
    }

    #[test]
    fn extract_requires_exact_layout() {
        assert_eq!(BusinessError::extract(r#"{"code": 42, "msg": "x"}"#), None);
        assert_eq!(BusinessError::extract(r#"{"msg":"x","code":42}"#), None);
        assert_eq!(BusinessError::extract(r#"{"code":-1,"msg":"x"}"#), None);
        assert_eq!(BusinessError::extract("plain failure"), None);
    }

    #[test]
    fn extract_rejects_non_ascii_digits() {
        assert_eq!(BusinessError::extract("{\"code\":\u{0663},\"msg\":\"x\"}"), None);
    }

    #[test]
    fn parse_round_trips_display() {
        let err = BusinessError::new(7, "quota \"exceeded\"");
        assert_eq!(BusinessError::parse(&err.to_string()), Some(err));
        assert_eq!(BusinessError::parse("not json"), None);
    }
}
