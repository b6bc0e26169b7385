//! Versioned text armor for sealed tokens
//!
//! Turns sealed bytes into the textual token that gets shown, saved and put
//! into QR codes. The armored form is:
//! - Free of whitespace (including newlines)
//! - Safe to embed in URLs
//! - Safe to pass unescaped in a POSIX shell
//!
//! Surrounding whitespace is ignored on unwrap, since tokens are often pasted.

use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Magic prefix for all qrseal versions
const MAGIC_PREFIX: &str = "qrseal";

/// Version 1 magic marker
const V1_MAGIC: &str = "qrseal1:";

/// Wrap bytes in armor, returning the armored string
///
/// Format: qrseal1:{base64url-no-padding}
pub fn wrap(body: &[u8]) -> String {
    format!("{}{}", V1_MAGIC, URL_SAFE_NO_PAD.encode(body))
}

/// Unwrap an armored string, returning the original bytes
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    let armored = armored.trim();

    if let Some(encoded) = armored.strip_prefix(V1_MAGIC) {
        URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringDecode,
                format!("base64 decoding failed: {}", e),
                e,
            )
        })
    } else if armored.len() < V1_MAGIC.len() && V1_MAGIC.starts_with(armored) {
        Err(QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input size smaller than magic marker; likely truncated",
        ))
    } else if armored.starts_with(MAGIC_PREFIX) {
        Err(QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringFromFuture,
            "input claims to be qrseal, but not a version we support",
        ))
    } else {
        Err(QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input unrecognized as qrseal data",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_bytes() {
        let armored = wrap(b"test");

        assert_eq!(armored, "qrseal1:dGVzdA");
        assert_eq!(unwrap(&armored).unwrap(), b"test");
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let armored = format!("  {}\r\n", wrap(b"test"));
        assert_eq!(unwrap(&armored).unwrap(), b"test");
    }

    #[test]
    fn test_truncated_input() {
        let err = unwrap("qrse").expect_err("expected truncated input error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringInvalid));
        assert!(err.to_string().contains("truncated"));

        let err = unwrap("").expect_err("expected truncated input error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringInvalid));
    }

    #[test]
    fn test_wrong_version() {
        let err = unwrap("qrseal999:...").expect_err("expected unsupported version error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringFromFuture));
    }

    #[test]
    fn test_not_qrseal() {
        let err = unwrap("U2FsdGVkX1+not/ours==").expect_err("expected non-qrseal error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringInvalid));
    }

    #[test]
    fn test_bad_base64() {
        let err = unwrap("qrseal1:bad$$").expect_err("expected base64 decode error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringDecode));
    }

    #[test]
    fn test_url_safe_without_whitespace() {
        let armored = wrap(&[0xFFu8; 100]);

        assert!(!armored.contains('+'));
        assert!(!armored.contains('/'));
        assert!(!armored.contains('='));
        assert!(!armored.chars().any(char::is_whitespace));
    }
}
