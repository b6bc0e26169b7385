//! Text-in, token-out cipher adapter
//!
//! Everything outside this module treats a [`CiphertextToken`] as an opaque
//! string. Only [`Cipher`] implementations look inside it.

use std::fmt;

use crate::armor;
use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use crate::password::Password;
use crate::secretcrypt::{self, KdfParams};

/// Message shown for every decrypt failure. A wrong password and a damaged
/// token are reported the same way; the error kind still tells them apart.
pub const DECRYPT_FAILED: &str = "failed to decrypt data: incorrect password or corrupted data";

/// Context put on every encrypt failure. The flow shows its own notice.
pub const ENCRYPT_FAILED_CONTEXT: &str = "failed to encrypt data";

/// Opaque encrypted text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CiphertextToken(String);

impl CiphertextToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CiphertextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextToken({} bytes)", self.0.len())
    }
}

impl fmt::Display for CiphertextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CiphertextToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CiphertextToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Password-based symmetric encryption of text.
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext`. Two calls with the same inputs need not produce
    /// the same token, but each token decrypts on its own.
    fn encrypt(&self, plaintext: &str, password: &Password) -> Result<CiphertextToken>;

    /// Decrypt `token`. Fails rather than returning garbage when the password
    /// is wrong or the token is damaged.
    fn decrypt(&self, token: &CiphertextToken, password: &Password) -> Result<String>;
}

/// scrypt + secretbox, armored as `qrseal1:...`.
#[derive(Debug, Clone, Default)]
pub struct SecretboxCipher {
    kdf: KdfParams,
}

impl SecretboxCipher {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }
}

impl Cipher for SecretboxCipher {
    fn encrypt(&self, plaintext: &str, password: &Password) -> Result<CiphertextToken> {
        let sealed = secretcrypt::seal(password.as_bytes(), plaintext.as_bytes(), &self.kdf)
            .map_err(|e| e.with_context(ENCRYPT_FAILED_CONTEXT))?;
        Ok(CiphertextToken(armor::wrap(&sealed)))
    }

    fn decrypt(&self, token: &CiphertextToken, password: &Password) -> Result<String> {
        let sealed = armor::unwrap(token.as_str()).map_err(|e| e.with_context(DECRYPT_FAILED))?;
        let plaintext = secretcrypt::open(password.as_bytes(), &sealed)
            .map_err(|e| e.with_context(DECRYPT_FAILED))?;
        String::from_utf8(plaintext).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::InvalidText,
                "decrypted data is not valid UTF-8 text",
                e,
            )
            .with_context(DECRYPT_FAILED)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cheap() -> SecretboxCipher {
        SecretboxCipher::new(KdfParams::new(4, 8, 1))
    }

    #[test]
    fn test_roundtrip() {
        let cipher = cheap();
        let password = Password::new("secret1");

        let token = cipher.encrypt("hello world", &password).unwrap();
        assert!(!token.is_empty());
        assert_ne!(token.as_str(), "hello world");
        assert!(token.as_str().starts_with("qrseal1:"));

        assert_eq!(cipher.decrypt(&token, &password).unwrap(), "hello world");
    }

    #[test]
    fn test_same_input_different_tokens() {
        let cipher = cheap();
        let password = Password::new("secret1");

        let t1 = cipher.encrypt("hello", &password).unwrap();
        let t2 = cipher.encrypt("hello", &password).unwrap();

        assert_ne!(t1, t2);
        assert_eq!(cipher.decrypt(&t1, &password).unwrap(), "hello");
        assert_eq!(cipher.decrypt(&t2, &password).unwrap(), "hello");
    }

    #[test]
    fn test_wrong_password_and_corruption_share_message() {
        let cipher = cheap();
        let token = cipher.encrypt("hello world", &Password::new("secret1")).unwrap();

        let wrong = cipher
            .decrypt(&token, &Password::new("wrong12"))
            .expect_err("expected wrong password to fail");
        let garbage = cipher
            .decrypt(&CiphertextToken::new("not a token"), &Password::new("secret1"))
            .expect_err("expected garbage to fail");

        assert_eq!(wrong.to_string(), DECRYPT_FAILED);
        assert_eq!(garbage.to_string(), DECRYPT_FAILED);
        assert_eq!(wrong.kind, Some(ErrorKind::AuthenticationFailed));
        assert_eq!(garbage.kind, Some(ErrorKind::ArmoringInvalid));
    }

    #[test]
    fn test_non_utf8_plaintext_is_a_decrypt_failure() {
        let kdf = KdfParams::new(4, 8, 1);
        let sealed = secretcrypt::seal(b"secret1", &[0xff, 0xfe, 0xfd], &kdf).unwrap();
        let token = CiphertextToken::new(armor::wrap(&sealed));

        let err = SecretboxCipher::new(kdf)
            .decrypt(&token, &Password::new("secret1"))
            .expect_err("expected invalid text");
        assert_eq!(err.kind, Some(ErrorKind::InvalidText));
        assert_eq!(err.to_string(), DECRYPT_FAILED);
    }

    #[test]
    fn test_forged_cost_header_fails_fast() {
        // Valid layout, but r = 8 and p = 255 at log_n = 18.
        let mut sealed = vec![18, 8, 255];
        sealed.extend_from_slice(&[0u8; 16 + 24 + 16]);
        let token = CiphertextToken::new(armor::wrap(&sealed));

        let err = cheap()
            .decrypt(&token, &Password::new("secret1"))
            .expect_err("expected cost rejection");
        assert_eq!(err.kind, Some(ErrorKind::BinaryFormat));
        assert_eq!(err.to_string(), DECRYPT_FAILED);
    }

    #[test]
    fn test_encrypt_failure_message() {
        let cipher = SecretboxCipher::new(KdfParams::new(0, 8, 1));
        let err = cipher
            .encrypt("hello", &Password::new("secret1"))
            .expect_err("expected bad cost to fail");
        assert_eq!(err.to_string(), ENCRYPT_FAILED_CONTEXT);
    }

    #[test]
    fn test_debug_hides_token() {
        let token = CiphertextToken::new("qrseal1:abcdef");
        assert_eq!(format!("{:?}", token), "CiphertextToken(14 bytes)");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_roundtrip(plaintext in ".*", password in ".{6,24}") {
            let cipher = cheap();
            let password = Password::new(password);
            let token = cipher.encrypt(&plaintext, &password).unwrap();
            prop_assert_eq!(cipher.decrypt(&token, &password).unwrap(), plaintext);
        }

        #[test]
        fn prop_other_password_fails(
            plaintext in ".*",
            p1 in "[a-z]{6,12}",
            p2 in "[A-Z]{6,12}",
        ) {
            let cipher = cheap();
            let token = cipher.encrypt(&plaintext, &Password::new(p1)).unwrap();
            let err = cipher.decrypt(&token, &Password::new(p2)).unwrap_err();
            prop_assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        }
    }
}
