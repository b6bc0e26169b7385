//! Passwords and the ways the binary obtains them

use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use std::fmt;
use std::io::{self, IsTerminal, Read};
use zeroize::Zeroizing;

/// Minimum password length, in characters, accepted when encrypting.
pub const MIN_PASSWORD_CHARS: usize = 6;

/// A password held in memory that is wiped on drop.
///
/// `Debug` never prints the contents.
#[derive(Clone, Default)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Length in characters, which is what the minimum length is measured in.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Password {}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Trait for reading passwords from various sources
pub trait PasswordReader {
    /// Read a password, showing `prompt` if the source is interactive.
    fn read_password(&mut self, prompt: &str) -> Result<Password>;
}

/// Returns a fixed password (for testing)
pub struct ConstantPasswordReader {
    password: Password,
}

impl ConstantPasswordReader {
    pub fn new(password: impl Into<Password>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

impl PasswordReader for ConstantPasswordReader {
    fn read_password(&mut self, _prompt: &str) -> Result<Password> {
        Ok(self.password.clone())
    }
}

/// Reads a password from any io::Read source until EOF.
///
/// One trailing line ending is dropped so that `echo secret | qrseal ...`
/// works as expected.
pub struct ReaderPasswordReader {
    reader: Box<dyn Read>,
}

impl ReaderPasswordReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PasswordReader for ReaderPasswordReader {
    fn read_password(&mut self, _prompt: &str) -> Result<Password> {
        let mut data = Zeroizing::new(String::new());
        self.reader.read_to_string(&mut *data).map_err(|e| {
            let kind = if e.kind() == io::ErrorKind::InvalidData {
                ErrorKind::PasswordUnavailable
            } else {
                ErrorKind::Io
            };
            QrsealError::with_kind_and_source(
                ErrorCategory::User,
                kind,
                format!("error reading password: {}", e),
                e,
            )
        })?;

        let trimmed = data
            .strip_suffix("\r\n")
            .or_else(|| data.strip_suffix('\n'))
            .unwrap_or(data.as_str());
        Ok(Password::new(trimmed))
    }
}

/// Reads password from terminal with no echo
#[derive(Default)]
pub struct TerminalPasswordReader;

impl TerminalPasswordReader {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordReader for TerminalPasswordReader {
    fn read_password(&mut self, prompt: &str) -> Result<Password> {
        if !io::stdin().is_terminal() {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "cannot read password from terminal - stdin is not a terminal",
            ));
        }

        // rpassword hands back a plain String; move it straight into the wrapper.
        let password = rpassword::prompt_password(prompt).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PasswordUnavailable,
                format!("failure reading password: {}", e),
                e,
            )
        })?;

        Ok(Password::new(password))
    }
}

/// Wraps another PasswordReader and caches the result
///
/// The upstream reader is called at most once after it succeeds; later calls
/// return the cached value regardless of prompt. Used when the confirmation
/// has to come from a non-interactive source that can only be read once.
pub struct CachingPasswordReader {
    upstream: Box<dyn PasswordReader>,
    cached: Option<Password>,
}

impl CachingPasswordReader {
    pub fn new(upstream: Box<dyn PasswordReader>) -> Self {
        Self {
            upstream,
            cached: None,
        }
    }
}

impl PasswordReader for CachingPasswordReader {
    fn read_password(&mut self, prompt: &str) -> Result<Password> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }
        let password = self.upstream.read_password(prompt)?;
        self.cached = Some(password.clone());
        Ok(password)
    }
}
