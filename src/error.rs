use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Internal is never a guarantee that the error was not caused by the
    /// user, only that the code cannot tell.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Where an error is reported and how a flow reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before the cipher is touched; shown next to the form.
    Validation,
    /// Encrypt or decrypt failed; shown as a notice.
    Cipher,
    /// QR encode/decode or camera failure; shown as a notice, retryable.
    Transport,
    /// Save, read, or terminal failure; logged.
    Io,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No text was given to encrypt.
    EmptyPlaintext,
    /// Encryption password is shorter than the minimum length.
    PasswordTooShort,
    /// Password and confirmation differ.
    PasswordMismatch,
    /// No ciphertext token was given to decrypt.
    EmptyToken,
    /// No password was given to decrypt with.
    EmptyPassword,
    /// The armored token is malformed (prefix or unsupported layout).
    ArmoringInvalid,
    /// Base64 decoding of the armored payload failed.
    ArmoringDecode,
    /// Token claims to be qrseal but uses a future/unsupported version.
    ArmoringFromFuture,
    /// Header fields or binary layout are invalid.
    BinaryFormat,
    /// Input ended before the expected component could be read.
    TruncatedInput,
    /// Authentication failed due to an incorrect password, tampering or
    /// corruption.
    AuthenticationFailed,
    /// The opened box does not hold UTF-8 text.
    InvalidText,
    /// Low-level scrypt key derivation failed.
    ScryptFailure,
    /// NaCl secretbox (XSalsa20Poly1305) failed to seal data.
    SecretboxFailure,
    /// The QR encoder rejected the token.
    QrEncode,
    /// The token does not fit in the largest QR symbol at the chosen level.
    QrCapacity,
    /// An image was read but no QR symbol could be decoded from it.
    NoCodeDetected,
    /// The supplied bytes are not a supported image.
    NotAnImage,
    /// The capture device could not be opened or stopped delivering frames.
    DeviceUnavailable,
    /// A capture was cancelled before anything was decoded.
    CaptureCancelled,
    /// Password could not be obtained from the configured reader.
    PasswordUnavailable,
    /// Unexpected state reached within qrseal logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

impl ErrorKind {
    pub fn class(self) -> ErrorClass {
        use ErrorKind::*;
        match self {
            EmptyPlaintext | PasswordTooShort | PasswordMismatch | EmptyToken | EmptyPassword => {
                ErrorClass::Validation
            }
            ArmoringInvalid | ArmoringDecode | ArmoringFromFuture | BinaryFormat
            | TruncatedInput | AuthenticationFailed | InvalidText | ScryptFailure
            | SecretboxFailure => ErrorClass::Cipher,
            QrEncode | QrCapacity | NoCodeDetected | NotAnImage | DeviceUnavailable
            | CaptureCancelled => ErrorClass::Transport,
            PasswordUnavailable | InternalInvariant | Io => ErrorClass::Io,
        }
    }
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct QrsealError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl QrsealError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Taxonomy bucket for this error. Errors without a kind count as Io,
    /// the bucket that is only logged.
    pub fn class(&self) -> ErrorClass {
        self.kind.map_or(ErrorClass::Io, ErrorKind::class)
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, QrsealError>;
