//! Session context shared by the encrypt and decrypt flows
//!
//! All state the flows touch lives here and is passed to them explicitly.
//! [`Session::reset`] is the only way back to the initial empty state.

use std::time::Duration;

use crate::cipher::CiphertextToken;
use crate::config::NOTICE_TTL;
use crate::error::ErrorKind;
use crate::notice::Notices;
use crate::password::Password;
use crate::payload::{DecodedPayload, FilePayload, TransportInput};
use crate::qr::QrImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Encrypt,
    Decrypt,
}

/// Form field a validation message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Plaintext,
    Password,
    Confirmation,
    Token,
}

/// An inline message next to a form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub kind: ErrorKind,
    pub message: &'static str,
}

#[derive(Debug, Clone)]
pub struct EncryptForm {
    pub input: TransportInput,
    pub password: Password,
    pub confirmation: Password,
}

impl Default for EncryptForm {
    fn default() -> Self {
        Self {
            input: TransportInput::Text(String::new()),
            password: Password::default(),
            confirmation: Password::default(),
        }
    }
}

impl EncryptForm {
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.input = TransportInput::Text(text.into());
    }

    pub fn set_file(&mut self, file: FilePayload) {
        self.input = TransportInput::File(file);
    }

    /// The part of the input a user would call "the text".
    pub fn content(&self) -> &str {
        match &self.input {
            TransportInput::Text(text) => text,
            TransportInput::File(file) => &file.content,
        }
    }
}

/// Where the token in the decrypt form came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Typed,
    Camera,
    Image,
}

#[derive(Debug, Clone, Default)]
pub struct DecryptForm {
    token: String,
    source: Option<TokenSource>,
    pub password: Password,
}

impl DecryptForm {
    /// Replace the token. Whichever source wrote last wins.
    pub fn set_token(&mut self, source: TokenSource, token: impl Into<String>) {
        self.token = token.into();
        self.source = Some(source);
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn source(&self) -> Option<TokenSource> {
        self.source
    }
}

#[derive(Debug, Clone)]
pub struct EncryptResult {
    pub token: CiphertextToken,
    /// Missing when the token was too long to draw; the text is still usable.
    pub qr: Option<QrImage>,
}

#[derive(Debug)]
pub struct Session {
    mode: Mode,
    pub encrypt: EncryptForm,
    pub decrypt: DecryptForm,
    encrypted: Option<EncryptResult>,
    decrypted: Option<DecodedPayload>,
    validation: Option<FieldError>,
    pub notices: Notices,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(NOTICE_TTL)
    }
}

impl Session {
    pub fn new(notice_ttl: Duration) -> Self {
        Self {
            mode: Mode::default(),
            encrypt: EncryptForm::default(),
            decrypt: DecryptForm::default(),
            encrypted: None,
            decrypted: None,
            validation: None,
            notices: Notices::new(notice_ttl),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch between encrypting and decrypting. Nothing carries over.
    pub fn switch_mode(&mut self, mode: Mode) {
        self.reset();
        self.mode = mode;
    }

    /// Back to the initial empty state, keeping only the current mode.
    pub fn reset(&mut self) {
        self.encrypt = EncryptForm::default();
        self.decrypt = DecryptForm::default();
        self.encrypted = None;
        self.decrypted = None;
        self.validation = None;
        self.notices.clear();
    }

    pub fn encrypted(&self) -> Option<&EncryptResult> {
        self.encrypted.as_ref()
    }

    pub fn decrypted(&self) -> Option<&DecodedPayload> {
        self.decrypted.as_ref()
    }

    pub fn validation(&self) -> Option<&FieldError> {
        self.validation.as_ref()
    }

    pub(crate) fn set_validation(&mut self, error: Option<FieldError>) {
        self.validation = error;
    }

    pub(crate) fn set_encrypted(&mut self, result: Option<EncryptResult>) {
        self.encrypted = result;
    }

    pub(crate) fn set_decrypted(&mut self, payload: Option<DecodedPayload>) {
        self.decrypted = payload;
    }

    pub fn is_pristine(&self) -> bool {
        self.encrypt.content().is_empty()
            && self.encrypt.password.as_str().is_empty()
            && self.encrypt.confirmation.as_str().is_empty()
            && self.decrypt.token().is_empty()
            && self.decrypt.source().is_none()
            && self.decrypt.password.as_str().is_empty()
            && self.encrypted.is_none()
            && self.decrypted.is_none()
            && self.validation.is_none()
            && self.notices.is_empty()
    }
}
