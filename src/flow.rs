//! Encrypt and decrypt flows
//!
//! A flow validates the form in a [`Session`], calls the cipher, and routes
//! the result back into the session. Nothing escapes a flow as an error:
//! validation problems become an inline [`FieldError`], everything else a
//! notice.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::capture::{CAMERA_FAILED, CaptureOutcome};
use crate::cipher::{Cipher, CiphertextToken, DECRYPT_FAILED};
use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use crate::password::MIN_PASSWORD_CHARS;
use crate::payload;
use crate::qr::{self, QrEncoder};
use crate::session::{
    DecryptForm, EncryptForm, EncryptResult, Field, FieldError, Session, TokenSource,
};

pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters long";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match";
pub const EMPTY_PLAINTEXT: &str = "Please enter text to encrypt";
pub const EMPTY_TOKEN: &str = "Please enter encrypted text";
pub const EMPTY_PASSWORD: &str = "Please enter the decryption password";
pub const NOT_AN_IMAGE: &str = "Please upload an image file";
pub const NO_CODE_IN_IMAGE: &str = "Could not detect QR code in the image. Please try a different image or enter the encrypted text manually.";
pub const IMAGE_FAILED: &str = "Failed to process the QR code image";
pub const ENCRYPT_FAILED: &str = "Failed to encrypt data";
pub const ENCRYPTED: &str = "Text encrypted successfully!";
pub const DECRYPTED: &str = "Text decrypted successfully!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// The result is in the session.
    Completed,
    /// Validation failed; see [`Session::validation`]. The cipher was not called.
    Rejected,
    /// The cipher failed; see the error notice.
    Failed,
}

impl From<FieldError> for QrsealError {
    fn from(error: FieldError) -> Self {
        QrsealError::with_kind(ErrorCategory::User, error.kind, error.message)
    }
}

fn field_error(field: Field, kind: ErrorKind, message: &'static str) -> FieldError {
    FieldError {
        field,
        kind,
        message,
    }
}

/// Checks run before encrypting, in the order the form shows them.
pub fn validate_encrypt(form: &EncryptForm) -> std::result::Result<(), FieldError> {
    if form.password.char_len() < MIN_PASSWORD_CHARS {
        return Err(field_error(
            Field::Password,
            ErrorKind::PasswordTooShort,
            PASSWORD_TOO_SHORT,
        ));
    }
    if form.password != form.confirmation {
        return Err(field_error(
            Field::Confirmation,
            ErrorKind::PasswordMismatch,
            PASSWORD_MISMATCH,
        ));
    }
    if form.content().trim().is_empty() {
        return Err(field_error(
            Field::Plaintext,
            ErrorKind::EmptyPlaintext,
            EMPTY_PLAINTEXT,
        ));
    }
    Ok(())
}

/// Checks run before decrypting. The password only has to be present; a
/// wrong one is the cipher's problem.
pub fn validate_decrypt(form: &DecryptForm) -> std::result::Result<(), FieldError> {
    if form.token().trim().is_empty() {
        return Err(field_error(Field::Token, ErrorKind::EmptyToken, EMPTY_TOKEN));
    }
    if form.password.is_blank() {
        return Err(field_error(
            Field::Password,
            ErrorKind::EmptyPassword,
            EMPTY_PASSWORD,
        ));
    }
    Ok(())
}

pub struct EncryptFlow {
    cipher: Arc<dyn Cipher>,
    encoder: QrEncoder,
}

impl EncryptFlow {
    pub fn new(cipher: Arc<dyn Cipher>, encoder: QrEncoder) -> Self {
        Self { cipher, encoder }
    }

    pub fn run(&self, session: &mut Session) -> FlowStatus {
        session.set_validation(None);
        session.set_encrypted(None);
        session.notices.clear();

        if let Err(invalid) = validate_encrypt(&session.encrypt) {
            debug!(field = ?invalid.field, kind = ?invalid.kind, "encrypt form rejected");
            session.set_validation(Some(invalid));
            return FlowStatus::Rejected;
        }

        let plaintext = payload::encode_for_transport(&session.encrypt.input);
        let token = match self.cipher.encrypt(&plaintext, &session.encrypt.password) {
            Ok(token) => token,
            Err(e) => {
                warn!(kind = ?e.kind, error = %e, "encryption failed");
                session.notices.error(ENCRYPT_FAILED);
                return FlowStatus::Failed;
            }
        };

        // The token is usable as text even when it cannot be drawn.
        let qr = match self.encoder.encode(token.as_str()) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(kind = ?e.kind, token_len = token.len(), "token not drawable as QR code");
                session.notices.error(e.to_string());
                None
            }
        };

        debug!(
            plaintext_len = plaintext.len(),
            token_len = token.len(),
            has_qr = qr.is_some(),
            "encrypted"
        );
        session.set_encrypted(Some(EncryptResult { token, qr }));
        session.notices.success(ENCRYPTED);
        FlowStatus::Completed
    }
}

pub struct DecryptFlow {
    cipher: Arc<dyn Cipher>,
}

impl DecryptFlow {
    pub fn new(cipher: Arc<dyn Cipher>) -> Self {
        Self { cipher }
    }

    /// Fill the token field from an uploaded image. On failure the field is
    /// left alone and a notice is raised.
    pub fn load_image_bytes(session: &mut Session, bytes: &[u8]) -> bool {
        Self::load_decoded(session, qr::decode_image_bytes(bytes))
    }

    pub fn load_image_file(session: &mut Session, path: &Path) -> bool {
        Self::load_decoded(session, qr::decode_image_file(path))
    }

    fn load_decoded(session: &mut Session, decoded: Result<String>) -> bool {
        match decoded {
            Ok(token) => {
                session.decrypt.set_token(TokenSource::Image, token);
                session.notices.clear();
                true
            }
            Err(e) => {
                warn!(kind = ?e.kind, error = %e, "could not read QR image");
                let message = match e.kind {
                    Some(ErrorKind::NotAnImage) => NOT_AN_IMAGE,
                    Some(ErrorKind::NoCodeDetected) => NO_CODE_IN_IMAGE,
                    _ => IMAGE_FAILED,
                };
                session.notices.error(message);
                false
            }
        }
    }

    /// Fill the token field from a finished camera capture.
    pub fn accept_capture(session: &mut Session, outcome: CaptureOutcome) -> bool {
        match outcome {
            CaptureOutcome::Decoded(token) => {
                session.decrypt.set_token(TokenSource::Camera, token);
                true
            }
            CaptureOutcome::Cancelled => false,
            CaptureOutcome::DeviceError(e) => {
                warn!(kind = ?e.kind, error = %e, "camera capture failed");
                session.notices.error(CAMERA_FAILED);
                false
            }
        }
    }

    pub fn run(&self, session: &mut Session) -> FlowStatus {
        session.set_validation(None);
        session.set_decrypted(None);
        session.notices.clear();

        if let Err(invalid) = validate_decrypt(&session.decrypt) {
            debug!(field = ?invalid.field, kind = ?invalid.kind, "decrypt form rejected");
            session.set_validation(Some(invalid));
            return FlowStatus::Rejected;
        }

        let token = CiphertextToken::new(session.decrypt.token().trim());
        match self.cipher.decrypt(&token, &session.decrypt.password) {
            Ok(plaintext) => {
                let decoded = payload::decode_from_transport(&plaintext);
                debug!(
                    source = ?session.decrypt.source(),
                    is_file = decoded.is_file(),
                    "decrypted"
                );
                session.set_decrypted(Some(decoded));
                session.notices.success(DECRYPTED);
                FlowStatus::Completed
            }
            Err(e) => {
                debug!(kind = ?e.kind, "decryption failed");
                session.notices.error(DECRYPT_FAILED);
                FlowStatus::Failed
            }
        }
    }
}
