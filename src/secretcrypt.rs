//! Password-based sealing using scrypt + XSalsa20Poly1305
//!
//! The key is derived from the password with scrypt and the data is sealed
//! with a NaCl secretbox. The scrypt cost travels with the ciphertext so that
//! the cost can be raised later without breaking older tokens.
//!
//! The binary format is:
//! - log_n: 1 byte (scrypt CPU/memory cost, as a power of two)
//! - r: 1 byte (scrypt block size)
//! - p: 1 byte (scrypt parallelization)
//! - salt: 16 bytes
//! - nonce: 24 bytes
//! - sealed box: the rest (includes the 16-byte Poly1305 MAC)

use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use scrypt::{Params, scrypt};
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the scrypt cost header in bytes
const HEADER_LEN: usize = 3;

/// Length of the Poly1305 tag at the front of every sealed box
const MAC_LEN: usize = 16;

/// Length of derived key in bytes
const KEY_LEN: usize = 32;

/// Largest accepted scrypt `log_n`. 2^20 with r = 8 already needs 1 GiB.
pub const MAX_LOG_N: u8 = 20;

/// Upper bound on `r * p * 2^log_n`, the number of 128-byte blocks scrypt
/// mixes. This is the cost of `log_n = 20, r = 8, p = 1`; memory use is
/// bounded by the same product since it grows with `r * 2^log_n`.
pub const MAX_COST_BLOCKS: u64 = 8 << 20;

/// scrypt cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub log_n: u8,
    pub r: u8,
    pub p: u8,
}

impl KdfParams {
    pub const fn new(log_n: u8, r: u8, p: u8) -> Self {
        Self { log_n, r, p }
    }

    /// `r * p * 2^log_n`, saturating.
    fn cost_blocks(&self) -> u64 {
        u64::from(self.r)
            .saturating_mul(u64::from(self.p))
            .saturating_mul(1u64.checked_shl(u32::from(self.log_n)).unwrap_or(u64::MAX))
    }

    fn validate(&self) -> Result<()> {
        if self.log_n == 0 || self.log_n > MAX_LOG_N {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::BinaryFormat,
                format!(
                    "scrypt cost log_n={} outside the supported range 1..={}",
                    self.log_n, MAX_LOG_N
                ),
            ));
        }
        if self.r == 0 || self.p == 0 {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::BinaryFormat,
                "scrypt block size and parallelization must be non-zero",
            ));
        }
        if self.cost_blocks() > MAX_COST_BLOCKS {
            return Err(QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::BinaryFormat,
                format!(
                    "scrypt cost log_n={} r={} p={} exceeds the supported budget",
                    self.log_n, self.r, self.p
                ),
            ));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    /// N = 32768, r = 8, p = 1.
    fn default() -> Self {
        Self::new(15, 8, 1)
    }
}

fn derive_key(
    password: &[u8],
    salt: &[u8],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    kdf.validate()?;
    let params = Params::new(kdf.log_n, u32::from(kdf.r), u32::from(kdf.p), KEY_LEN).map_err(
        |e| {
            QrsealError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::ScryptFailure,
                format!("failed to create scrypt params: {}", e),
            )
        },
    )?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(password, salt, &params, &mut key[..]).map_err(|e| {
        QrsealError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::ScryptFailure,
            format!("scrypt key derivation failed: {}", e),
        )
    })?;

    Ok(key)
}

/// Seal plaintext with a password using a random salt and nonce.
pub fn seal(password: &[u8], plaintext: &[u8], kdf: &KdfParams) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    seal_with(password, plaintext, kdf, &salt, &nonce)
}

/// Seal plaintext with a password using the provided salt and nonce.
///
/// Only for tests that need reproducible output. Reusing a salt/nonce pair
/// with the same password breaks the secretbox guarantees; use [`seal`].
pub fn seal_with(
    password: &[u8],
    plaintext: &[u8],
    kdf: &KdfParams,
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let key = derive_key(password, salt, kdf)?;
    let cipher = XSalsa20Poly1305::new(&(*key).into());

    let sealed_box = cipher
        .encrypt(&Nonce::from(*nonce), plaintext)
        .map_err(|e| {
            QrsealError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::SecretboxFailure,
                format!("encryption failed: {}", e),
            )
        })?;

    let mut output = Vec::with_capacity(HEADER_LEN + SALT_LEN + NONCE_LEN + sealed_box.len());
    output.extend_from_slice(&[kdf.log_n, kdf.r, kdf.p]);
    output.extend_from_slice(salt);
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box);

    Ok(output)
}

fn take<'a>(input: &'a [u8], len: usize, what: &str) -> Result<(&'a [u8], &'a [u8])> {
    if input.len() < len {
        return Err(QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::TruncatedInput,
            format!("input likely truncated while reading {}", what),
        ));
    }
    Ok(input.split_at(len))
}

/// Open a sealed buffer with a password.
pub fn open(password: &[u8], sealed: &[u8]) -> Result<Vec<u8>> {
    let (header, rest) = take(sealed, HEADER_LEN, "scrypt header")?;
    let kdf = KdfParams::new(header[0], header[1], header[2]);
    // Reject a forged cost before spending any time on it.
    kdf.validate()?;

    let (salt, rest) = take(rest, SALT_LEN, "salt")?;
    let (nonce, sealed_box) = take(rest, NONCE_LEN, "nonce")?;
    if sealed_box.len() < MAC_LEN {
        return Err(QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::TruncatedInput,
            "input likely truncated while reading sealed box",
        ));
    }

    let key = derive_key(password, salt, &kdf)?;
    let cipher = XSalsa20Poly1305::new(&(*key).into());
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed_box)
        .map_err(|_| {
            QrsealError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or bad password",
            )
        })
}
