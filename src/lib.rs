//! qrseal - Password-encrypted text carried in QR codes
//!
//! Text is sealed with scrypt + NaCl secretbox into an armored token, and the
//! token is drawn as a QR code. Decryption takes the token back from typed
//! text, an image, or a stream of camera frames.

#![forbid(unsafe_code)]

pub mod armor;
pub mod capture;
pub mod cipher;
pub mod config;
pub mod error;
pub mod export;
pub mod flow;
pub mod notice;
pub mod password;
pub mod payload;
pub mod qr;
pub mod secretcrypt;
pub mod session;
