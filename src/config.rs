//! Runtime settings
//!
//! There is no config file; the binary starts from [`Settings::default`] and
//! overrides fields from its flags.

use std::time::Duration;

use crate::secretcrypt::KdfParams;

/// Default QR raster scale, in pixels per module.
pub const DEFAULT_MODULE_PX: u32 = 8;

/// Light modules around the symbol. Four is the minimum the QR standard asks for.
pub const DEFAULT_QUIET_ZONE: u32 = 4;

/// Frames per second the capture loop tries to decode.
pub const DEFAULT_CAPTURE_FPS: u32 = 10;

/// How long a notice stays up before it dismisses itself.
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrOptions {
    pub module_px: u32,
    pub quiet_zone: u32,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            module_px: DEFAULT_MODULE_PX,
            quiet_zone: DEFAULT_QUIET_ZONE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub kdf: KdfParams,
    pub qr: QrOptions,
    pub capture_fps: u32,
    pub notice_ttl: Duration,
    /// File name used when the token is saved as text.
    pub token_file_name: String,
    /// File name used when the QR code is saved as an image.
    pub qr_file_name: String,
}

impl Settings {
    /// Time between two capture attempts. A zero frame rate is treated as one.
    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs(1) / self.capture_fps.max(1)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            qr: QrOptions::default(),
            capture_fps: DEFAULT_CAPTURE_FPS,
            notice_ttl: NOTICE_TTL,
            token_file_name: "encrypted-text.txt".to_owned(),
            qr_file_name: "encrypted-qr-code.png".to_owned(),
        }
    }
}
