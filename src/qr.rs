//! QR transport: token to scannable image and back
//!
//! Encoding always uses error correction level H. That costs capacity (at
//! most 1273 bytes in a version 40 symbol) but survives smudged screens and
//! bad camera angles.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};
use qrcode::QrCode;
use qrcode::types::{Color, EcLevel, QrError};
use tracing::debug;

use crate::config::QrOptions;
use crate::error::{ErrorCategory, ErrorKind, QrsealError, Result};

const DARK: u8 = 0;
const LIGHT: u8 = 255;

/// A rendered QR symbol.
#[derive(Debug, Clone)]
pub struct QrImage {
    raster: GrayImage,
    modules: usize,
}

impl QrImage {
    /// Side length in pixels, quiet zone included.
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    /// Side length in modules, quiet zone excluded.
    pub fn modules(&self) -> usize {
        self.modules
    }

    pub fn as_luma(&self) -> &GrayImage {
        &self.raster
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.raster.write_to(&mut out, ImageFormat::Png).map_err(|e| {
            QrsealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::QrEncode,
                format!("failed to encode QR image as PNG: {}", e),
                e,
            )
        })?;
        Ok(out.into_inner())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QrEncoder {
    options: QrOptions,
}

impl QrEncoder {
    pub fn new(options: QrOptions) -> Self {
        Self { options }
    }

    /// Encode `data` in the smallest symbol that holds it at level H.
    pub fn encode(&self, data: &str) -> Result<QrImage> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H).map_err(
            |e| match e {
                QrError::DataTooLong => QrsealError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::QrCapacity,
                    format!(
                        "token of {} bytes is too long for a QR code at the highest error correction level",
                        data.len()
                    ),
                ),
                other => QrsealError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::QrEncode,
                    format!("QR encoding failed: {}", other),
                ),
            },
        )?;

        let modules = code.width();
        let colors = code.to_colors();
        let px = self.options.module_px.max(1);
        let quiet = self.options.quiet_zone as usize;
        let side = (modules + 2 * quiet) as u32 * px;

        let raster = GrayImage::from_fn(side, side, |x, y| {
            let mx = (x / px) as usize;
            let my = (y / px) as usize;
            let inside = (quiet..quiet + modules).contains(&mx) && (quiet..quiet + modules).contains(&my);
            let dark = inside && colors[(my - quiet) * modules + (mx - quiet)] == Color::Dark;
            Luma([if dark { DARK } else { LIGHT }])
        });

        debug!(bytes = data.len(), modules, side, "encoded QR symbol");
        Ok(QrImage { raster, modules })
    }
}

/// Decode the first readable QR symbol in a grayscale frame.
pub fn decode_luma(frame: &GrayImage) -> Result<String> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        frame.width() as usize,
        frame.height() as usize,
        |x, y| frame.get_pixel(x as u32, y as u32).0[0],
    );

    let mut unreadable = None;
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => return Ok(content),
            Err(e) => unreadable = Some(e.to_string()),
        }
    }

    Err(match unreadable {
        Some(reason) => QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::NoCodeDetected,
            format!("QR code found but could not be read: {}", reason),
        ),
        None => QrsealError::with_kind(
            ErrorCategory::User,
            ErrorKind::NoCodeDetected,
            "no QR code detected in the image",
        ),
    })
}

/// Decode a QR symbol from an encoded image (PNG or JPEG).
pub fn decode_image_bytes(bytes: &[u8]) -> Result<String> {
    let image = image::load_from_memory(bytes).map_err(|e| {
        QrsealError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::NotAnImage,
            "please upload an image file",
            e,
        )
    })?;
    decode_luma(&image.to_luma8())
}

/// Decode a QR symbol from an image file on disk.
pub fn decode_image_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        QrsealError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("failed to read from {}", path.display()),
            e,
        )
    })?;
    decode_image_bytes(&bytes)
}
