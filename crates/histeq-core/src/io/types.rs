//! Error and format types for image I/O.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default JPEG quality used when a format is picked from a file extension.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Errors that can occur while loading an image.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not in a recognised image format.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),

    /// I/O error during file reading.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Errors that can occur while saving an image.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// Only gray and RGB buffers can be written.
    #[error("Cannot encode an image with {0} channels")]
    UnsupportedChannels(usize),

    /// The output path has no extension we can encode to.
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    /// The encoder failed
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// I/O error during file writing.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "format")]
pub enum OutputFormat {
    /// PNG, 8 or 16 bits per sample.
    Png,
    /// Binary PGM/PPM, 8 or 16 bits per sample.
    Pnm,
    /// Baseline JPEG; 16-bit images are reduced to 8 bits.
    Jpeg { quality: u8 },
}

impl OutputFormat {
    /// Pick a format from a file extension (`png`, `pnm`/`pgm`/`ppm`, `jpg`/`jpeg`).
    pub fn from_path(path: &Path) -> Result<Self, EncodeError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "png" => Ok(OutputFormat::Png),
            "pnm" | "pgm" | "ppm" => Ok(OutputFormat::Pnm),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg {
                quality: DEFAULT_JPEG_QUALITY,
            }),
            _ => Err(EncodeError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// EXIF orientation values (1-8).
/// See: https://exiftool.org/TagNames/EXIF.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Orientation {
    #[default]
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    /// Flip horizontal + rotate 270 CW.
    Transpose = 5,
    Rotate90CW = 6,
    /// Flip horizontal + rotate 90 CW.
    Transverse = 7,
    Rotate270CW = 8,
}

impl Orientation {
    /// Returns true if this orientation swaps width and height.
    #[inline]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose
                | Orientation::Rotate90CW
                | Orientation::Transverse
                | Orientation::Rotate270CW
        )
    }
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Orientation::FlipHorizontal,
            3 => Orientation::Rotate180,
            4 => Orientation::FlipVertical,
            5 => Orientation::Transpose,
            6 => Orientation::Rotate90CW,
            7 => Orientation::Transverse,
            8 => Orientation::Rotate270CW,
            _ => Orientation::Normal,
        }
    }
}
