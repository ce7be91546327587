//! Image file I/O.
//!
//! Loads PNG, PNM (PGM/PPM) and JPEG files into [`PixelBuffer`]s and writes
//! them back. Alpha channels are dropped on load, so buffers are always gray
//! or RGB at 8 or 16 bits per sample.

mod decode;
mod encode;
mod types;

use std::fs;
use std::path::Path;

use tracing::info;

pub use decode::{decode, get_orientation};
pub use encode::encode;
pub use types::{DecodeError, EncodeError, Orientation, OutputFormat, DEFAULT_JPEG_QUALITY};

use crate::buffer::PixelBuffer;

/// Read and decode an image file.
pub fn load(path: impl AsRef<Path>) -> Result<PixelBuffer, DecodeError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| DecodeError::IoError(e.to_string()))?;
    let image = decode(&bytes)?;
    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        channels = image.channels(),
        bits = image.depth().bits(),
        "loaded image"
    );
    Ok(image)
}

/// Encode an image in the format implied by the path's extension and write it.
pub fn save(path: impl AsRef<Path>, image: &PixelBuffer) -> Result<(), EncodeError> {
    let path = path.as_ref();
    let format = OutputFormat::from_path(path)?;
    save_as(path, image, format)
}

/// Encode an image in an explicit format and write it.
pub fn save_as(
    path: impl AsRef<Path>,
    image: &PixelBuffer,
    format: OutputFormat,
) -> Result<(), EncodeError> {
    let path = path.as_ref();
    let bytes = encode(image, format)?;
    fs::write(path, &bytes).map_err(|e| EncodeError::IoError(e.to_string()))?;
    info!(path = %path.display(), bytes = bytes.len(), "saved image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BitDepth;

    #[test]
    fn test_save_and_load_png() {
        let dir = std::env::temp_dir().join(format!("histeq-io-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gray.png");

        let image = PixelBuffer::gray(3, 1, BitDepth::Eight, vec![0, 128, 255]).unwrap();
        save(&path, &image).unwrap();
        assert_eq!(load(&path).unwrap(), image);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load("/nonexistent/histeq/input.png"),
            Err(DecodeError::IoError(_))
        ));
    }

    #[test]
    fn test_save_unknown_extension() {
        let image = PixelBuffer::gray(1, 1, BitDepth::Eight, vec![0]).unwrap();
        assert!(matches!(
            save("out.tiff", &image),
            Err(EncodeError::UnsupportedFormat(_))
        ));
    }
}
