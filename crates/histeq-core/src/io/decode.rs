//! Decoding through the `image` crate with EXIF orientation correction.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::{DynamicImage, ImageReader};
use tracing::debug;

use super::{DecodeError, Orientation};
use crate::buffer::{BitDepth, PixelBuffer};

/// Decode an image file held in memory.
///
/// The format is guessed from the content. Alpha is dropped, so the result
/// has one channel (gray) or three (RGB). 16-bit sources stay 16-bit and
/// floating-point sources become 16-bit RGB. EXIF orientation is applied.
///
/// # Errors
///
/// Returns `DecodeError::InvalidFormat` if the format is not recognised and
/// `DecodeError::CorruptedFile` if decoding fails.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, DecodeError> {
    let orientation = get_orientation(bytes);

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::IoError(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DecodeError::InvalidFormat);
    }

    let img = reader
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;
    debug!(
        width = img.width(),
        height = img.height(),
        color = ?img.color(),
        ?orientation,
        "decoded image"
    );

    to_pixel_buffer(apply_orientation(img, orientation))
}

/// Read the EXIF orientation, `Normal` when absent or unreadable.
pub fn get_orientation(bytes: &[u8]) -> Orientation {
    let mut cursor = Cursor::new(bytes);
    match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .map(Orientation::from)
            .unwrap_or_default(),
        Err(_) => Orientation::Normal,
    }
}

fn apply_orientation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => img.fliph(),
        Orientation::Rotate180 => img.rotate180(),
        Orientation::FlipVertical => img.flipv(),
        Orientation::Transpose => img.rotate90().fliph(),
        Orientation::Rotate90CW => img.rotate90(),
        Orientation::Transverse => img.rotate270().fliph(),
        Orientation::Rotate270CW => img.rotate270(),
    }
}

fn widen(samples: Vec<u8>) -> Vec<u16> {
    samples.into_iter().map(u16::from).collect()
}

/// Reduce a decoded image to one of the four layouts the pipeline handles.
fn to_pixel_buffer(img: DynamicImage) -> Result<PixelBuffer, DecodeError> {
    let (width, height) = (img.width(), img.height());
    let (channels, depth, interleaved) = match img {
        DynamicImage::ImageLuma8(buf) => (1, BitDepth::Eight, widen(buf.into_raw())),
        DynamicImage::ImageLumaA8(_) => (1, BitDepth::Eight, widen(img.into_luma8().into_raw())),
        DynamicImage::ImageRgb8(buf) => (3, BitDepth::Eight, widen(buf.into_raw())),
        DynamicImage::ImageRgba8(_) => (3, BitDepth::Eight, widen(img.into_rgb8().into_raw())),
        DynamicImage::ImageLuma16(buf) => (1, BitDepth::Sixteen, buf.into_raw()),
        DynamicImage::ImageLumaA16(_) => (1, BitDepth::Sixteen, img.into_luma16().into_raw()),
        DynamicImage::ImageRgb16(buf) => (3, BitDepth::Sixteen, buf.into_raw()),
        _ => (3, BitDepth::Sixteen, img.into_rgb16().into_raw()),
    };

    PixelBuffer::from_interleaved(width, height, channels, depth, &interleaved)
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))
}
