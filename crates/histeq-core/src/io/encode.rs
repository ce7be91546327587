//! Encoding to PNG, PNM and JPEG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};

use super::{EncodeError, OutputFormat};
use crate::buffer::{BitDepth, PixelBuffer};

/// Encode a pixel buffer into the given container.
///
/// # Arguments
///
/// * `image` - Gray or RGB buffer at either depth
/// * `format` - Output container; JPEG quality is clamped to 1-100
///
/// # Errors
///
/// `InvalidDimensions` for an empty image, `UnsupportedChannels` for
/// anything but 1 or 3 channels, `EncodingFailed` if the encoder rejects
/// the data.
pub fn encode(image: &PixelBuffer, format: OutputFormat) -> Result<Vec<u8>, EncodeError> {
    let img = to_dynamic(image)?;
    let mut buffer = Cursor::new(Vec::new());

    match format {
        OutputFormat::Png => img.write_to(&mut buffer, ImageFormat::Png),
        OutputFormat::Pnm => img.write_to(&mut buffer, ImageFormat::Pnm),
        OutputFormat::Jpeg { quality } => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            // JPEG is 8-bit only
            let img = match image.channels() {
                1 => DynamicImage::ImageLuma8(img.to_luma8()),
                _ => DynamicImage::ImageRgb8(img.to_rgb8()),
            };
            img.write_with_encoder(encoder)
        }
    }
    .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer.into_inner())
}

fn to_dynamic(image: &PixelBuffer) -> Result<DynamicImage, EncodeError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }

    let samples = image.to_interleaved();
    let shape_error =
        || EncodeError::EncodingFailed("sample count does not match dimensions".into());
    let narrow = |samples: Vec<u16>| samples.into_iter().map(|v| v as u8).collect::<Vec<u8>>();

    let img = match (image.channels(), image.depth()) {
        (1, BitDepth::Eight) => DynamicImage::ImageLuma8(
            GrayImage::from_raw(width, height, narrow(samples)).ok_or_else(shape_error)?,
        ),
        (3, BitDepth::Eight) => DynamicImage::ImageRgb8(
            RgbImage::from_raw(width, height, narrow(samples)).ok_or_else(shape_error)?,
        ),
        (1, BitDepth::Sixteen) => DynamicImage::ImageLuma16(
            ImageBuffer::<Luma<u16>, _>::from_raw(width, height, samples).ok_or_else(shape_error)?,
        ),
        (3, BitDepth::Sixteen) => DynamicImage::ImageRgb16(
            ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, samples).ok_or_else(shape_error)?,
        ),
        (channels, _) => return Err(EncodeError::UnsupportedChannels(channels)),
    };
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::decode;

    fn rgb8(width: u32, height: u32) -> PixelBuffer {
        let n = (width * height) as usize;
        let samples = (0..n * 3).map(|i| (i % 256) as u16).collect();
        PixelBuffer::new(width, height, 3, BitDepth::Eight, samples).unwrap()
    }

    #[test]
    fn test_png_preserves_samples() {
        let image = rgb8(4, 3);
        let bytes = encode(&image, OutputFormat::Png).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(decode(&bytes).unwrap(), image);
    }

    #[test]
    fn test_png_16_bit() {
        let image = PixelBuffer::gray(2, 1, BitDepth::Sixteen, vec![0, 40000]).unwrap();
        let back = decode(&encode(&image, OutputFormat::Png).unwrap()).unwrap();
        assert_eq!(back.depth(), BitDepth::Sixteen);
        assert_eq!(back.samples(), &[0, 40000]);
    }

    #[test]
    fn test_pnm_header() {
        let image = PixelBuffer::gray(2, 2, BitDepth::Eight, vec![1, 2, 3, 4]).unwrap();
        let bytes = encode(&image, OutputFormat::Pnm).unwrap();
        assert_eq!(&bytes[0..2], b"P5");
        assert_eq!(decode(&bytes).unwrap().samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_jpeg_markers() {
        let bytes = encode(&rgb8(16, 16), OutputFormat::Jpeg { quality: 90 }).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_jpeg_from_16_bit_is_8_bit() {
        let image = PixelBuffer::gray(8, 8, BitDepth::Sixteen, vec![65535; 64]).unwrap();
        let bytes = encode(&image, OutputFormat::Jpeg { quality: 0 }).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.depth(), BitDepth::Eight);
        assert_eq!(back.channels(), 1);
    }

    #[test]
    fn test_rejects_empty_and_odd_channels() {
        let empty = PixelBuffer::gray(0, 4, BitDepth::Eight, vec![]).unwrap();
        assert!(matches!(
            encode(&empty, OutputFormat::Png),
            Err(EncodeError::InvalidDimensions { width: 0, height: 4 })
        ));

        let two = PixelBuffer::new(1, 1, 2, BitDepth::Eight, vec![1, 2]).unwrap();
        assert!(matches!(
            encode(&two, OutputFormat::Png),
            Err(EncodeError::UnsupportedChannels(2))
        ));
    }
}
