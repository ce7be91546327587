//! Image encoding WASM bindings.
//!
//! # Example
//!
//! ```typescript
//! import { encode_png, encode_jpeg } from '@histeq/wasm';
//!
//! const png = encode_png(result.image());
//! const jpeg = encode_jpeg(result.image(), 90);
//! ```

use crate::types::JsImage;
use histeq_core::io::{self, OutputFormat};
use wasm_bindgen::prelude::*;

fn encode_as(image: &JsImage, format: OutputFormat) -> Result<Vec<u8>, JsValue> {
    io::encode(image.buffer(), format).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Encode an image as PNG, keeping 16-bit samples.
#[wasm_bindgen]
pub fn encode_png(image: &JsImage) -> Result<Vec<u8>, JsValue> {
    encode_as(image, OutputFormat::Png)
}

/// Encode an image as binary PGM/PPM.
#[wasm_bindgen]
pub fn encode_pnm(image: &JsImage) -> Result<Vec<u8>, JsValue> {
    encode_as(image, OutputFormat::Pnm)
}

/// Encode an image as JPEG.
///
/// # Arguments
///
/// * `image` - Image to encode; 16-bit images are reduced to 8 bits
/// * `quality` - JPEG quality (1-100, recommended: 90)
#[wasm_bindgen]
pub fn encode_jpeg(image: &JsImage, quality: u8) -> Result<Vec<u8>, JsValue> {
    encode_as(image, OutputFormat::Jpeg { quality })
}


/// WASM-specific tests that require JsValue.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use histeq_core::{BitDepth, PixelBuffer};
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn gray() -> JsImage {
        JsImage::from_buffer(PixelBuffer::gray(8, 8, BitDepth::Eight, vec![128; 64]).unwrap())
    }

    #[wasm_bindgen_test]
    fn test_encode_jpeg_markers() {
        let jpeg = encode_jpeg(&gray(), 90).unwrap();
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[wasm_bindgen_test]
    fn test_encode_pnm_header() {
        let pnm = encode_pnm(&gray()).unwrap();
        assert_eq!(&pnm[0..2], b"P5");
    }

    #[wasm_bindgen_test]
    fn test_encode_png_signature() {
        let png = encode_png(&gray()).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
