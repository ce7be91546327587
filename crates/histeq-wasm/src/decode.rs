//! Image decoding WASM bindings.
//!
//! # Example
//!
//! ```typescript
//! import { decode_image } from '@histeq/wasm';
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! const image = decode_image(bytes);
//! console.log(`Decoded ${image.width}x${image.height}, ${image.bits} bits`);
//! ```

use crate::types::JsImage;
use histeq_core::io;
use wasm_bindgen::prelude::*;

/// Decode a PNG, PNM or JPEG file from bytes.
///
/// EXIF orientation is applied and alpha is dropped.
///
/// # Errors
///
/// Returns an error if the format is not recognised or the data is corrupt.
#[wasm_bindgen]
pub fn decode_image(bytes: &[u8]) -> Result<JsImage, JsValue> {
    io::decode(bytes)
        .map(JsImage::from_buffer)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// EXIF orientation (1-8) of an encoded image, 1 when absent.
#[wasm_bindgen]
pub fn get_orientation(bytes: &[u8]) -> u8 {
    io::get_orientation(bytes) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_of_plain_pnm() {
        assert_eq!(get_orientation(b"P5\n1 1\n255\n\x00"), 1);
    }

    #[test]
    fn test_decode_core_path() {
        let buffer = io::decode(b"P5\n2 1\n255\n\x01\x02").unwrap();
        let img = JsImage::from_buffer(buffer);
        assert_eq!(img.channels(), 1);
        assert_eq!(img.samples(), vec![1, 2]);
    }
}

/// WASM-specific tests that require JsValue.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_decode_image_invalid() {
        assert!(decode_image(&[0, 1, 2, 3]).is_err());
    }

    #[wasm_bindgen_test]
    fn test_decode_image_pnm() {
        let img = decode_image(b"P6\n1 1\n255\n\x0a\x0b\x0c").unwrap();
        assert_eq!(img.channels(), 3);
        assert_eq!(img.samples(), vec![10, 11, 12]);
    }
}
