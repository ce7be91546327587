//! WASM-compatible wrapper types for image data.
//!
//! JavaScript sees pixels interleaved (`r g b r g b ...`), while the core keeps
//! them channel-major. The conversion happens at this boundary.

use histeq_core::{BitDepth, PixelBuffer};
use wasm_bindgen::prelude::*;

/// An image held in WASM memory.
///
/// Samples are 8 or 16 bits; `samples()` returns them as a `Uint16Array` at
/// their native depth, `pixels()` as an 8-bit `Uint8Array` for display.
///
/// The `free()` method can be called to explicitly release WASM memory, but
/// wasm-bindgen's finalizer will handle cleanup automatically.
#[wasm_bindgen]
pub struct JsImage {
    inner: PixelBuffer,
}

#[wasm_bindgen]
impl JsImage {
    /// Create an image from interleaved samples.
    ///
    /// # Arguments
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    /// * `channels` - 1 (gray) or 3 (RGB)
    /// * `bits` - 8 or 16
    /// * `samples` - Interleaved samples, `width * height * channels` of them
    #[wasm_bindgen(constructor)]
    pub fn new(
        width: u32,
        height: u32,
        channels: usize,
        bits: u8,
        samples: Vec<u16>,
    ) -> Result<JsImage, JsValue> {
        let depth = depth_from_bits(bits)
            .ok_or_else(|| JsValue::from_str(&format!("Unsupported bit depth: {bits}")))?;
        PixelBuffer::from_interleaved(width, height, channels, depth, &samples)
            .map(JsImage::from_buffer)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Create an 8-bit RGB image from canvas-style RGBA bytes, dropping alpha.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<JsImage, JsValue> {
        let samples: Vec<u16> = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .map(u16::from)
            .collect();
        PixelBuffer::from_interleaved(width, height, 3, BitDepth::Eight, &samples)
            .map(JsImage::from_buffer)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    /// Number of channels: 1 for gray, 3 for RGB.
    #[wasm_bindgen(getter)]
    pub fn channels(&self) -> usize {
        self.inner.channels()
    }

    /// Bits per sample, 8 or 16.
    #[wasm_bindgen(getter)]
    pub fn bits(&self) -> u8 {
        self.inner.depth().bits()
    }

    /// Interleaved samples at the image's native depth.
    pub fn samples(&self) -> Vec<u16> {
        self.inner.to_interleaved()
    }

    /// Interleaved 8-bit samples. 16-bit images keep their high byte.
    pub fn pixels(&self) -> Vec<u8> {
        let shift = self.inner.depth().bits() - 8;
        self.inner
            .to_interleaved()
            .into_iter()
            .map(|v| (v >> shift) as u8)
            .collect()
    }

    /// Explicitly free WASM memory.
    pub fn free(self) {}
}

impl JsImage {
    pub(crate) fn from_buffer(inner: PixelBuffer) -> Self {
        Self { inner }
    }

    pub(crate) fn buffer(&self) -> &PixelBuffer {
        &self.inner
    }
}

/// Map a bit count to a depth; only 8 and 16 are supported.
pub(crate) fn depth_from_bits(bits: u8) -> Option<BitDepth> {
    match bits {
        8 => Some(BitDepth::Eight),
        16 => Some(BitDepth::Sixteen),
        _ => None,
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_new_rejects_bad_depth() {
        assert!(JsImage::new(1, 1, 1, 12, vec![0]).is_err());
    }

    #[wasm_bindgen_test]
    fn test_new_rejects_shape_mismatch() {
        assert!(JsImage::new(2, 2, 1, 8, vec![0; 3]).is_err());
    }

    #[wasm_bindgen_test]
    fn test_from_rgba_drops_alpha() {
        let img = JsImage::from_rgba(1, 1, &[9, 8, 7, 255]).unwrap();
        assert_eq!(img.samples(), vec![9, 8, 7]);
    }
}
