//! histeq WASM - WebAssembly bindings for histogram equalisation
//!
//! This crate exposes the histeq-core pipeline to JavaScript/TypeScript
//! applications: decode an image, equalise it with any of the algorithms,
//! inspect histograms, and encode the result.
//!
//! # Module Structure
//!
//! - `types` - WASM-compatible wrapper for pixel buffers
//! - `decode` - Image decoding bindings (PNG, PNM, JPEG)
//! - `encode` - Image encoding bindings
//! - `equalise` - Equalisation with timing report
//! - `histogram` - Per-channel histogram and cumulative histogram
//!
//! # Usage
//!
//! ```typescript
//! import init, { decode_image, equalise, encode_png } from '@histeq/wasm';
//!
//! await init();
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! const image = decode_image(bytes);
//! const result = equalise(image, { algorithm: 'parallel', binSize: 1 });
//! const png = encode_png(result.image());
//! ```
//!
//! Kernels run on the calling thread in the browser; rayon falls back to
//! sequential execution where threads are unavailable.

use wasm_bindgen::prelude::*;

mod decode;
mod encode;
mod equalise;
mod histogram;
mod types;

pub use decode::{decode_image, get_orientation};
pub use encode::{encode_jpeg, encode_png, encode_pnm};
pub use equalise::{equalise, JsEqualised};
pub use histogram::{compute_histogram, JsHistogram};
pub use types::JsImage;

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Names of the algorithms accepted by [`equalise`].
#[wasm_bindgen]
pub fn algorithms() -> Vec<String> {
    ["serial", "parallel", "hsl", "compare"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
