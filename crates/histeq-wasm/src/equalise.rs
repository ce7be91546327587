//! Histogram equalisation WASM bindings.
//!
//! # Example
//!
//! ```typescript
//! import { decode_image, equalise, encode_png } from '@histeq/wasm';
//!
//! const image = decode_image(bytes);
//! const result = equalise(image, { algorithm: 'hsl', binSize: 4 });
//! console.log(result.report);
//! const png = encode_png(result.image());
//! ```

use histeq_core::{
    run, Algorithm, EqualisationConfig, EqualisationReport, EqualiseError, HostDevice, Outcome,
    PixelBuffer,
};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

use crate::types::JsImage;

/// Options object accepted by [`equalise`]; every field is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct EqualiseOptions {
    algorithm: Algorithm,
    bin_size: u32,
    group_width: Option<usize>,
}

impl Default for EqualiseOptions {
    fn default() -> Self {
        let config = EqualisationConfig::default();
        Self {
            algorithm: Algorithm::default(),
            bin_size: config.bin_size,
            group_width: config.group_width,
        }
    }
}

impl EqualiseOptions {
    fn config(&self) -> EqualisationConfig {
        EqualisationConfig {
            bin_size: self.bin_size,
            group_width: self.group_width,
        }
    }
}

/// Output of an equalisation run.
///
/// For the `compare` algorithm the image is the parallel output and the
/// mismatch count and speedup describe the comparison against the serial run.
#[wasm_bindgen]
pub struct JsEqualised {
    image: PixelBuffer,
    report: String,
    total_ms: f64,
    kernel_launches: usize,
    mismatched_samples: usize,
    speedup: Option<f64>,
}

#[wasm_bindgen]
impl JsEqualised {
    /// The equalised image (a copy).
    pub fn image(&self) -> JsImage {
        JsImage::from_buffer(self.image.clone())
    }

    /// Human-readable timing report.
    #[wasm_bindgen(getter)]
    pub fn report(&self) -> String {
        self.report.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    #[wasm_bindgen(getter)]
    pub fn kernel_launches(&self) -> usize {
        self.kernel_launches
    }

    /// Samples that differ between the serial and parallel outputs.
    #[wasm_bindgen(getter)]
    pub fn mismatched_samples(&self) -> usize {
        self.mismatched_samples
    }

    /// Serial time over parallel time; undefined unless comparing.
    #[wasm_bindgen(getter)]
    pub fn speedup(&self) -> Option<f64> {
        self.speedup
    }
}

fn summary(image: PixelBuffer, report: &EqualisationReport) -> JsEqualised {
    JsEqualised {
        image,
        report: report.to_string(),
        total_ms: report.total().as_secs_f64() * 1000.0,
        kernel_launches: report.kernel_launches(),
        mismatched_samples: 0,
        speedup: None,
    }
}

pub(crate) fn equalise_with(
    image: &PixelBuffer,
    options: &EqualiseOptions,
) -> Result<JsEqualised, EqualiseError> {
    let device = HostDevice::new();
    match run(&device, image, &options.config(), options.algorithm)? {
        Outcome::Equalised(out) => Ok(summary(out.image, &out.report)),
        Outcome::Compared(comparisons) => {
            let report = comparisons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n\n");
            let mismatched_samples = comparisons.iter().map(|c| c.mismatched_samples).sum();
            let speedup = comparisons.first().map(|c| c.speedup());

            let Some(first) = comparisons.into_iter().next() else {
                return Err(EqualiseError::EmptyImage);
            };
            let mut result = summary(first.parallel.image, &first.parallel.report);
            result.report = report;
            result.mismatched_samples = mismatched_samples;
            result.speedup = speedup;
            Ok(result)
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

#[cfg(not(target_arch = "wasm32"))]
fn log(_message: &str) {}

/// Equalise an image.
///
/// # Arguments
/// * `image` - Gray or RGB image at 8 or 16 bits
/// * `options` - `{ algorithm?: 'serial' | 'parallel' | 'hsl' | 'compare',
///   binSize?: number, groupWidth?: number }`, or undefined for defaults
///
/// # Errors
/// Returns an error for malformed options, a bin size that does not fit the
/// bit depth, an empty image, or HSL on a non-RGB image.
#[wasm_bindgen]
pub fn equalise(image: &JsImage, options: JsValue) -> Result<JsEqualised, JsValue> {
    let options: EqualiseOptions = if options.is_undefined() || options.is_null() {
        EqualiseOptions::default()
    } else {
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))?
    };

    let result =
        equalise_with(image.buffer(), &options).map_err(|e| JsValue::from_str(&e.to_string()))?;
    log(&format!(
        "histeq: {} in {:.3} ms ({} launches)",
        options.algorithm, result.total_ms, result.kernel_launches
    ));
    Ok(result)
}
