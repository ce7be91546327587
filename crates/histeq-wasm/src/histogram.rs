//! Histogram WASM bindings.
//!
//! Exposes the device histogram and its cumulative scan for one channel, so
//! JavaScript can plot the distribution before and after equalisation.

use histeq_core::histogram::build_histogram;
use histeq_core::scan::cumulative_histogram;
use histeq_core::{EqualisationConfig, EqualiseError, HostDevice};
use wasm_bindgen::prelude::*;

use crate::types::JsImage;

/// Histogram and cumulative histogram of one channel.
#[wasm_bindgen]
pub struct JsHistogram {
    counts: Vec<u32>,
    cumulative: Vec<u32>,
    bin_size: u32,
}

#[wasm_bindgen]
impl JsHistogram {
    /// Per-bin counts.
    pub fn counts(&self) -> Vec<u32> {
        self.counts.clone()
    }

    /// Running sum of the counts.
    pub fn cumulative(&self) -> Vec<u32> {
        self.cumulative.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn bin_size(&self) -> u32 {
        self.bin_size
    }

    /// Number of bins.
    #[wasm_bindgen(getter)]
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Largest bin count, for normalising a plot.
    #[wasm_bindgen(getter)]
    pub fn max_count(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Number of samples counted.
    #[wasm_bindgen(getter)]
    pub fn total(&self) -> u32 {
        self.cumulative.last().copied().unwrap_or(0)
    }
}

fn histogram_of(
    image: &JsImage,
    channel: usize,
    bin_size: u32,
) -> Result<JsHistogram, EqualiseError> {
    let buffer = image.buffer();
    if channel >= buffer.channels() {
        return Err(EqualiseError::UnsupportedChannelCount(buffer.channels()));
    }
    if buffer.is_empty() {
        return Err(EqualiseError::EmptyImage);
    }
    let params = EqualisationConfig::new(bin_size).validate(buffer.depth())?;

    let device = HostDevice::new();
    let histogram = build_histogram(&device, buffer.channel(channel), &params)?.value;
    let cumulative = cumulative_histogram(&device, &histogram, None)?.value;
    Ok(JsHistogram {
        counts: histogram.into_counts(),
        cumulative: cumulative.counts().to_vec(),
        bin_size,
    })
}

/// Compute the histogram of one channel.
///
/// # Arguments
/// * `image` - Source image
/// * `channel` - Channel index (0 for gray, 0-2 for RGB)
/// * `bin_size` - Width of a bin in sample values
///
/// # Example (TypeScript)
/// ```typescript
/// const hist = compute_histogram(image, 0, 1);
/// const bins = hist.counts();      // Uint32Array
/// const cdf = hist.cumulative();   // Uint32Array, last entry == pixel count
/// hist.free();
/// ```
#[wasm_bindgen]
pub fn compute_histogram(
    image: &JsImage,
    channel: usize,
    bin_size: u32,
) -> Result<JsHistogram, JsValue> {
    histogram_of(image, channel, bin_size).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use histeq_core::{BitDepth, PixelBuffer};

    fn image(samples: Vec<u16>) -> JsImage {
        let width = samples.len() as u32;
        JsImage::from_buffer(PixelBuffer::gray(width, 1, BitDepth::Eight, samples).unwrap())
    }

    #[test]
    fn test_histogram_counts() {
        let hist = histogram_of(&image(vec![10, 10, 20, 30]), 0, 1).unwrap();
        assert_eq!(hist.bins(), 256);
        assert_eq!(hist.counts()[10], 2);
        assert_eq!(hist.max_count(), 2);
        assert_eq!(hist.cumulative()[20], 3);
        assert_eq!(hist.total(), 4);
    }

    #[test]
    fn test_histogram_bin_size() {
        let hist = histogram_of(&image(vec![0, 1, 2, 255]), 0, 2).unwrap();
        assert_eq!(hist.bins(), 128);
        assert_eq!(hist.counts()[0], 2);
        assert_eq!(hist.counts()[1], 1);
        assert_eq!(hist.counts()[127], 1);
    }

    #[test]
    fn test_histogram_rejects_bad_input() {
        assert!(matches!(
            histogram_of(&image(vec![1]), 1, 1),
            Err(EqualiseError::UnsupportedChannelCount(1))
        ));
        assert!(matches!(
            histogram_of(&image(vec![1]), 0, 0),
            Err(EqualiseError::InvalidBinSize { .. })
        ));
    }
}
