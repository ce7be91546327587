//! Histogram building.
//!
//! A histogram of one channel counts how many samples fall in each bin,
//! where bin `i` holds values in `[i * bin_size, (i + 1) * bin_size)`.
//! On the device each sample issues one atomic increment to its bin.

use tracing::debug;

use crate::color::DeviceHsl;
use crate::device::{BufferAccess, ComputeDevice, KernelArg, NdRange};
use crate::error::{EqualiseError, Result};
use crate::kernels::KernelName;
use crate::report::{Stage, StageTiming, Staged};
use crate::ChannelParams;

/// Bin that a sample falls in.
#[inline]
pub fn bin_index(value: u16, bin_size: u32) -> usize {
    (value as u32 / bin_size) as usize
}

/// Number of bins needed to cover `0..=max_value`.
#[inline]
pub fn bin_count(max_value: u16, bin_size: u32) -> usize {
    (max_value as usize + 1).div_ceil(bin_size as usize)
}

/// Per-bin sample counts of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u32>,
}

impl Histogram {
    pub fn from_counts(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn into_counts(self) -> Vec<u32> {
        self.counts
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts; equals the channel's pixel count.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

/// Running totals of a histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeHistogram {
    counts: Vec<u32>,
}

impl CumulativeHistogram {
    pub fn from_counts(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Final element, the number of samples counted.
    pub fn total(&self) -> u32 {
        self.counts.last().copied().unwrap_or(0)
    }

    /// Check that counts never decrease.
    pub fn is_monotonic(&self) -> bool {
        self.counts.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Reject channels whose pixel count does not fit a 32-bit counter.
pub(crate) fn check_pixel_count(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| EqualiseError::TooManyPixels { count })
}

/// Build the histogram of one channel on the device.
///
/// # Arguments
///
/// * `device` - Device to run `histogramAtomic` on
/// * `channel` - Samples of one channel
/// * `params` - Validated bin size and maximum sample value
pub fn build_histogram<D: ComputeDevice>(
    device: &D,
    channel: &[u16],
    params: &ChannelParams,
) -> Result<Staged<Histogram>> {
    check_pixel_count(channel.len())?;
    let bins = params.bin_count();

    let pixels = device.upload(channel, BufferAccess::ReadOnly)?;
    let counts = device.create_buffer::<u32>(bins, BufferAccess::ReadWrite)?;
    device.fill_buffer(&counts, 0)?;

    let event = device.enqueue_kernel(
        KernelName::HistogramAtomic,
        NdRange::new(channel.len()),
        &[pixels.arg(), counts.arg(), KernelArg::Uint(params.bin_size)],
    )?;
    let histogram = Histogram::from_counts(device.download(&counts, bins)?);
    debug!(
        bins,
        pixels = channel.len(),
        elapsed_us = event.elapsed().as_micros() as u64,
        "histogram built"
    );

    Ok(Staged::new(
        histogram,
        vec![StageTiming::from_event(Stage::Histogram, &event)],
    ))
}

/// Build the histogram of the quantised lightness plane of a device HSL image.
pub fn build_lightness_histogram<D: ComputeDevice>(
    device: &D,
    hsl: &DeviceHsl,
    params: &ChannelParams,
) -> Result<Staged<Histogram>> {
    let pixel_count = check_pixel_count(hsl.pixel_count())?;
    let bins = params.bin_count();

    let counts = device.create_buffer::<u32>(bins, BufferAccess::ReadWrite)?;
    device.fill_buffer(&counts, 0)?;

    let event = device.enqueue_kernel(
        KernelName::HistogramAtomicHsl,
        NdRange::new(hsl.pixel_count()),
        &[
            hsl.buffer().arg(),
            counts.arg(),
            KernelArg::Uint(params.bin_size),
            KernelArg::Uint(params.max_value as u32),
            KernelArg::Uint(pixel_count),
        ],
    )?;
    let histogram = Histogram::from_counts(device.download(&counts, bins)?);

    Ok(Staged::new(
        histogram,
        vec![StageTiming::from_event(Stage::Histogram, &event)],
    ))
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::device::HostDevice;
    use crate::{BitDepth, EqualisationConfig};
    use proptest::prelude::*;

    proptest! {
        /// Property: every sample lands in exactly one bin.
        #[test]
        fn prop_counts_sum_to_pixel_count(
            samples in prop::collection::vec(0u16..=255, 1..2000),
            bin_size in 1u32..=256,
        ) {
            let device = HostDevice::new();
            let params = EqualisationConfig::new(bin_size).validate(BitDepth::Eight).unwrap();
            let hist = build_histogram(&device, &samples, &params).unwrap().value;
            prop_assert_eq!(hist.len(), bin_count(255, bin_size));
            prop_assert_eq!(hist.total(), samples.len() as u64);
        }
    }
}
