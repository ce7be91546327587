//! `histogramAtomic` and `histogramAtomicHsl`.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use super::{bad_argument, KernelName, WorkRange};
use crate::color::lightness_level;
use crate::error::DeviceError;
use crate::histogram::bin_index;

fn counters(bins: &[u32]) -> Vec<AtomicU32> {
    bins.iter().map(|&count| AtomicU32::new(count)).collect()
}

fn store(bins: &mut [u32], counters: Vec<AtomicU32>) {
    for (bin, counter) in bins.iter_mut().zip(counters) {
        *bin = counter.into_inner();
    }
}

fn bump(counters: &[AtomicU32], bin: usize) -> Result<(), DeviceError> {
    match counters.get(bin) {
        Some(counter) => {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        None => Err(DeviceError::OutOfRange {
            start: bin,
            end: bin + 1,
            len: counters.len(),
        }),
    }
}

/// Each work item increments the bin of its pixel.
pub(super) fn histogram_atomic(
    range: &WorkRange,
    pixels: &[u16],
    bins: &mut [u32],
    bin_size: u32,
) -> Result<(), DeviceError> {
    if bin_size == 0 {
        return Err(bad_argument(KernelName::HistogramAtomic, 2, "bin size is zero"));
    }
    range.check_within(pixels.len())?;

    let counters = counters(bins);
    pixels[range.ids()]
        .par_iter()
        .try_for_each(|&value| bump(&counters, bin_index(value, bin_size)))?;
    store(bins, counters);
    Ok(())
}

/// Histogram of the lightness plane of an HSL buffer.
///
/// The buffer holds `pixel_count` hues, then saturations, then lightnesses.
pub(super) fn histogram_atomic_hsl(
    range: &WorkRange,
    hsl: &[f32],
    bins: &mut [u32],
    bin_size: u32,
    max_value: u32,
    pixel_count: u32,
) -> Result<(), DeviceError> {
    let kernel = KernelName::HistogramAtomicHsl;
    if bin_size == 0 {
        return Err(bad_argument(kernel, 2, "bin size is zero"));
    }
    let max_value = u16::try_from(max_value)
        .map_err(|_| bad_argument(kernel, 3, "max value exceeds 16 bits"))?;
    let n = pixel_count as usize;
    if hsl.len() < 3 * n {
        return Err(DeviceError::OutOfRange {
            start: 0,
            end: 3 * n,
            len: hsl.len(),
        });
    }
    range.check_within(n)?;

    let lightness = &hsl[2 * n..3 * n];
    let counters = counters(bins);
    lightness[range.ids()].par_iter().try_for_each(|&l| {
        bump(&counters, bin_index(lightness_level(l, max_value), bin_size))
    })?;
    store(bins, counters);
    Ok(())
}
