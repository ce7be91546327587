//! `backprojection` and `backprojectionHsl`.

use rayon::prelude::*;

use super::{bad_argument, KernelName, WorkRange};
use crate::color::lightness_level;
use crate::error::DeviceError;
use crate::histogram::bin_index;

fn lookup(lut: &[u16], bin: usize) -> Result<u16, DeviceError> {
    lut.get(bin).copied().ok_or(DeviceError::OutOfRange {
        start: bin,
        end: bin + 1,
        len: lut.len(),
    })
}

/// `out[i] = lut[pixels[i] / bin_size]`.
pub(super) fn backprojection(
    range: &WorkRange,
    pixels: &[u16],
    lut: &[u16],
    out: &mut [u16],
    bin_size: u32,
) -> Result<(), DeviceError> {
    if bin_size == 0 {
        return Err(bad_argument(KernelName::Backprojection, 3, "bin size is zero"));
    }
    range.check_within(pixels.len())?;
    range.check_within(out.len())?;

    let ids = range.ids();
    out[ids.clone()]
        .par_iter_mut()
        .zip(&pixels[ids])
        .try_for_each(|(o, &p)| {
            *o = lookup(lut, bin_index(p, bin_size))?;
            Ok(())
        })
}

/// Replace the lightness plane of an HSL buffer in place.
pub(super) fn backprojection_hsl(
    range: &WorkRange,
    hsl: &mut [f32],
    lut: &[u16],
    bin_size: u32,
    max_value: u32,
    pixel_count: u32,
) -> Result<(), DeviceError> {
    let kernel = KernelName::BackprojectionHsl;
    if bin_size == 0 {
        return Err(bad_argument(kernel, 2, "bin size is zero"));
    }
    let max = match u16::try_from(max_value) {
        Ok(0) | Err(_) => return Err(bad_argument(kernel, 3, "max value must be 1-65535")),
        Ok(max) => max,
    };
    let n = pixel_count as usize;
    if hsl.len() < 3 * n {
        return Err(DeviceError::OutOfRange {
            start: 0,
            end: 3 * n,
            len: hsl.len(),
        });
    }
    range.check_within(n)?;

    let scale = max as f32;
    let lightness = &mut hsl[2 * n..3 * n];
    lightness[range.ids()].par_iter_mut().try_for_each(|l| {
        let level = lightness_level(*l, max);
        *l = lookup(lut, bin_index(level, bin_size))? as f32 / scale;
        Ok(())
    })
}
