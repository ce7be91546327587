//! `rgbToHsl` and `hslToRgb` over channel-major planes.
//!
//! Both buffers hold three planes of `pixel_count` elements: R, G, B for the
//! sample buffer and H (degrees), S, L for the float buffer.

use rayon::prelude::*;

use super::{bad_argument, KernelName, WorkRange};
use crate::color::{
    hsl_to_rgb as hsl_pixel_to_rgb, rgb_to_hsl as rgb_pixel_to_hsl, to_sample, Hsl,
};
use crate::error::DeviceError;

fn check_planes(len: usize, pixel_count: usize) -> Result<(), DeviceError> {
    if len < 3 * pixel_count {
        return Err(DeviceError::OutOfRange {
            start: 0,
            end: 3 * pixel_count,
            len,
        });
    }
    Ok(())
}

fn max_sample(kernel: KernelName, max_value: u32) -> Result<u16, DeviceError> {
    match u16::try_from(max_value) {
        Ok(0) | Err(_) => Err(bad_argument(kernel, 2, "max value must be 1-65535")),
        Ok(max) => Ok(max),
    }
}

pub(super) fn rgb_to_hsl(
    range: &WorkRange,
    rgb: &[u16],
    hsl: &mut [f32],
    max_value: u32,
    pixel_count: u32,
) -> Result<(), DeviceError> {
    let max = max_sample(KernelName::RgbToHsl, max_value)? as f32;
    let n = pixel_count as usize;
    check_planes(rgb.len(), n)?;
    check_planes(hsl.len(), n)?;
    range.check_within(n)?;

    let (r, rest) = rgb.split_at(n);
    let (g, b) = rest.split_at(n);
    let (h_plane, rest) = hsl.split_at_mut(n);
    let (s_plane, rest) = rest.split_at_mut(n);
    let l_plane = &mut rest[..n];

    let ids = range.ids();
    let offset = ids.start;
    h_plane[ids.clone()]
        .par_iter_mut()
        .zip(s_plane[ids.clone()].par_iter_mut())
        .zip(l_plane[ids].par_iter_mut())
        .enumerate()
        .for_each(|(i, ((h, s), l))| {
            let p = offset + i;
            let hsl = rgb_pixel_to_hsl(r[p] as f32 / max, g[p] as f32 / max, b[p] as f32 / max);
            *h = hsl.h;
            *s = hsl.s;
            *l = hsl.l;
        });
    Ok(())
}

pub(super) fn hsl_to_rgb(
    range: &WorkRange,
    hsl: &[f32],
    rgb: &mut [u16],
    max_value: u32,
    pixel_count: u32,
) -> Result<(), DeviceError> {
    let max = max_sample(KernelName::HslToRgb, max_value)?;
    let n = pixel_count as usize;
    check_planes(hsl.len(), n)?;
    check_planes(rgb.len(), n)?;
    range.check_within(n)?;

    let (h_plane, rest) = hsl.split_at(n);
    let (s_plane, l_plane) = rest.split_at(n);
    let (r, rest) = rgb.split_at_mut(n);
    let (g, rest) = rest.split_at_mut(n);
    let b = &mut rest[..n];

    let ids = range.ids();
    let offset = ids.start;
    r[ids.clone()]
        .par_iter_mut()
        .zip(g[ids.clone()].par_iter_mut())
        .zip(b[ids].par_iter_mut())
        .enumerate()
        .for_each(|(i, ((r, g), b))| {
            let p = offset + i;
            let (rf, gf, bf) = hsl_pixel_to_rgb(Hsl {
                h: h_plane[p],
                s: s_plane[p],
                l: l_plane[p],
            });
            *r = to_sample(rf, max);
            *g = to_sample(gf, max);
            *b = to_sample(bf, max);
        });
    Ok(())
}
