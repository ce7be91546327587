//! Scan kernels: per-group Hillis-Steele, block sums, single-group global
//! scan and the carry-add adjustment.

use rayon::prelude::*;

use super::{bad_argument, invalid_range, KernelName, WorkRange};
use crate::error::DeviceError;

/// One Hillis-Steele round: `dst[i] = src[i] + src[i - stride]` where defined.
fn hillis_steele_round(src: &[u32], dst: &mut [u32], stride: usize) {
    dst.par_iter_mut().enumerate().for_each(|(i, out)| {
        *out = if i >= stride {
            src[i].wrapping_add(src[i - stride])
        } else {
            src[i]
        };
    });
}

/// Sequential Hillis-Steele within one work-group, double-buffered in local memory.
fn scan_group(input: &[u32], output: &mut [u32], a: &mut [u32], b: &mut [u32]) {
    let width = input.len();
    let (mut src, mut dst) = (&mut a[..width], &mut b[..width]);
    src.copy_from_slice(input);

    let mut stride = 1;
    while stride < width {
        for i in 0..width {
            dst[i] = if i >= stride {
                src[i].wrapping_add(src[i - stride])
            } else {
                src[i]
            };
        }
        std::mem::swap(&mut src, &mut dst);
        stride *= 2;
    }
    output.copy_from_slice(src);
}

/// Inclusive scan of each work-group's slice of `input` into `output`.
///
/// `local_a` and `local_b` are the sizes of the two local scratch buffers and
/// must each hold one work-group.
pub(super) fn scan_hillis_steele_local(
    range: &WorkRange,
    input: &[u32],
    output: &mut [u32],
    local_a: usize,
    local_b: usize,
) -> Result<(), DeviceError> {
    let kernel = KernelName::ScanHillisSteeleLocal;
    let width = range.local;
    if local_a < width {
        return Err(bad_argument(kernel, 2, format!("local buffer of {local_a} < group {width}")));
    }
    if local_b < width {
        return Err(bad_argument(kernel, 3, format!("local buffer of {local_b} < group {width}")));
    }
    range.check_within(input.len())?;
    range.check_within(output.len())?;

    let ids = range.ids();
    output[ids.clone()]
        .par_chunks_mut(width)
        .zip(input[ids].par_chunks(width))
        .for_each_init(
            || (vec![0u32; local_a], vec![0u32; local_b]),
            |(a, b), (out, inp)| scan_group(inp, out, a, b),
        );
    Ok(())
}

/// Work item `g` stores the last element of group `g` of the scanned input.
pub(super) fn block_sum(
    range: &WorkRange,
    scanned: &[u32],
    block_sums: &mut [u32],
    group_width: u32,
) -> Result<(), DeviceError> {
    let width = group_width as usize;
    if width == 0 {
        return Err(bad_argument(KernelName::BlockSum, 2, "group width is zero"));
    }
    range.check_within(block_sums.len())?;
    let ids = range.ids();
    if ids.end * width > scanned.len() {
        return Err(DeviceError::OutOfRange {
            start: ids.start * width,
            end: ids.end * width,
            len: scanned.len(),
        });
    }

    let offset = ids.start;
    block_sums[ids].par_iter_mut().enumerate().for_each(|(i, sum)| {
        *sum = scanned[(offset + i + 1) * width - 1];
    });
    Ok(())
}

/// Inclusive scan of `data` in place by a single work-group.
///
/// Each round reads one buffer and writes the other; `scratch` must be at
/// least as long as the scanned range.
pub(super) fn scan_hillis_steele_global(
    range: &WorkRange,
    data: &mut [u32],
    scratch: &mut [u32],
) -> Result<(), DeviceError> {
    let kernel = KernelName::ScanHillisSteeleGlobal;
    if range.offset != 0 || range.local != range.global {
        return Err(invalid_range(kernel, "must run as a single work-group from offset 0"));
    }
    range.check_within(data.len())?;
    range.check_within(scratch.len())?;

    let n = range.global;
    let (mut src, mut dst) = (&mut data[..n], &mut scratch[..n]);
    let mut in_scratch = false;
    let mut stride = 1;
    while stride < n {
        hillis_steele_round(src, dst, stride);
        std::mem::swap(&mut src, &mut dst);
        in_scratch = !in_scratch;
        stride *= 2;
    }
    if in_scratch {
        // src is scratch, dst is data
        dst.copy_from_slice(src);
    }
    Ok(())
}

/// Add the scanned total of all preceding groups to each element.
///
/// Launched with offset equal to the group width so group 0 is left alone.
pub(super) fn scan_add_adjust(
    range: &WorkRange,
    output: &mut [u32],
    block_scan: &[u32],
) -> Result<(), DeviceError> {
    let width = range.local;
    range.check_within(output.len())?;
    let ids = range.ids();
    if ids.is_empty() {
        return Ok(());
    }
    let last_block = (ids.end - 1) / width;
    if last_block > block_scan.len() {
        return Err(DeviceError::OutOfRange {
            start: 0,
            end: last_block,
            len: block_scan.len(),
        });
    }

    let offset = ids.start;
    output[ids].par_iter_mut().enumerate().for_each(|(i, value)| {
        let block = (offset + i) / width;
        if block > 0 {
            *value = value.wrapping_add(block_scan[block - 1]);
        }
    });
    Ok(())
}
