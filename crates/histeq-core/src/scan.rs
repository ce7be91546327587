//! Two-level parallel inclusive prefix sum.
//!
//! The input is zero-padded to a multiple of the group width `G` and scanned
//! in four phases, each one kernel launch on the in-order queue:
//!
//! 1. `scanHillisSteeleLocal` scans every block of `G` elements independently.
//! 2. `blockSum` gathers the last element of each block.
//! 3. The block sums are scanned, by `scanHillisSteeleGlobal` when they fit one
//!    work-group and by recursing into this same algorithm when they do not.
//! 4. `scanAddAdjust` adds the scanned sum of all preceding blocks to every
//!    element of blocks `1..`, leaving block 0 untouched.
//!
//! With a single block, phases 2 to 4 are skipped. Sums wrap at `2^32`; the
//! pipeline bounds them by rejecting channels with more than `u32::MAX`
//! pixels.

use tracing::debug;

use crate::device::{BufferAccess, ComputeDevice, DeviceBuffer, KernelArg, NdRange};
use crate::error::{EqualiseError, Result};
use crate::histogram::{CumulativeHistogram, Histogram};
use crate::kernels::KernelName;
use crate::report::{Stage, StageTiming, Staged};

/// Resolve the scan group width for a device.
///
/// Uses the device's preferred multiple for `scanHillisSteeleLocal` unless a
/// width is requested. The width must lie in `2..=max_work_group_size`.
pub fn group_width<D: ComputeDevice>(device: &D, requested: Option<usize>) -> Result<usize> {
    let limit = device.max_work_group_size();
    let width = requested.unwrap_or_else(|| {
        device
            .preferred_work_group_multiple(KernelName::ScanHillisSteeleLocal)
            .min(limit)
    });
    if width < 2 || width > limit {
        return Err(EqualiseError::InvalidGroupWidth { width, limit });
    }
    Ok(width)
}

/// Round `len` up to a multiple of `width`.
#[inline]
pub fn padded_len(len: usize, width: usize) -> usize {
    len.div_ceil(width) * width
}

/// Inclusive prefix sum of `values` on the device.
///
/// # Arguments
///
/// * `device` - Device to run the scan kernels on
/// * `values` - Non-empty input sequence
/// * `requested_width` - Group width override, see [`group_width`]
///
/// # Errors
///
/// `EmptyScanInput` for an empty input, `InvalidGroupWidth` for a bad
/// override, and any device error raised by a launch.
pub fn inclusive_scan<D: ComputeDevice>(
    device: &D,
    values: &[u32],
    requested_width: Option<usize>,
) -> Result<Staged<Vec<u32>>> {
    if values.is_empty() {
        return Err(EqualiseError::EmptyScanInput);
    }
    let width = group_width(device, requested_width)?;
    let padded = padded_len(values.len(), width);

    let input = device.create_buffer::<u32>(padded, BufferAccess::ReadOnly)?;
    device.write_buffer(&input, values)?;

    let mut timings = Vec::new();
    let output = scan_blocks(device, &input, padded, width, 0, &mut timings)?;
    let result = device.download(&output, values.len())?;

    debug!(
        len = values.len(),
        padded,
        width,
        launches = timings.len(),
        "inclusive scan complete"
    );
    Ok(Staged::new(result, timings))
}

/// Turn a histogram into its cumulative histogram on the device.
pub fn cumulative_histogram<D: ComputeDevice>(
    device: &D,
    histogram: &Histogram,
    requested_width: Option<usize>,
) -> Result<Staged<CumulativeHistogram>> {
    let Staged { value, timings } = inclusive_scan(device, histogram.counts(), requested_width)?;
    Ok(Staged::new(CumulativeHistogram::from_counts(value), timings))
}

/// Scan `len` elements of `input`, where `len` is a multiple of `width`.
fn scan_blocks<D: ComputeDevice>(
    device: &D,
    input: &DeviceBuffer<u32>,
    len: usize,
    width: usize,
    level: usize,
    timings: &mut Vec<StageTiming>,
) -> Result<DeviceBuffer<u32>> {
    let output = device.create_buffer::<u32>(len, BufferAccess::ReadWrite)?;
    let event = device.enqueue_kernel(
        KernelName::ScanHillisSteeleLocal,
        NdRange::new(len).with_local(width),
        &[
            input.arg(),
            output.arg(),
            KernelArg::Local(width),
            KernelArg::Local(width),
        ],
    )?;
    timings.push(StageTiming::from_event(Stage::LocalScan, &event));

    let groups = len / width;
    if groups == 1 {
        return Ok(output);
    }

    // Zero padding lets the block sums be scanned again at the same width.
    let padded_groups = padded_len(groups, width);
    let block_sums = device.create_buffer::<u32>(padded_groups, BufferAccess::ReadWrite)?;
    let event = device.enqueue_kernel(
        KernelName::BlockSum,
        NdRange::new(groups),
        &[output.arg(), block_sums.arg(), KernelArg::Uint(width as u32)],
    )?;
    timings.push(StageTiming::from_event(Stage::BlockSum, &event));

    let block_scan = if groups <= device.max_work_group_size() {
        let scratch = device.create_buffer::<u32>(groups, BufferAccess::ReadWrite)?;
        let event = device.enqueue_kernel(
            KernelName::ScanHillisSteeleGlobal,
            NdRange::new(groups).with_local(groups),
            &[block_sums.arg(), scratch.arg()],
        )?;
        timings.push(StageTiming::from_event(Stage::BlockScan, &event));
        block_sums
    } else {
        debug!(level, groups, "block sums exceed one work-group, recursing");
        scan_blocks(device, &block_sums, padded_groups, width, level + 1, timings)?
    };

    let event = device.enqueue_kernel(
        KernelName::ScanAddAdjust,
        NdRange::new(len - width).with_offset(width).with_local(width),
        &[output.arg(), block_scan.arg()],
    )?;
    timings.push(StageTiming::from_event(Stage::ScanAdjust, &event));

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;

    fn sequential(values: &[u32]) -> Vec<u32> {
        values
            .iter()
            .scan(0u32, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect()
    }

    fn stages(timings: &[StageTiming]) -> Vec<Stage> {
        timings.iter().map(|t| t.stage).collect()
    }

    #[test]
    fn test_empty_input_rejected() {
        let device = HostDevice::new();
        assert!(matches!(
            inclusive_scan(&device, &[], None),
            Err(EqualiseError::EmptyScanInput)
        ));
    }

    #[test]
    fn test_single_element() {
        let device = HostDevice::new();
        let staged = inclusive_scan(&device, &[7], None).unwrap();
        assert_eq!(staged.value, vec![7]);
    }

    #[test]
    fn test_shorter_than_group_skips_later_phases() {
        let device = HostDevice::with_work_groups(8, 64);
        let values = [3u32, 1, 4, 1, 5];
        let staged = inclusive_scan(&device, &values, None).unwrap();
        assert_eq!(staged.value, vec![3, 4, 8, 9, 14]);
        assert_eq!(stages(&staged.timings), vec![Stage::LocalScan]);
    }

    #[test]
    fn test_exact_multiple_of_group() {
        let device = HostDevice::with_work_groups(4, 64);
        let values: Vec<u32> = (1..=8).collect();
        let staged = inclusive_scan(&device, &values, None).unwrap();
        assert_eq!(staged.value, sequential(&values));
        assert_eq!(
            stages(&staged.timings),
            vec![
                Stage::LocalScan,
                Stage::BlockSum,
                Stage::BlockScan,
                Stage::ScanAdjust
            ]
        );
    }

    #[test]
    fn test_padding_not_multiple_of_group() {
        let device = HostDevice::with_work_groups(4, 64);
        let values = [2u32, 0, 1, 3, 5, 8, 1];
        let staged = inclusive_scan(&device, &values, None).unwrap();
        assert_eq!(staged.value, vec![2, 2, 3, 6, 11, 19, 20]);
    }

    #[test]
    fn test_recursion_when_blocks_exceed_group_limit() {
        // 100 values at width 4: 25 blocks > max 8, so the block sums recurse
        let device = HostDevice::with_work_groups(4, 8);
        let values: Vec<u32> = (0..100).map(|i| (i * 7 % 13) as u32).collect();
        let staged = inclusive_scan(&device, &values, None).unwrap();
        assert_eq!(staged.value, sequential(&values));
        let local_scans = staged
            .timings
            .iter()
            .filter(|t| t.stage == Stage::LocalScan)
            .count();
        assert!(local_scans >= 2, "expected a recursive level");
    }

    #[test]
    fn test_group_width_override() {
        let device = HostDevice::new();
        let values: Vec<u32> = vec![1; 300];
        let staged = inclusive_scan(&device, &values, Some(16)).unwrap();
        assert_eq!(staged.value, sequential(&values));
        assert_eq!(staged.value[299], 300);
    }

    #[test]
    fn test_group_width_bounds() {
        let device = HostDevice::with_work_groups(64, 256);
        assert_eq!(group_width(&device, None).unwrap(), 64);
        assert!(matches!(
            group_width(&device, Some(1)),
            Err(EqualiseError::InvalidGroupWidth { width: 1, .. })
        ));
        assert!(group_width(&device, Some(512)).is_err());
    }

    #[test]
    fn test_no_buffers_leak() {
        let device = HostDevice::with_work_groups(4, 8);
        let values = vec![1u32; 200];
        inclusive_scan(&device, &values, None).unwrap();
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(1, 4), 4);
        assert_eq!(padded_len(4, 4), 4);
        assert_eq!(padded_len(5, 4), 8);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::device::HostDevice;
    use proptest::prelude::*;

    /// Strategy for small device limits so recursion is exercised.
    fn device_strategy() -> impl Strategy<Value = (usize, usize)> {
        (2usize..=16, 2usize..=32).prop_map(|(preferred, max)| (preferred.min(max), max))
    }

    proptest! {
        /// Property: the device scan matches a sequential running sum.
        #[test]
        fn prop_matches_sequential_scan(
            values in prop::collection::vec(0u32..1000, 1..3000),
            (preferred, max) in device_strategy(),
        ) {
            let device = HostDevice::with_work_groups(preferred, max);
            let result = inclusive_scan(&device, &values, None).unwrap().value;

            let mut acc = 0u32;
            for (i, &v) in values.iter().enumerate() {
                acc += v;
                prop_assert_eq!(result[i], acc, "mismatch at {}", i);
            }
        }

        /// Property: scanning non-negative counts never decreases.
        #[test]
        fn prop_result_is_non_decreasing(
            values in prop::collection::vec(0u32..50, 1..500),
        ) {
            let device = HostDevice::with_work_groups(8, 16);
            let result = inclusive_scan(&device, &values, None).unwrap().value;
            prop_assert!(result.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(*result.last().unwrap(), values.iter().sum::<u32>());
        }
    }
}
