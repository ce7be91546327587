//! Normalisation of a cumulative histogram into a lookup table.

use tracing::warn;

use crate::device::{BufferAccess, ComputeDevice, KernelArg, NdRange};
use crate::error::Result;
use crate::histogram::{bin_index, CumulativeHistogram};
use crate::kernels::KernelName;
use crate::report::{Stage, StageTiming, Staged};
use crate::ChannelParams;

/// `round(cumulative * max / total)`, rounding halves up.
///
/// `total` must be non-zero and at least `cumulative`.
#[inline]
pub fn lut_entry(cumulative: u32, total: u32, max_value: u16) -> u16 {
    let total = total as u64;
    let scaled = (cumulative as u64 * max_value as u64 + total / 2) / total;
    scaled.min(max_value as u64) as u16
}

/// Output value for every histogram bin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    entries: Vec<u16>,
    bin_size: u32,
    max_value: u16,
}

impl LookupTable {
    pub fn new(entries: Vec<u16>, params: &ChannelParams) -> Self {
        Self {
            entries,
            bin_size: params.bin_size,
            max_value: params.max_value,
        }
    }

    /// Table mapping bin `i` to `min(i * bin_size, max)`.
    ///
    /// Used when a channel has no counted samples.
    pub fn identity(params: &ChannelParams) -> Self {
        let entries = (0..params.bin_count())
            .map(|i| (i as u64 * params.bin_size as u64).min(params.max_value as u64) as u16)
            .collect();
        Self::new(entries, params)
    }

    pub fn entries(&self) -> &[u16] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bin_size(&self) -> u32 {
        self.bin_size
    }

    pub fn max_value(&self) -> u16 {
        self.max_value
    }

    /// Output value for a sample.
    ///
    /// # Panics
    ///
    /// Panics if the sample's bin is outside the table.
    #[inline]
    pub fn map(&self, value: u16) -> u16 {
        self.entries[bin_index(value, self.bin_size)]
    }

    /// Check that entries never decrease.
    pub fn is_monotonic(&self) -> bool {
        self.entries.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Build the lookup table from a cumulative histogram on the device.
///
/// A cumulative histogram whose total is zero cannot be normalised; the
/// identity table is returned instead and no kernel runs.
pub fn normalise<D: ComputeDevice>(
    device: &D,
    cumulative: &CumulativeHistogram,
    params: &ChannelParams,
) -> Result<Staged<LookupTable>> {
    let total = cumulative.total();
    if total == 0 {
        warn!(
            bins = cumulative.len(),
            "cumulative histogram is empty, using identity lookup table"
        );
        return Ok(Staged::new(LookupTable::identity(params), Vec::new()));
    }

    let bins = cumulative.len();
    let counts = device.upload(cumulative.counts(), BufferAccess::ReadOnly)?;
    let lut = device.create_buffer::<u16>(bins, BufferAccess::WriteOnly)?;

    let event = device.enqueue_kernel(
        KernelName::NormaliseToLut,
        NdRange::new(bins),
        &[
            counts.arg(),
            lut.arg(),
            KernelArg::Uint(total),
            KernelArg::Uint(params.max_value as u32),
        ],
    )?;
    let entries = device.download(&lut, bins)?;

    Ok(Staged::new(
        LookupTable::new(entries, params),
        vec![StageTiming::from_event(Stage::Normalise, &event)],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;
    use crate::{BitDepth, EqualisationConfig};

    fn params(bin_size: u32) -> ChannelParams {
        EqualisationConfig::new(bin_size)
            .validate(BitDepth::Eight)
            .unwrap()
    }

    #[test]
    fn test_lut_entry_rounds_half_up() {
        assert_eq!(lut_entry(2, 4, 255), 128); // 127.5
        assert_eq!(lut_entry(3, 4, 255), 191); // 191.25
        assert_eq!(lut_entry(4, 4, 255), 255);
        assert_eq!(lut_entry(0, 4, 255), 0);
        assert_eq!(lut_entry(u32::MAX, u32::MAX, 65535), 65535);
    }

    #[test]
    fn test_scenario_lut() {
        let device = HostDevice::new();
        let mut counts = vec![0u32; 256];
        for (i, c) in counts.iter_mut().enumerate() {
            *c = match i {
                0..=9 => 0,
                10..=19 => 2,
                20..=29 => 3,
                _ => 4,
            };
        }
        let cum = CumulativeHistogram::from_counts(counts);
        let lut = normalise(&device, &cum, &params(1)).unwrap().value;
        assert_eq!(lut.map(10), 128);
        assert_eq!(lut.map(20), 191);
        assert_eq!(lut.map(30), 255);
        assert!(lut.is_monotonic());
    }

    #[test]
    fn test_empty_total_falls_back_to_identity() {
        let device = HostDevice::new();
        let cum = CumulativeHistogram::from_counts(vec![0; 256]);
        let staged = normalise(&device, &cum, &params(1)).unwrap();
        assert!(staged.timings.is_empty());
        assert_eq!(staged.value.map(0), 0);
        assert_eq!(staged.value.map(77), 77);
        assert_eq!(staged.value.map(255), 255);
    }

    #[test]
    fn test_identity_binned_caps_at_max() {
        let lut = LookupTable::identity(&params(100));
        assert_eq!(lut.entries(), &[0, 100, 200]);
        let lut = LookupTable::identity(&params(256));
        assert_eq!(lut.entries(), &[0]);
    }
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
        /// Property: a monotone cumulative histogram gives a monotone table
        /// ending at the maximum value.
        #[test]
        fn prop_lut_monotone(
            counts in prop::collection::vec(0u32..500, 1..=256),
        ) {
            prop_assume!(counts.iter().any(|&c| c > 0));
            let cumulative: Vec<u32> = counts
                .iter()
                .scan(0u32, |acc, &c| {
                    *acc += c;
                    Some(*acc)
                })
                .collect();
            let params = EqualisationConfig::new(1).validate(BitDepth::Eight).unwrap();

            // bins past the generated counts hold no samples
            let mut padded = cumulative;
            let last = *padded.last().unwrap();
            padded.resize(params.bin_count(), last);

            let device = HostDevice::new();
            let lut = normalise(&device, &CumulativeHistogram::from_counts(padded), &params)
                .unwrap()
                .value;
            prop_assert!(lut.is_monotonic());
            prop_assert_eq!(*lut.entries().last().unwrap(), 255);
        }
    }
}
