//! `normaliseToLut`.

use rayon::prelude::*;

use super::{bad_argument, KernelName, WorkRange};
use crate::error::DeviceError;
use crate::normalise::lut_entry;

/// Scale each cumulative count to the output range.
pub(super) fn normalise_to_lut(
    range: &WorkRange,
    cumulative: &[u32],
    lut: &mut [u16],
    total: u32,
    max_value: u32,
) -> Result<(), DeviceError> {
    let kernel = KernelName::NormaliseToLut;
    if total == 0 {
        return Err(bad_argument(kernel, 2, "total count is zero"));
    }
    let max_value = u16::try_from(max_value)
        .map_err(|_| bad_argument(kernel, 3, "max value exceeds 16 bits"))?;
    range.check_within(cumulative.len())?;
    range.check_within(lut.len())?;

    let ids = range.ids();
    lut[ids.clone()]
        .par_iter_mut()
        .zip(&cumulative[ids])
        .for_each(|(entry, &count)| *entry = lut_entry(count, total, max_value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lut_from_cumulative() {
        let range = WorkRange {
            offset: 0,
            global: 4,
            local: 4,
        };
        let cumulative = [0u32, 2, 3, 4];
        let mut lut = [0u16; 4];
        normalise_to_lut(&range, &cumulative, &mut lut, 4, 255).unwrap();
        assert_eq!(lut, [0, 128, 191, 255]);
    }

    #[test]
    fn test_zero_total_rejected() {
        let range = WorkRange {
            offset: 0,
            global: 1,
            local: 1,
        };
        let mut lut = [0u16; 1];
        assert!(normalise_to_lut(&range, &[0], &mut lut, 0, 255).is_err());
    }
}
