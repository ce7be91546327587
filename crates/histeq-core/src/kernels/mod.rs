//! Kernel program of the host device.
//!
//! Each kernel is a plain function over host slices executed with rayon.
//! Work items map onto slice indices `offset..offset + global`; work-groups
//! are contiguous runs of `local` indices. Kernels that need a barrier
//! (the Hillis-Steele scans) run their rounds sequentially and each round
//! in parallel, which gives the same happens-before ordering.

mod backproject;
mod color;
mod histogram;
mod lut;
mod scan;

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::device::ArgList;
use crate::error::DeviceError;

/// Kernels available on every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelName {
    HistogramAtomic,
    HistogramAtomicHsl,
    ScanHillisSteeleLocal,
    BlockSum,
    ScanHillisSteeleGlobal,
    ScanAddAdjust,
    NormaliseToLut,
    RgbToHsl,
    HslToRgb,
    Backprojection,
    BackprojectionHsl,
}

impl KernelName {
    pub const ALL: [KernelName; 11] = [
        KernelName::HistogramAtomic,
        KernelName::HistogramAtomicHsl,
        KernelName::ScanHillisSteeleLocal,
        KernelName::BlockSum,
        KernelName::ScanHillisSteeleGlobal,
        KernelName::ScanAddAdjust,
        KernelName::NormaliseToLut,
        KernelName::RgbToHsl,
        KernelName::HslToRgb,
        KernelName::Backprojection,
        KernelName::BackprojectionHsl,
    ];

    /// Name of the kernel as it appears in the program.
    pub fn as_str(self) -> &'static str {
        match self {
            KernelName::HistogramAtomic => "histogramAtomic",
            KernelName::HistogramAtomicHsl => "histogramAtomicHsl",
            KernelName::ScanHillisSteeleLocal => "scanHillisSteeleLocal",
            KernelName::BlockSum => "blockSum",
            KernelName::ScanHillisSteeleGlobal => "scanHillisSteeleGlobal",
            KernelName::ScanAddAdjust => "scanAddAdjust",
            KernelName::NormaliseToLut => "normaliseToLut",
            KernelName::RgbToHsl => "rgbToHsl",
            KernelName::HslToRgb => "hslToRgb",
            KernelName::Backprojection => "backprojection",
            KernelName::BackprojectionHsl => "backprojectionHsl",
        }
    }

    /// Number of positional arguments the kernel takes.
    pub fn arity(self) -> usize {
        match self {
            KernelName::HistogramAtomic => 3,
            KernelName::HistogramAtomicHsl => 5,
            KernelName::ScanHillisSteeleLocal => 4,
            KernelName::BlockSum => 3,
            KernelName::ScanHillisSteeleGlobal => 2,
            KernelName::ScanAddAdjust => 2,
            KernelName::NormaliseToLut => 4,
            KernelName::RgbToHsl => 4,
            KernelName::HslToRgb => 4,
            KernelName::Backprojection => 4,
            KernelName::BackprojectionHsl => 5,
        }
    }
}

impl fmt::Display for KernelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KernelName {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KernelName::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DeviceError::KernelNotFound(s.to_string()))
    }
}

/// Launch geometry after the device resolved the work-group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkRange {
    pub offset: usize,
    pub global: usize,
    pub local: usize,
}

impl WorkRange {
    /// Global ids covered by the launch.
    pub fn ids(&self) -> Range<usize> {
        self.offset..self.offset + self.global
    }

    /// Fail unless every global id indexes into `len` elements.
    pub fn check_within(&self, len: usize) -> Result<(), DeviceError> {
        let ids = self.ids();
        if ids.end > len {
            return Err(DeviceError::OutOfRange {
                start: ids.start,
                end: ids.end,
                len,
            });
        }
        Ok(())
    }
}

pub(crate) fn invalid_range(kernel: KernelName, reason: impl Into<String>) -> DeviceError {
    DeviceError::InvalidRange {
        kernel: kernel.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn bad_argument(kernel: KernelName, index: usize, reason: impl Into<String>) -> DeviceError {
    DeviceError::BadArgument {
        kernel: kernel.to_string(),
        index,
        reason: reason.into(),
    }
}

/// Run `kernel` over `range` with the bound arguments.
pub(crate) fn dispatch(
    kernel: KernelName,
    range: &WorkRange,
    args: &mut ArgList<'_>,
) -> Result<(), DeviceError> {
    if args.len() != kernel.arity() {
        return Err(bad_argument(
            kernel,
            args.len(),
            format!("expected {} arguments, got {}", kernel.arity(), args.len()),
        ));
    }

    match kernel {
        KernelName::HistogramAtomic => {
            histogram::histogram_atomic(range, args.input(0)?, args.output(1)?, args.uint(2)?)
        }
        KernelName::HistogramAtomicHsl => histogram::histogram_atomic_hsl(
            range,
            args.input(0)?,
            args.output(1)?,
            args.uint(2)?,
            args.uint(3)?,
            args.uint(4)?,
        ),
        KernelName::ScanHillisSteeleLocal => scan::scan_hillis_steele_local(
            range,
            args.input(0)?,
            args.output(1)?,
            args.local(2)?,
            args.local(3)?,
        ),
        KernelName::BlockSum => {
            scan::block_sum(range, args.input(0)?, args.output(1)?, args.uint(2)?)
        }
        KernelName::ScanHillisSteeleGlobal => {
            scan::scan_hillis_steele_global(range, args.output(0)?, args.output(1)?)
        }
        KernelName::ScanAddAdjust => {
            scan::scan_add_adjust(range, args.output(0)?, args.input(1)?)
        }
        KernelName::NormaliseToLut => lut::normalise_to_lut(
            range,
            args.input(0)?,
            args.output(1)?,
            args.uint(2)?,
            args.uint(3)?,
        ),
        KernelName::RgbToHsl => color::rgb_to_hsl(
            range,
            args.input(0)?,
            args.output(1)?,
            args.uint(2)?,
            args.uint(3)?,
        ),
        KernelName::HslToRgb => color::hsl_to_rgb(
            range,
            args.input(0)?,
            args.output(1)?,
            args.uint(2)?,
            args.uint(3)?,
        ),
        KernelName::Backprojection => backproject::backprojection(
            range,
            args.input(0)?,
            args.input(1)?,
            args.output(2)?,
            args.uint(3)?,
        ),
        KernelName::BackprojectionHsl => backproject::backprojection_hsl(
            range,
            args.output(0)?,
            args.input(1)?,
            args.uint(2)?,
            args.uint(3)?,
            args.uint(4)?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_names_round_trip() {
        for kernel in KernelName::ALL {
            assert_eq!(kernel.as_str().parse::<KernelName>().unwrap(), kernel);
        }
    }

    #[test]
    fn test_unknown_kernel() {
        let err = "scanBlelloch".parse::<KernelName>().unwrap_err();
        assert_eq!(err, DeviceError::KernelNotFound("scanBlelloch".into()));
    }

    #[test]
    fn test_work_range_bounds() {
        let range = WorkRange {
            offset: 4,
            global: 8,
            local: 4,
        };
        assert_eq!(range.ids(), 4..12);
        assert!(range.check_within(12).is_ok());
        assert!(range.check_within(11).is_err());
    }
}
