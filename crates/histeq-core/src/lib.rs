//! histeq core - histogram equalisation on a data-parallel device
//!
//! This crate provides the equalisation pipeline (histogram, cumulative scan,
//! lookup table, backprojection), its luminance-only HSL variant, a serial
//! reference implementation, and the device abstraction the parallel path
//! runs on.

pub mod backproject;
pub mod buffer;
pub mod clock;
pub mod color;
pub mod device;
pub mod error;
pub mod histogram;
pub mod io;
pub mod kernels;
pub mod normalise;
pub mod pipeline;
pub mod report;
pub mod scan;
pub mod serial;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use buffer::{BitDepth, PixelBuffer};
pub use device::{ComputeDevice, HostDevice};
pub use error::{DeviceError, EqualiseError, Result};
pub use histogram::{CumulativeHistogram, Histogram};
pub use kernels::KernelName;
pub use normalise::LookupTable;
pub use pipeline::{compare, equalise, equalise_hsl, run, Outcome};
pub use report::{Comparison, EqualisationReport, Equalised, StageTiming};

/// Which implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Sequential reference, per channel.
    Serial,
    /// Device pipeline, per channel.
    #[default]
    Parallel,
    /// Device pipeline on the HSL lightness plane.
    Hsl,
    /// Serial and parallel runs compared sample by sample.
    Compare,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Serial => "serial",
            Algorithm::Parallel => "parallel",
            Algorithm::Hsl => "hsl",
            Algorithm::Compare => "compare",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Algorithm::Serial),
            "parallel" => Ok(Algorithm::Parallel),
            "hsl" => Ok(Algorithm::Hsl),
            "compare" => Ok(Algorithm::Compare),
            other => Err(format!("unknown algorithm '{other}'")),
        }
    }
}

/// Settings shared by every algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EqualisationConfig {
    /// Width of a histogram bin in sample values.
    pub bin_size: u32,
    /// Scan work-group width; the device's preferred multiple when `None`.
    pub group_width: Option<usize>,
}

impl Default for EqualisationConfig {
    fn default() -> Self {
        Self {
            bin_size: 1,
            group_width: None,
        }
    }
}

impl EqualisationConfig {
    pub fn new(bin_size: u32) -> Self {
        Self {
            bin_size,
            ..Self::default()
        }
    }

    pub fn with_group_width(mut self, width: usize) -> Self {
        self.group_width = Some(width);
        self
    }

    /// Check the bin size against a bit depth.
    ///
    /// # Errors
    ///
    /// `InvalidBinSize` when the bin size is 0 or larger than `max + 1`.
    pub fn validate(&self, depth: BitDepth) -> Result<ChannelParams> {
        let limit = depth.max_value() as u32 + 1;
        if self.bin_size == 0 || self.bin_size > limit {
            return Err(EqualiseError::InvalidBinSize {
                bin_size: self.bin_size,
                limit,
            });
        }
        Ok(ChannelParams {
            bin_size: self.bin_size,
            max_value: depth.max_value(),
        })
    }
}

/// Validated per-channel parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParams {
    pub bin_size: u32,
    pub max_value: u16,
}

impl ChannelParams {
    /// Number of histogram bins, `ceil((max + 1) / bin_size)`.
    pub fn bin_count(&self) -> usize {
        histogram::bin_count(self.max_value, self.bin_size)
    }
}
