//! Timing reports returned by every stage and pipeline.
//!
//! Stages do not accumulate timings anywhere global: each returns a
//! [`Staged`] value carrying its own [`StageTiming`]s and the caller folds
//! them into a [`ChannelReport`] and finally an [`EqualisationReport`].

use std::fmt;
use std::time::Duration;

use crate::buffer::PixelBuffer;
use crate::device::KernelEvent;
use crate::kernels::KernelName;
use crate::Algorithm;

/// Pipeline stage a timing belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    RgbToHsl,
    Histogram,
    /// Phase 1 of the parallel scan.
    LocalScan,
    /// Phase 2 of the parallel scan.
    BlockSum,
    /// Phase 3 of the parallel scan.
    BlockScan,
    /// Phase 4 of the parallel scan.
    ScanAdjust,
    /// Sequential running sum of the serial path.
    CumulativeSum,
    Normalise,
    Backproject,
    HslToRgb,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::RgbToHsl => "rgb to hsl",
            Stage::Histogram => "histogram",
            Stage::LocalScan => "local scan",
            Stage::BlockSum => "block sum",
            Stage::BlockScan => "block scan",
            Stage::ScanAdjust => "scan adjust",
            Stage::CumulativeSum => "cumulative sum",
            Stage::Normalise => "normalise",
            Stage::Backproject => "backproject",
            Stage::HslToRgb => "hsl to rgb",
        }
    }

    /// Check if this stage is part of the cumulative scan.
    pub fn is_scan(self) -> bool {
        matches!(
            self,
            Stage::LocalScan
                | Stage::BlockSum
                | Stage::BlockScan
                | Stage::ScanAdjust
                | Stage::CumulativeSum
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duration of one stage, and the kernel that ran it on the parallel path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: Stage,
    pub kernel: Option<KernelName>,
    pub duration: Duration,
}

impl StageTiming {
    /// Timing of a host-side stage.
    pub fn host(stage: Stage, duration: Duration) -> Self {
        Self {
            stage,
            kernel: None,
            duration,
        }
    }

    /// Timing taken from a kernel's profiling event.
    pub fn from_event(stage: Stage, event: &KernelEvent) -> Self {
        Self {
            stage,
            kernel: Some(event.kernel),
            duration: event.elapsed(),
        }
    }
}

impl fmt::Display for StageTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kernel {
            Some(kernel) => write!(
                f,
                "{:<14} {:<24} {:>10} us",
                self.stage.as_str(),
                kernel.as_str(),
                self.duration.as_micros()
            ),
            None => write!(
                f,
                "{:<14} {:<24} {:>10} us",
                self.stage.as_str(),
                "(host)",
                self.duration.as_micros()
            ),
        }
    }
}

/// A stage result together with the timings spent producing it.
#[derive(Debug, Clone)]
pub struct Staged<T> {
    pub value: T,
    pub timings: Vec<StageTiming>,
}

impl<T> Staged<T> {
    pub fn new(value: T, timings: Vec<StageTiming>) -> Self {
        Self { value, timings }
    }

    /// Move this stage's timings onto `into` and return the value.
    pub fn collect_into(self, into: &mut Vec<StageTiming>) -> T {
        into.extend(self.timings);
        self.value
    }

    /// Total time across the stage's timings.
    pub fn total(&self) -> Duration {
        self.timings.iter().map(|t| t.duration).sum()
    }
}

/// Timings for one channel (or the lightness plane in HSL mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: usize,
    pub stages: Vec<StageTiming>,
}

impl ChannelReport {
    pub fn total(&self) -> Duration {
        self.stages.iter().map(|t| t.duration).sum()
    }

    /// Time spent in a particular stage, summed over recursive levels.
    pub fn stage_total(&self, stage: Stage) -> Duration {
        self.stages
            .iter()
            .filter(|t| t.stage == stage)
            .map(|t| t.duration)
            .sum()
    }

    /// Time spent in the cumulative scan, across all of its phases.
    pub fn scan_total(&self) -> Duration {
        self.stages
            .iter()
            .filter(|t| t.stage.is_scan())
            .map(|t| t.duration)
            .sum()
    }
}

/// Timings of a full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualisationReport {
    pub algorithm: Algorithm,
    pub device: String,
    pub channels: Vec<ChannelReport>,
}

impl EqualisationReport {
    /// Total time of every stage in every channel.
    pub fn total(&self) -> Duration {
        self.channels.iter().map(ChannelReport::total).sum()
    }

    /// Number of kernel launches recorded.
    pub fn kernel_launches(&self) -> usize {
        self.channels
            .iter()
            .flat_map(|c| &c.stages)
            .filter(|t| t.kernel.is_some())
            .count()
    }
}

impl fmt::Display for EqualisationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} on {}", self.algorithm, self.device)?;
        for channel in &self.channels {
            writeln!(f, "channel {}:", channel.channel)?;
            for timing in &channel.stages {
                writeln!(f, "  {timing}")?;
            }
            writeln!(f, "  total {:>38} us", channel.total().as_micros())?;
        }
        write!(f, "overall {:>37} us", self.total().as_micros())
    }
}

/// An equalised image and how long it took.
#[derive(Debug, Clone)]
pub struct Equalised {
    pub image: PixelBuffer,
    pub report: EqualisationReport,
}

/// Serial versus parallel run of the same image.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub serial: Equalised,
    pub parallel: Equalised,
    /// Samples where the two outputs differ.
    pub mismatched_samples: usize,
    /// Largest absolute sample difference.
    pub max_difference: u16,
}

impl Comparison {
    /// Compare two runs sample by sample.
    pub fn new(serial: Equalised, parallel: Equalised) -> Self {
        let (mismatched_samples, max_difference) = serial
            .image
            .samples()
            .iter()
            .zip(parallel.image.samples())
            .map(|(a, b)| a.abs_diff(*b))
            .filter(|&d| d > 0)
            .fold((0usize, 0u16), |(count, max), d| (count + 1, max.max(d)));

        // Differently shaped outputs never match.
        let shape_differs = serial.image.samples().len() != parallel.image.samples().len();
        let mismatched_samples = if shape_differs {
            serial.image.samples().len().max(parallel.image.samples().len())
        } else {
            mismatched_samples
        };

        Self {
            serial,
            parallel,
            mismatched_samples,
            max_difference,
        }
    }

    /// Serial time divided by parallel time.
    pub fn speedup(&self) -> f64 {
        let parallel = self.parallel.report.total().as_secs_f64();
        if parallel == 0.0 {
            return f64::INFINITY;
        }
        self.serial.report.total().as_secs_f64() / parallel
    }

    pub fn is_identical(&self) -> bool {
        self.mismatched_samples == 0
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.serial.report)?;
        writeln!(f, "{}", self.parallel.report)?;
        if self.is_identical() {
            writeln!(f, "outputs identical")?;
        } else {
            writeln!(
                f,
                "outputs differ in {} samples (max difference {})",
                self.mismatched_samples, self.max_difference
            )?;
        }
        write!(f, "speedup {:.2}x", self.speedup())
    }
}
