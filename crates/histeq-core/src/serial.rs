//! Serial reference implementation.
//!
//! Straight sequential loops for every stage, sharing the per-sample
//! arithmetic with the device kernels. The integer path is bit-identical to
//! the parallel pipeline and serves as its oracle and benchmark baseline.

use tracing::{info, warn};

use crate::buffer::PixelBuffer;
use crate::clock::Instant;
use crate::color::{lightness_level, HslPlanes};
use crate::error::{EqualiseError, Result};
use crate::histogram::{bin_index, check_pixel_count, CumulativeHistogram, Histogram};
use crate::normalise::{lut_entry, LookupTable};
use crate::report::{ChannelReport, EqualisationReport, Equalised, Stage, StageTiming, Staged};
use crate::{Algorithm, ChannelParams, EqualisationConfig};

/// Name reported as the device of serial runs.
pub const SERIAL_DEVICE: &str = "host (serial)";

fn timed<T>(stage: Stage, f: impl FnOnce() -> T) -> Staged<T> {
    let start = Instant::now();
    let value = f();
    Staged::new(value, vec![StageTiming::host(stage, start.elapsed())])
}

/// Count samples per bin.
pub fn build_histogram(channel: &[u16], params: &ChannelParams) -> Histogram {
    let mut counts = vec![0u32; params.bin_count()];
    for &value in channel {
        counts[bin_index(value, params.bin_size)] += 1;
    }
    Histogram::from_counts(counts)
}

/// Running sum of a histogram, accumulated in place.
pub fn cumulative_sum(histogram: Histogram) -> CumulativeHistogram {
    let mut counts = histogram.into_counts();
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }
    CumulativeHistogram::from_counts(counts)
}

/// Scale a cumulative histogram to a lookup table.
pub fn normalise(cumulative: &CumulativeHistogram, params: &ChannelParams) -> LookupTable {
    let total = cumulative.total();
    if total == 0 {
        warn!("cumulative histogram is empty, using identity lookup table");
        return LookupTable::identity(params);
    }
    let entries = cumulative
        .counts()
        .iter()
        .map(|&count| lut_entry(count, total, params.max_value))
        .collect();
    LookupTable::new(entries, params)
}

/// Map every sample through the table.
pub fn backproject(channel: &[u16], lut: &LookupTable) -> Vec<u16> {
    channel.iter().map(|&value| lut.map(value)).collect()
}

/// Equalise a sequence of integer levels through all four stages.
fn equalise_levels(levels: &[u16], params: &ChannelParams) -> Staged<Vec<u16>> {
    let mut timings = Vec::new();
    let histogram = timed(Stage::Histogram, || build_histogram(levels, params)).collect_into(&mut timings);
    let cumulative = timed(Stage::CumulativeSum, || cumulative_sum(histogram)).collect_into(&mut timings);
    let lut = timed(Stage::Normalise, || normalise(&cumulative, params)).collect_into(&mut timings);
    let output = timed(Stage::Backproject, || backproject(levels, &lut)).collect_into(&mut timings);
    Staged::new(output, timings)
}

fn check_image(image: &PixelBuffer) -> Result<()> {
    if image.is_empty() {
        return Err(EqualiseError::EmptyImage);
    }
    check_pixel_count(image.pixel_count())?;
    Ok(())
}

/// Equalise each channel independently.
pub fn equalise(image: &PixelBuffer, config: &EqualisationConfig) -> Result<Equalised> {
    let params = config.validate(image.depth())?;
    check_image(image)?;

    let mut samples = Vec::with_capacity(image.samples().len());
    let mut channels = Vec::with_capacity(image.channels());
    for (channel, plane) in image.planes().enumerate() {
        let staged = equalise_levels(plane, &params);
        channels.push(ChannelReport {
            channel,
            stages: staged.timings,
        });
        samples.extend(staged.value);
    }

    let report = EqualisationReport {
        algorithm: Algorithm::Serial,
        device: SERIAL_DEVICE.to_string(),
        channels,
    };
    info!(total_us = report.total().as_micros() as u64, "serial equalisation complete");
    Ok(Equalised {
        image: image.with_samples(samples)?,
        report,
    })
}

/// Equalise the HSL lightness of an RGB image.
pub fn equalise_hsl(image: &PixelBuffer, config: &EqualisationConfig) -> Result<Equalised> {
    let params = config.validate(image.depth())?;
    check_image(image)?;

    let mut stages = Vec::new();
    let mut planes = timed(Stage::RgbToHsl, || HslPlanes::from_rgb(image))
        .collect_into(&mut stages)?;

    let max = params.max_value;
    let levels: Vec<u16> = planes
        .lightness
        .iter()
        .map(|&l| lightness_level(l, max))
        .collect();
    let equalised = equalise_levels(&levels, &params).collect_into(&mut stages);
    for (l, level) in planes.lightness.iter_mut().zip(equalised) {
        *l = level as f32 / max as f32;
    }

    let output = timed(Stage::HslToRgb, || planes.to_rgb(image)).collect_into(&mut stages)?;
    let report = EqualisationReport {
        algorithm: Algorithm::Serial,
        device: SERIAL_DEVICE.to_string(),
        channels: vec![ChannelReport { channel: 0, stages }],
    };
    Ok(Equalised {
        image: output,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BitDepth;

    fn params(bin_size: u32) -> ChannelParams {
        EqualisationConfig::new(bin_size)
            .validate(BitDepth::Eight)
            .unwrap()
    }

    #[test]
    fn test_scenario_stages() {
        let p = params(1);
        let hist = build_histogram(&[10, 10, 20, 30], &p);
        assert_eq!(hist.counts()[10], 2);
        let cum = cumulative_sum(hist);
        assert_eq!(cum.counts()[10], 2);
        assert_eq!(cum.counts()[20], 3);
        assert_eq!(cum.counts()[30], 4);
        assert_eq!(cum.total(), 4);
        let lut = normalise(&cum, &p);
        assert_eq!(backproject(&[10, 10, 20, 30], &lut), vec![128, 128, 191, 255]);
    }

    #[test]
    fn test_flat_image_single_output() {
        let image = PixelBuffer::gray(4, 4, BitDepth::Eight, vec![5; 16]).unwrap();
        let out = equalise(&image, &EqualisationConfig::default()).unwrap();
        assert!(out.image.samples().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_each_channel_has_four_stages() {
        let image = PixelBuffer::new(2, 1, 3, BitDepth::Eight, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let out = equalise(&image, &EqualisationConfig::default()).unwrap();
        assert_eq!(out.report.channels.len(), 3);
        for channel in &out.report.channels {
            let stages: Vec<Stage> = channel.stages.iter().map(|t| t.stage).collect();
            assert_eq!(
                stages,
                vec![
                    Stage::Histogram,
                    Stage::CumulativeSum,
                    Stage::Normalise,
                    Stage::Backproject
                ]
            );
            assert!(channel.stages.iter().all(|t| t.kernel.is_none()));
        }
    }

    #[test]
    fn test_empty_image_rejected() {
        let image = PixelBuffer::gray(0, 3, BitDepth::Eight, vec![]).unwrap();
        assert!(matches!(
            equalise(&image, &EqualisationConfig::default()),
            Err(EqualiseError::EmptyImage)
        ));
    }

    #[test]
    fn test_bad_bin_size_rejected_first() {
        let image = PixelBuffer::gray(0, 0, BitDepth::Eight, vec![]).unwrap();
        assert!(matches!(
            equalise(&image, &EqualisationConfig::new(0)),
            Err(EqualiseError::InvalidBinSize { .. })
        ));
    }

    #[test]
    fn test_hsl_keeps_gray_gray() {
        let image = PixelBuffer::new(
            2,
            1,
            3,
            BitDepth::Eight,
            vec![50, 100, 50, 100, 50, 100],
        )
        .unwrap();
        let out = equalise_hsl(&image, &EqualisationConfig::default()).unwrap();
        let px = out.image.to_interleaved();
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        assert_eq!(px[3], px[4]);
        assert_eq!(px[4], px[5]);
        // the brighter pixel maps to full lightness
        assert_eq!(px[3], 255);
    }
}
