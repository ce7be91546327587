//! Equalisation pipelines on a compute device.
//!
//! Channels are processed one after another. For each channel the four
//! stages run as dependent launches on the device's in-order queue:
//! histogram, cumulative scan, lookup table, backprojection. HSL mode wraps
//! the same stages between an RGB to HSL conversion and its inverse and runs
//! them once, on the lightness plane.

use tracing::{debug, info};

use crate::backproject::{backproject, backproject_lightness};
use crate::buffer::PixelBuffer;
use crate::color::{convert_to_hsl, convert_to_rgb};
use crate::device::ComputeDevice;
use crate::error::{EqualiseError, Result};
use crate::histogram::{build_histogram, build_lightness_histogram, check_pixel_count};
use crate::normalise::normalise;
use crate::report::{ChannelReport, Comparison, EqualisationReport, Equalised, Staged};
use crate::scan::{cumulative_histogram, group_width};
use crate::{serial, Algorithm, ChannelParams, EqualisationConfig};

/// Result of [`run`].
#[derive(Debug, Clone)]
pub enum Outcome {
    Equalised(Equalised),
    /// One comparison for the per-channel path, plus one for HSL on RGB images.
    Compared(Vec<Comparison>),
}

/// Configuration checks done before any device work.
fn prepare<D: ComputeDevice>(
    device: &D,
    image: &PixelBuffer,
    config: &EqualisationConfig,
) -> Result<(ChannelParams, usize)> {
    let params = config.validate(image.depth())?;
    if image.is_empty() {
        return Err(EqualiseError::EmptyImage);
    }
    check_pixel_count(image.pixel_count())?;
    let width = group_width(device, config.group_width)?;
    Ok((params, width))
}

/// Equalise one channel through the four device stages.
pub fn equalise_channel<D: ComputeDevice>(
    device: &D,
    channel: &[u16],
    params: &ChannelParams,
    width: usize,
) -> Result<Staged<Vec<u16>>> {
    let mut timings = Vec::new();
    let histogram = build_histogram(device, channel, params)?.collect_into(&mut timings);
    let cumulative = cumulative_histogram(device, &histogram, Some(width))?.collect_into(&mut timings);
    let lut = normalise(device, &cumulative, params)?.collect_into(&mut timings);
    let output = backproject(device, channel, &lut)?.collect_into(&mut timings);
    Ok(Staged::new(output, timings))
}

/// Equalise every channel of `image` independently on `device`.
///
/// # Errors
///
/// Configuration errors (bin size, empty image, group width, pixel count)
/// are reported before any launch. Device errors abort the run.
pub fn equalise<D: ComputeDevice>(
    device: &D,
    image: &PixelBuffer,
    config: &EqualisationConfig,
) -> Result<Equalised> {
    let (params, width) = prepare(device, image, config)?;
    info!(
        device = %device.info().name,
        width = image.width(),
        height = image.height(),
        channels = image.channels(),
        bins = params.bin_count(),
        group_width = width,
        "parallel equalisation"
    );

    let mut samples = Vec::with_capacity(image.samples().len());
    let mut channels = Vec::with_capacity(image.channels());
    for (channel, plane) in image.planes().enumerate() {
        let staged = equalise_channel(device, plane, &params, width)?;
        let report = ChannelReport {
            channel,
            stages: staged.timings,
        };
        debug!(
            channel,
            total_us = report.total().as_micros() as u64,
            scan_us = report.scan_total().as_micros() as u64,
            "channel equalised"
        );
        channels.push(report);
        samples.extend(staged.value);
    }

    let report = EqualisationReport {
        algorithm: Algorithm::Parallel,
        device: device.info().name.clone(),
        channels,
    };
    info!(
        total_us = report.total().as_micros() as u64,
        launches = report.kernel_launches(),
        "parallel equalisation complete"
    );
    Ok(Equalised {
        image: image.with_samples(samples)?,
        report,
    })
}

/// Equalise only the HSL lightness of an RGB image on `device`.
///
/// Hue and saturation pass through unchanged.
pub fn equalise_hsl<D: ComputeDevice>(
    device: &D,
    image: &PixelBuffer,
    config: &EqualisationConfig,
) -> Result<Equalised> {
    if image.channels() != 3 {
        return Err(EqualiseError::UnsupportedChannelCount(image.channels()));
    }
    let (params, width) = prepare(device, image, config)?;
    info!(
        device = %device.info().name,
        width = image.width(),
        height = image.height(),
        bins = params.bin_count(),
        group_width = width,
        "hsl equalisation"
    );

    let mut stages = Vec::new();
    let hsl = convert_to_hsl(device, image)?.collect_into(&mut stages);
    let histogram = build_lightness_histogram(device, &hsl, &params)?.collect_into(&mut stages);
    let cumulative = cumulative_histogram(device, &histogram, Some(width))?.collect_into(&mut stages);
    let lut = normalise(device, &cumulative, &params)?.collect_into(&mut stages);
    backproject_lightness(device, &hsl, &lut)?.collect_into(&mut stages);
    let output = convert_to_rgb(device, &hsl, image)?.collect_into(&mut stages);

    let report = EqualisationReport {
        algorithm: Algorithm::Hsl,
        device: device.info().name.clone(),
        channels: vec![ChannelReport { channel: 0, stages }],
    };
    info!(
        total_us = report.total().as_micros() as u64,
        launches = report.kernel_launches(),
        "hsl equalisation complete"
    );
    Ok(Equalised {
        image: output,
        report,
    })
}

/// Run the serial and parallel paths on the same image and compare them.
///
/// With `hsl` set the HSL variants are compared instead.
pub fn compare<D: ComputeDevice>(
    device: &D,
    image: &PixelBuffer,
    config: &EqualisationConfig,
    hsl: bool,
) -> Result<Comparison> {
    let comparison = if hsl {
        let serial = serial::equalise_hsl(image, config)?;
        Comparison::new(serial, equalise_hsl(device, image, config)?)
    } else {
        let serial = serial::equalise(image, config)?;
        Comparison::new(serial, equalise(device, image, config)?)
    };
    info!(
        hsl,
        identical = comparison.is_identical(),
        mismatched = comparison.mismatched_samples,
        speedup = comparison.speedup(),
        "comparison complete"
    );
    Ok(comparison)
}

/// Run the chosen algorithm.
///
/// [`Algorithm::Compare`] compares the per-channel paths, and for
/// three-channel images the HSL paths as well.
pub fn run<D: ComputeDevice>(
    device: &D,
    image: &PixelBuffer,
    config: &EqualisationConfig,
    algorithm: Algorithm,
) -> Result<Outcome> {
    match algorithm {
        Algorithm::Serial => serial::equalise(image, config).map(Outcome::Equalised),
        Algorithm::Parallel => equalise(device, image, config).map(Outcome::Equalised),
        Algorithm::Hsl => equalise_hsl(device, image, config).map(Outcome::Equalised),
        Algorithm::Compare => {
            let mut comparisons = vec![compare(device, image, config, false)?];
            if image.channels() == 3 {
                comparisons.push(compare(device, image, config, true)?);
            }
            Ok(Outcome::Compared(comparisons))
        }
    }
}
