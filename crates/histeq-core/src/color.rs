//! RGB and HSL conversion.
//!
//! Hue is in degrees (0.0-360.0); saturation and lightness are 0.0-1.0.
//! Only lightness is equalised in HSL mode: it is quantised to an integer
//! level `round(L * max)` so the integer histogram stages apply unchanged,
//! and the remapped level is scaled back to 0.0-1.0 afterwards.

use crate::buffer::PixelBuffer;
use crate::device::{BufferAccess, ComputeDevice, DeviceBuffer, KernelArg, NdRange};
use crate::error::{EqualiseError, Result};
use crate::histogram::check_pixel_count;
use crate::kernels::KernelName;
use crate::report::{Stage, StageTiming, Staged};

/// HSL color value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    /// Hue in degrees (0.0-360.0)
    pub h: f32,
    /// Saturation (0.0-1.0)
    pub s: f32,
    /// Lightness (0.0-1.0)
    pub l: f32,
}

/// Convert a normalised RGB triple to HSL.
#[inline]
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> Hsl {
    let r = r.clamp(0.0, 1.0);
    let g = g.clamp(0.0, 1.0);
    let b = b.clamp(0.0, 1.0);

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;
    let l = (max + min) / 2.0;

    if chroma < 1e-6 {
        return Hsl { h: 0.0, s: 0.0, l };
    }

    let s = if l < 0.5 {
        chroma / (max + min)
    } else {
        chroma / (2.0 - max - min)
    };

    let h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / chroma;
        if g < b {
            h += 6.0;
        }
        h * 60.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / chroma + 2.0) * 60.0
    } else {
        ((r - g) / chroma + 4.0) * 60.0
    };

    Hsl { h: h % 360.0, s, l }
}

/// Convert HSL back to a normalised RGB triple.
#[inline]
pub fn hsl_to_rgb(hsl: Hsl) -> (f32, f32, f32) {
    let s = hsl.s.clamp(0.0, 1.0);
    let l = hsl.l.clamp(0.0, 1.0);

    if s < 1e-6 {
        return (l, l, l);
    }

    let h = hsl.h.rem_euclid(360.0) / 360.0;
    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

#[inline]
fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }

    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Integer level of a lightness value, in `0..=max`.
#[inline]
pub fn lightness_level(l: f32, max: u16) -> u16 {
    to_sample(l, max)
}

/// Quantise a 0.0-1.0 value to a sample in `0..=max`.
#[inline]
pub fn to_sample(value: f32, max: u16) -> u16 {
    (value.clamp(0.0, 1.0) * max as f32).round() as u16
}

fn require_rgb(image: &PixelBuffer) -> Result<()> {
    if image.channels() != 3 {
        return Err(EqualiseError::UnsupportedChannelCount(image.channels()));
    }
    Ok(())
}

/// Host-side HSL planes of an RGB image.
#[derive(Debug, Clone, PartialEq)]
pub struct HslPlanes {
    pub hue: Vec<f32>,
    pub saturation: Vec<f32>,
    pub lightness: Vec<f32>,
}

impl HslPlanes {
    /// Convert an RGB image pixel by pixel.
    pub fn from_rgb(image: &PixelBuffer) -> Result<Self> {
        require_rgb(image)?;
        let max = image.max_value() as f32;
        let (r, g, b) = (image.channel(0), image.channel(1), image.channel(2));

        let n = image.pixel_count();
        let mut planes = Self {
            hue: Vec::with_capacity(n),
            saturation: Vec::with_capacity(n),
            lightness: Vec::with_capacity(n),
        };
        for p in 0..n {
            let hsl = rgb_to_hsl(r[p] as f32 / max, g[p] as f32 / max, b[p] as f32 / max);
            planes.hue.push(hsl.h);
            planes.saturation.push(hsl.s);
            planes.lightness.push(hsl.l);
        }
        Ok(planes)
    }

    /// Split a channel-major `[H.., S.., L..]` buffer.
    pub fn from_channel_major(data: &[f32], pixel_count: usize) -> Result<Self> {
        if data.len() != 3 * pixel_count {
            return Err(EqualiseError::ShapeMismatch {
                expected: 3 * pixel_count,
                actual: data.len(),
            });
        }
        Ok(Self {
            hue: data[..pixel_count].to_vec(),
            saturation: data[pixel_count..2 * pixel_count].to_vec(),
            lightness: data[2 * pixel_count..].to_vec(),
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.lightness.len()
    }

    /// Convert back to an RGB image shaped like `like`.
    pub fn to_rgb(&self, like: &PixelBuffer) -> Result<PixelBuffer> {
        require_rgb(like)?;
        let n = like.pixel_count();
        if self.pixel_count() != n {
            return Err(EqualiseError::ShapeMismatch {
                expected: n,
                actual: self.pixel_count(),
            });
        }

        let max = like.max_value();
        let mut samples = vec![0u16; 3 * n];
        for p in 0..n {
            let (r, g, b) = hsl_to_rgb(Hsl {
                h: self.hue[p],
                s: self.saturation[p],
                l: self.lightness[p],
            });
            samples[p] = to_sample(r, max);
            samples[n + p] = to_sample(g, max);
            samples[2 * n + p] = to_sample(b, max);
        }
        like.with_samples(samples)
    }
}

/// An HSL image resident on a device as one channel-major `f32` buffer.
#[derive(Debug)]
pub struct DeviceHsl {
    buffer: DeviceBuffer<f32>,
    pixel_count: usize,
}

impl DeviceHsl {
    pub fn buffer(&self) -> &DeviceBuffer<f32> {
        &self.buffer
    }

    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Copy the planes back to the host.
    pub fn read<D: ComputeDevice>(&self, device: &D) -> Result<HslPlanes> {
        let data = device.download(&self.buffer, 3 * self.pixel_count)?;
        HslPlanes::from_channel_major(&data, self.pixel_count)
    }
}

/// Upload an RGB image and convert it to HSL on the device.
pub fn convert_to_hsl<D: ComputeDevice>(
    device: &D,
    image: &PixelBuffer,
) -> Result<Staged<DeviceHsl>> {
    require_rgb(image)?;
    let n = image.pixel_count();
    let pixel_count = check_pixel_count(n)?;

    let rgb = device.upload(image.samples(), BufferAccess::ReadOnly)?;
    let hsl = device.create_buffer::<f32>(3 * n, BufferAccess::ReadWrite)?;

    let event = device.enqueue_kernel(
        KernelName::RgbToHsl,
        NdRange::new(n),
        &[
            rgb.arg(),
            hsl.arg(),
            KernelArg::Uint(image.max_value() as u32),
            KernelArg::Uint(pixel_count),
        ],
    )?;

    Ok(Staged::new(
        DeviceHsl {
            buffer: hsl,
            pixel_count: n,
        },
        vec![StageTiming::from_event(Stage::RgbToHsl, &event)],
    ))
}

/// Convert a device HSL image back to RGB, shaped like `like`.
pub fn convert_to_rgb<D: ComputeDevice>(
    device: &D,
    hsl: &DeviceHsl,
    like: &PixelBuffer,
) -> Result<Staged<PixelBuffer>> {
    require_rgb(like)?;
    let n = like.pixel_count();
    if hsl.pixel_count() != n {
        return Err(EqualiseError::ShapeMismatch {
            expected: n,
            actual: hsl.pixel_count(),
        });
    }
    let pixel_count = check_pixel_count(n)?;

    let rgb = device.create_buffer::<u16>(3 * n, BufferAccess::WriteOnly)?;
    let event = device.enqueue_kernel(
        KernelName::HslToRgb,
        NdRange::new(n),
        &[
            hsl.buffer().arg(),
            rgb.arg(),
            KernelArg::Uint(like.max_value() as u32),
            KernelArg::Uint(pixel_count),
        ],
    )?;
    let samples = device.download(&rgb, 3 * n)?;

    Ok(Staged::new(
        like.with_samples(samples)?,
        vec![StageTiming::from_event(Stage::HslToRgb, &event)],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BitDepth;
    use crate::device::HostDevice;

    fn assert_close(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() < eps, "{a} vs {b}");
    }

    #[test]
    fn test_primaries() {
        let red = rgb_to_hsl(1.0, 0.0, 0.0);
        assert_close(red.h, 0.0, 1e-4);
        assert_close(red.s, 1.0, 1e-4);
        assert_close(red.l, 0.5, 1e-4);

        let green = rgb_to_hsl(0.0, 1.0, 0.0);
        assert_close(green.h, 120.0, 1e-3);

        let blue = rgb_to_hsl(0.0, 0.0, 1.0);
        assert_close(blue.h, 240.0, 1e-3);
    }

    #[test]
    fn test_gray_is_achromatic() {
        let gray = rgb_to_hsl(0.4, 0.4, 0.4);
        assert_eq!(gray.h, 0.0);
        assert_eq!(gray.s, 0.0);
        assert_close(gray.l, 0.4, 1e-6);
        assert_eq!(hsl_to_rgb(gray), (0.4, 0.4, 0.4));
    }

    #[test]
    fn test_magenta_hue_wraps() {
        // g < b on the red maximum branch
        let hsl = rgb_to_hsl(1.0, 0.0, 0.5);
        assert_close(hsl.h, 330.0, 1e-3);
    }

    #[test]
    fn test_lightness_level() {
        assert_eq!(lightness_level(0.0, 255), 0);
        assert_eq!(lightness_level(1.0, 255), 255);
        assert_eq!(lightness_level(0.5, 255), 128);
        assert_eq!(lightness_level(1.5, 255), 255);
        assert_eq!(lightness_level(-0.1, 65535), 0);
    }

    #[test]
    fn test_hsl_requires_three_channels() {
        let gray = PixelBuffer::gray(2, 1, BitDepth::Eight, vec![0, 1]).unwrap();
        assert!(matches!(
            HslPlanes::from_rgb(&gray),
            Err(EqualiseError::UnsupportedChannelCount(1))
        ));
        let device = HostDevice::new();
        assert!(convert_to_hsl(&device, &gray).is_err());
    }

    #[test]
    fn test_device_matches_host_planes() {
        let image = PixelBuffer::new(
            3,
            1,
            3,
            BitDepth::Eight,
            vec![255, 10, 90, 0, 200, 90, 0, 30, 90],
        )
        .unwrap();
        let device = HostDevice::new();
        let on_device = convert_to_hsl(&device, &image).unwrap().value;
        let planes = on_device.read(&device).unwrap();
        assert_eq!(planes, HslPlanes::from_rgb(&image).unwrap());

        let back = convert_to_rgb(&device, &on_device, &image).unwrap().value;
        assert_eq!(back, planes.to_rgb(&image).unwrap());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::buffer::BitDepth;
    use proptest::prelude::*;

    proptest! {
        /// Property: RGB -> HSL -> RGB reproduces 8-bit input within one level.
        #[test]
        fn prop_round_trip_8bit(r in 0u16..=255, g in 0u16..=255, b in 0u16..=255) {
            let image = PixelBuffer::new(1, 1, 3, BitDepth::Eight, vec![r, g, b]).unwrap();
            let back = HslPlanes::from_rgb(&image).unwrap().to_rgb(&image).unwrap();
            for (a, b) in back.samples().iter().zip(image.samples()) {
                prop_assert!(a.abs_diff(*b) <= 1, "{} vs {}", a, b);
            }
        }

        /// Property: RGB -> HSL -> RGB reproduces 16-bit input within a
        /// small number of levels.
        #[test]
        fn prop_round_trip_16bit(r in any::<u16>(), g in any::<u16>(), b in any::<u16>()) {
            let image = PixelBuffer::new(1, 1, 3, BitDepth::Sixteen, vec![r, g, b]).unwrap();
            let back = HslPlanes::from_rgb(&image).unwrap().to_rgb(&image).unwrap();
            for (a, b) in back.samples().iter().zip(image.samples()) {
                prop_assert!(a.abs_diff(*b) <= 8, "{} vs {}", a, b);
            }
        }
    }
}
