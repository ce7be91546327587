//! Channel-major pixel buffers at 8-bit or 16-bit depth.
//!
//! Every stage of the pipeline borrows one channel at a time, so samples are
//! stored plane by plane: all samples of channel 0, then channel 1, and so on.
//! Both depths use `u16` storage; 8-bit samples simply stay within 0-255.

use serde::{Deserialize, Serialize};

use crate::error::{EqualiseError, Result};

/// Sample depth of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitDepth {
    /// 8 bits per sample (0-255).
    #[default]
    Eight,
    /// 16 bits per sample (0-65535).
    Sixteen,
}

impl BitDepth {
    /// Largest representable sample value.
    #[inline]
    pub fn max_value(self) -> u16 {
        match self {
            BitDepth::Eight => u8::MAX as u16,
            BitDepth::Sixteen => u16::MAX,
        }
    }

    /// Number of bits per sample.
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }
}

/// An image held as channel-major samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: usize,
    depth: BitDepth,
    samples: Vec<u16>,
}

impl PixelBuffer {
    /// Create a buffer from channel-major samples.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if `samples.len() != width * height * channels`
    /// and `SampleOutOfRange` if any sample exceeds the depth's maximum.
    pub fn new(
        width: u32,
        height: u32,
        channels: usize,
        depth: BitDepth,
        samples: Vec<u16>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * channels;
        if samples.len() != expected {
            return Err(EqualiseError::ShapeMismatch {
                expected,
                actual: samples.len(),
            });
        }

        let max = depth.max_value();
        if let Some(&value) = samples.iter().find(|&&v| v > max) {
            return Err(EqualiseError::SampleOutOfRange { value, max });
        }

        Ok(Self {
            width,
            height,
            channels,
            depth,
            samples,
        })
    }

    /// Create a buffer from interleaved samples (`c0 c1 c2 c0 c1 c2 ...`).
    pub fn from_interleaved(
        width: u32,
        height: u32,
        channels: usize,
        depth: BitDepth,
        interleaved: &[u16],
    ) -> Result<Self> {
        let pixel_count = width as usize * height as usize;
        let expected = pixel_count * channels;
        if interleaved.len() != expected {
            return Err(EqualiseError::ShapeMismatch {
                expected,
                actual: interleaved.len(),
            });
        }

        let mut samples = vec![0u16; expected];
        for (pixel, chunk) in interleaved.chunks_exact(channels.max(1)).enumerate() {
            for (channel, &value) in chunk.iter().enumerate() {
                samples[channel * pixel_count + pixel] = value;
            }
        }

        Self::new(width, height, channels, depth, samples)
    }

    /// Build a single-channel (grayscale) buffer.
    pub fn gray(width: u32, height: u32, depth: BitDepth, samples: Vec<u16>) -> Result<Self> {
        Self::new(width, height, 1, depth, samples)
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of channels (1 for grayscale, 3 for RGB).
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Sample depth.
    pub fn depth(&self) -> BitDepth {
        self.depth
    }

    /// Largest representable sample value for this buffer's depth.
    pub fn max_value(&self) -> u16 {
        self.depth.max_value()
    }

    /// Number of pixels in one channel.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// All samples, channel-major.
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Consume the buffer and return its channel-major samples.
    pub fn into_samples(self) -> Vec<u16> {
        self.samples
    }

    /// Borrow one channel's samples.
    ///
    /// # Panics
    ///
    /// Panics if `channel >= self.channels()`.
    pub fn channel(&self, channel: usize) -> &[u16] {
        let n = self.pixel_count();
        &self.samples[channel * n..(channel + 1) * n]
    }

    /// Iterate over the channel planes in order.
    pub fn planes(&self) -> impl Iterator<Item = &[u16]> {
        self.samples.chunks(self.pixel_count().max(1)).take(self.channels)
    }

    /// Check if the buffer has no pixels.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples re-ordered pixel by pixel for encoders.
    pub fn to_interleaved(&self) -> Vec<u16> {
        let n = self.pixel_count();
        let mut out = Vec::with_capacity(self.samples.len());
        for pixel in 0..n {
            for channel in 0..self.channels {
                out.push(self.samples[channel * n + pixel]);
            }
        }
        out
    }

    /// Build a buffer with the same geometry and depth but new samples.
    pub(crate) fn with_samples(&self, samples: Vec<u16>) -> Result<Self> {
        Self::new(self.width, self.height, self.channels, self.depth, samples)
    }
}
