//! Error types for device access and the equalisation pipeline.

use thiserror::Error;

use crate::device::{BufferId, ElementKind};

/// Errors raised by a compute device while managing buffers or launching kernels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The buffer handle does not refer to a live buffer.
    #[error("Unknown buffer {0}")]
    UnknownBuffer(BufferId),

    /// The buffer is currently bound to a running kernel.
    #[error("Buffer {0} is already bound to a kernel launch")]
    BufferInUse(BufferId),

    /// A buffer holds a different element type than requested.
    #[error("Buffer {id} holds {actual} elements, {expected} requested")]
    TypeMismatch {
        id: BufferId,
        expected: ElementKind,
        actual: ElementKind,
    },

    /// A transfer or kernel access falls outside a buffer.
    #[error("Access to [{start}, {end}) is outside a buffer of {len} elements")]
    OutOfRange { start: usize, end: usize, len: usize },

    /// The launch geometry is not valid for the kernel or device.
    #[error("Invalid NDRange for {kernel}: {reason}")]
    InvalidRange { kernel: String, reason: String },

    /// A kernel tried to write to a buffer created read-only.
    #[error("Kernel {kernel} cannot write to read-only buffer {id}")]
    ReadOnlyBuffer { kernel: String, id: BufferId },

    /// No kernel with this name exists in the device's program.
    #[error("Kernel not found: {0}")]
    KernelNotFound(String),

    /// An argument has the wrong kind or an invalid value.
    #[error("Bad argument {index} for {kernel}: {reason}")]
    BadArgument {
        kernel: String,
        index: usize,
        reason: String,
    },

    /// The requested platform or device does not exist.
    #[error("No device {device} on platform {platform}")]
    DeviceNotFound { platform: usize, device: usize },

    /// The device could not be brought up.
    #[error("Device unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while configuring or running an equalisation.
#[derive(Debug, Error)]
pub enum EqualiseError {
    /// Bin size must lie in `1..=max_value + 1`.
    #[error("Invalid bin size {bin_size}: must be between 1 and {limit}")]
    InvalidBinSize { bin_size: u32, limit: u32 },

    /// Scan work-group width is zero, one, or larger than the device allows.
    #[error("Invalid work-group width {width}: must be between 2 and {limit}")]
    InvalidGroupWidth { width: usize, limit: usize },

    /// The image has zero pixels.
    #[error("Image has no pixels")]
    EmptyImage,

    /// A prefix scan was requested over no values.
    #[error("Cannot scan an empty sequence")]
    EmptyScanInput,

    /// Pixel counts must fit the 32-bit histogram counters.
    #[error("Channel holds {count} pixels, more than a 32-bit counter can hold")]
    TooManyPixels { count: usize },

    /// HSL equalisation is defined for three-channel images only.
    #[error("HSL equalisation needs 3 channels, image has {0}")]
    UnsupportedChannelCount(usize),

    /// A sample buffer does not match the declared geometry.
    #[error("Sample buffer holds {actual} samples, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// A sample exceeds the maximum of its bit depth.
    #[error("Sample value {value} exceeds the maximum {max} of the bit depth")]
    SampleOutOfRange { value: u16, max: u16 },

    /// The device rejected a buffer operation or kernel launch.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EqualiseError>;
