//! Compute device abstraction.
//!
//! A [`ComputeDevice`] owns a context with a single in-order command queue.
//! Buffers live on the device and are addressed through typed
//! [`DeviceBuffer`] handles; kernels are launched by name over an
//! [`NdRange`] with positional [`KernelArg`]s, and every launch returns a
//! [`KernelEvent`] carrying its queued/start/end timestamps.
//!
//! The crate ships one backend, [`HostDevice`], which executes kernels on a
//! rayon thread pool. Platform and device enumeration lives in [`registry`].

mod host;
pub mod registry;

pub use host::HostDevice;
pub(crate) use host::{ArgList, BufferPool};
pub use registry::{platforms, select_device, PlatformInfo};

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Instant;
use crate::error::DeviceError;
use crate::kernels::KernelName;

/// Opaque identifier of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How kernels may access a buffer. Host transfers are always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl BufferAccess {
    /// Check if kernels may write to a buffer with this access.
    #[inline]
    pub fn kernel_writable(self) -> bool {
        !matches!(self, BufferAccess::ReadOnly)
    }
}

/// Element type tag of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    U16,
    U32,
    F32,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::U16 => "u16",
            ElementKind::U32 => "u32",
            ElementKind::F32 => "f32",
        };
        f.write_str(name)
    }
}

/// Contents of a device buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl Storage {
    /// Element type held by this storage.
    pub fn kind(&self) -> ElementKind {
        match self {
            Storage::U16(_) => ElementKind::U16,
            Storage::U32(_) => ElementKind::U32,
            Storage::F32(_) => ElementKind::F32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Storage::U16(v) => v.len(),
            Storage::U32(v) => v.len(),
            Storage::F32(v) => v.len(),
        }
    }

    /// Check if the storage holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod sealed {
    use super::Storage;

    pub trait Sealed: Sized {
        fn zeroed(len: usize) -> Storage;
        fn slice(storage: &Storage) -> Option<&[Self]>;
        fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]>;
    }
}

/// Element types that can live in a device buffer.
pub trait DeviceElement: sealed::Sealed + Copy + Default + Send + Sync + 'static {
    const KIND: ElementKind;
}

macro_rules! device_element {
    ($ty:ty, $variant:ident) => {
        impl sealed::Sealed for $ty {
            fn zeroed(len: usize) -> Storage {
                Storage::$variant(vec![<$ty>::default(); len])
            }

            fn slice(storage: &Storage) -> Option<&[Self]> {
                match storage {
                    Storage::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
                match storage {
                    Storage::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl DeviceElement for $ty {
            const KIND: ElementKind = ElementKind::$variant;
        }
    };
}

device_element!(u16, U16);
device_element!(u32, U32);
device_element!(f32, F32);

/// Typed handle to a buffer owned by a device.
///
/// The buffer is released when the handle is dropped.
pub struct DeviceBuffer<T: DeviceElement> {
    id: BufferId,
    len: usize,
    access: BufferAccess,
    pool: Arc<BufferPool>,
    _marker: PhantomData<T>,
}

impl<T: DeviceElement> DeviceBuffer<T> {
    pub(crate) fn new(id: BufferId, len: usize, access: BufferAccess, pool: Arc<BufferPool>) -> Self {
        Self {
            id,
            len,
            access,
            pool,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn access(&self) -> BufferAccess {
        self.access
    }

    /// Kernel argument binding this buffer.
    pub fn arg(&self) -> KernelArg {
        KernelArg::Buffer(self.id)
    }
}

impl<T: DeviceElement> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}

impl<T: DeviceElement> fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("id", &self.id)
            .field("kind", &T::KIND)
            .field("len", &self.len)
            .field("access", &self.access)
            .finish()
    }
}

/// A positional kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg {
    /// A device buffer.
    Buffer(BufferId),
    /// A 32-bit unsigned scalar.
    Uint(u32),
    /// Work-group local scratch memory, sized in elements.
    Local(usize),
}

impl From<u32> for KernelArg {
    fn from(value: u32) -> Self {
        KernelArg::Uint(value)
    }
}

impl<T: DeviceElement> From<&DeviceBuffer<T>> for KernelArg {
    fn from(buffer: &DeviceBuffer<T>) -> Self {
        buffer.arg()
    }
}

/// Launch geometry: global offset, global size and optional work-group size.
///
/// When `local` is `None` the device picks a work-group size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    pub offset: usize,
    pub global: usize,
    pub local: Option<usize>,
}

impl NdRange {
    pub fn new(global: usize) -> Self {
        Self {
            offset: 0,
            global,
            local: None,
        }
    }

    pub fn with_local(mut self, local: usize) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Profiling record of a completed kernel launch.
#[derive(Debug, Clone, Copy)]
pub struct KernelEvent {
    pub kernel: KernelName,
    pub global: usize,
    pub local: usize,
    pub queued: Instant,
    pub started: Instant,
    pub ended: Instant,
}

impl KernelEvent {
    /// Execution time from start to end.
    pub fn elapsed(&self) -> Duration {
        self.ended.saturating_duration_since(self.started)
    }

    /// Time spent waiting in the queue before execution started.
    pub fn queue_delay(&self) -> Duration {
        self.started.saturating_duration_since(self.queued)
    }
}

/// Properties reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub platform: String,
    pub name: String,
    pub compute_units: usize,
    pub max_work_group_size: usize,
    pub preferred_work_group_multiple: usize,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} ({} compute units, max work-group {})",
            self.platform, self.name, self.compute_units, self.max_work_group_size
        )
    }
}

/// A data-parallel compute device with one in-order queue.
pub trait ComputeDevice {
    fn info(&self) -> &DeviceInfo;

    /// Preferred work-group size multiple for a kernel.
    fn preferred_work_group_multiple(&self, kernel: KernelName) -> usize;

    /// Largest work-group size the device accepts.
    fn max_work_group_size(&self) -> usize;

    /// Allocate a zero-initialised buffer of `len` elements.
    fn create_buffer<T: DeviceElement>(
        &self,
        len: usize,
        access: BufferAccess,
    ) -> Result<DeviceBuffer<T>, DeviceError>;

    /// Copy `data` into the buffer starting at element 0.
    fn write_buffer<T: DeviceElement>(
        &self,
        buffer: &DeviceBuffer<T>,
        data: &[T],
    ) -> Result<(), DeviceError>;

    /// Set every element of the buffer to `value`.
    fn fill_buffer<T: DeviceElement>(
        &self,
        buffer: &DeviceBuffer<T>,
        value: T,
    ) -> Result<(), DeviceError>;

    /// Copy the first `out.len()` elements of the buffer into `out`.
    fn read_buffer<T: DeviceElement>(
        &self,
        buffer: &DeviceBuffer<T>,
        out: &mut [T],
    ) -> Result<(), DeviceError>;

    /// Launch a kernel and wait for it to complete.
    fn enqueue_kernel(
        &self,
        kernel: KernelName,
        range: NdRange,
        args: &[KernelArg],
    ) -> Result<KernelEvent, DeviceError>;

    /// Allocate a buffer and upload `data` into it.
    fn upload<T: DeviceElement>(
        &self,
        data: &[T],
        access: BufferAccess,
    ) -> Result<DeviceBuffer<T>, DeviceError> {
        let buffer = self.create_buffer(data.len(), access)?;
        self.write_buffer(&buffer, data)?;
        Ok(buffer)
    }

    /// Read the first `len` elements of a buffer into a new vector.
    fn download<T: DeviceElement>(
        &self,
        buffer: &DeviceBuffer<T>,
        len: usize,
    ) -> Result<Vec<T>, DeviceError> {
        let mut out = vec![T::default(); len];
        self.read_buffer(buffer, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_writability() {
        assert!(!BufferAccess::ReadOnly.kernel_writable());
        assert!(BufferAccess::WriteOnly.kernel_writable());
        assert!(BufferAccess::ReadWrite.kernel_writable());
    }

    #[test]
    fn test_sealed_views_match_kind() {
        let storage = <u32 as sealed::Sealed>::zeroed(4);
        assert_eq!(storage.kind(), ElementKind::U32);
        assert_eq!(storage.len(), 4);
        assert!(<u32 as sealed::Sealed>::slice(&storage).is_some());
        assert!(<u16 as sealed::Sealed>::slice(&storage).is_none());
    }

    #[test]
    fn test_nd_range_builder() {
        let range = NdRange::new(96).with_local(32).with_offset(32);
        assert_eq!(range.offset, 32);
        assert_eq!(range.global, 96);
        assert_eq!(range.local, Some(32));
    }

    #[test]
    fn test_event_elapsed_is_end_minus_start() {
        let queued = Instant::now();
        let started = queued + Duration::from_micros(5);
        let ended = started + Duration::from_micros(40);
        let event = KernelEvent {
            kernel: KernelName::BlockSum,
            global: 1,
            local: 1,
            queued,
            started,
            ended,
        };
        assert_eq!(event.elapsed(), Duration::from_micros(40));
        assert_eq!(event.queue_delay(), Duration::from_micros(5));
    }
}
