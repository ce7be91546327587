//! Host backend: kernels run on a rayon thread pool.
//!
//! Buffers live in a shared [`BufferPool`]. For the duration of a launch the
//! bound buffers are checked out of the pool and handed to the kernel as
//! plain slices, so binding the same buffer twice in one launch, or touching
//! it from the host mid-launch, is reported as [`DeviceError::BufferInUse`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, trace};

use super::{
    BufferAccess, BufferId, ComputeDevice, DeviceBuffer, DeviceElement, DeviceInfo, KernelArg,
    KernelEvent, NdRange, Storage,
};
use crate::clock::Instant;
use crate::error::DeviceError;
use crate::kernels::{self, KernelName, WorkRange};

/// Default preferred work-group multiple of the host device.
pub const DEFAULT_PREFERRED_MULTIPLE: usize = 64;

/// Default maximum work-group size of the host device.
pub const DEFAULT_MAX_WORK_GROUP: usize = 1024;

struct Slot {
    access: BufferAccess,
    /// `None` while the buffer is bound to a launch.
    storage: Option<Storage>,
}

/// Storage shared between a device and its buffer handles.
#[derive(Default)]
pub(crate) struct BufferPool {
    slots: Mutex<HashMap<BufferId, Slot>>,
    next_id: AtomicU64,
}

impl BufferPool {
    fn lock(&self) -> MutexGuard<'_, HashMap<BufferId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, storage: Storage, access: BufferAccess) -> BufferId {
        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(
            id,
            Slot {
                access,
                storage: Some(storage),
            },
        );
        id
    }

    pub(crate) fn release(&self, id: BufferId) {
        self.lock().remove(&id);
    }

    /// Number of live buffers.
    pub(crate) fn live(&self) -> usize {
        self.lock().len()
    }

    fn with_storage<R>(
        &self,
        id: BufferId,
        f: impl FnOnce(&mut Storage) -> Result<R, DeviceError>,
    ) -> Result<R, DeviceError> {
        let mut slots = self.lock();
        let slot = slots.get_mut(&id).ok_or(DeviceError::UnknownBuffer(id))?;
        let storage = slot.storage.as_mut().ok_or(DeviceError::BufferInUse(id))?;
        f(storage)
    }

    fn checkout(&self, id: BufferId) -> Result<Held, DeviceError> {
        let mut slots = self.lock();
        let slot = slots.get_mut(&id).ok_or(DeviceError::UnknownBuffer(id))?;
        let storage = slot.storage.take().ok_or(DeviceError::BufferInUse(id))?;
        Ok(Held {
            id,
            access: slot.access,
            storage,
        })
    }

    fn checkin(&self, held: Vec<Held>) {
        let mut slots = self.lock();
        for Held { id, storage, .. } in held {
            // A handle dropped mid-launch has already removed its slot.
            if let Some(slot) = slots.get_mut(&id) {
                slot.storage = Some(storage);
            }
        }
    }
}

struct Held {
    id: BufferId,
    access: BufferAccess,
    storage: Storage,
}

enum ArgItem<'a> {
    Buffer {
        id: BufferId,
        access: BufferAccess,
        storage: &'a mut Storage,
    },
    Uint(u32),
    Local(usize),
    Taken,
}

/// Arguments of one launch, resolved to host slices.
///
/// Each buffer argument can be borrowed once, either as input or output.
pub(crate) struct ArgList<'a> {
    kernel: KernelName,
    items: Vec<ArgItem<'a>>,
}

impl<'a> ArgList<'a> {
    fn bad(&self, index: usize, reason: impl Into<String>) -> DeviceError {
        DeviceError::BadArgument {
            kernel: self.kernel.to_string(),
            index,
            reason: reason.into(),
        }
    }

    fn take_buffer(
        &mut self,
        index: usize,
    ) -> Result<(BufferId, BufferAccess, &'a mut Storage), DeviceError> {
        if index >= self.items.len() {
            return Err(self.bad(index, "missing argument"));
        }
        match std::mem::replace(&mut self.items[index], ArgItem::Taken) {
            ArgItem::Buffer {
                id,
                access,
                storage,
            } => Ok((id, access, storage)),
            ArgItem::Taken => Err(self.bad(index, "buffer bound twice")),
            _ => Err(self.bad(index, "expected a buffer")),
        }
    }

    /// Borrow a buffer argument for reading.
    pub(crate) fn input<T: DeviceElement>(
        &mut self,
        index: usize,
    ) -> Result<&'a [T], DeviceError> {
        let (id, _, storage) = self.take_buffer(index)?;
        let actual = storage.kind();
        match T::slice_mut(storage) {
            Some(slice) => Ok(slice),
            None => Err(DeviceError::TypeMismatch {
                id,
                expected: T::KIND,
                actual,
            }),
        }
    }

    /// Borrow a buffer argument for writing.
    pub(crate) fn output<T: DeviceElement>(
        &mut self,
        index: usize,
    ) -> Result<&'a mut [T], DeviceError> {
        let (id, access, storage) = self.take_buffer(index)?;
        if !access.kernel_writable() {
            return Err(DeviceError::ReadOnlyBuffer {
                kernel: self.kernel.to_string(),
                id,
            });
        }
        let actual = storage.kind();
        T::slice_mut(storage).ok_or(DeviceError::TypeMismatch {
            id,
            expected: T::KIND,
            actual,
        })
    }

    /// Read a scalar argument.
    pub(crate) fn uint(&self, index: usize) -> Result<u32, DeviceError> {
        match self.items.get(index) {
            Some(ArgItem::Uint(value)) => Ok(*value),
            _ => Err(self.bad(index, "expected a uint scalar")),
        }
    }

    /// Read a local-memory argument, in elements.
    pub(crate) fn local(&self, index: usize) -> Result<usize, DeviceError> {
        match self.items.get(index) {
            Some(ArgItem::Local(len)) => Ok(*len),
            _ => Err(self.bad(index, "expected local memory")),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

/// A device that runs kernels on the CPU through rayon.
pub struct HostDevice {
    info: DeviceInfo,
    pool: Arc<BufferPool>,
    threads: Option<rayon::ThreadPool>,
}

impl HostDevice {
    /// Create a device on rayon's global thread pool with default limits.
    pub fn new() -> Self {
        Self::with_work_groups(DEFAULT_PREFERRED_MULTIPLE, DEFAULT_MAX_WORK_GROUP)
    }

    /// Create a device with a custom preferred work-group multiple and limit.
    ///
    /// Both values are raised to at least 2 and `preferred` is capped at `max`.
    pub fn with_work_groups(preferred: usize, max: usize) -> Self {
        let max = max.max(2);
        let preferred = preferred.clamp(2, max);
        Self {
            info: DeviceInfo {
                platform: super::registry::HOST_PLATFORM.to_string(),
                name: format!("rayon ({} threads)", rayon::current_num_threads()),
                compute_units: rayon::current_num_threads(),
                max_work_group_size: max,
                preferred_work_group_multiple: preferred,
            },
            pool: Arc::new(BufferPool::default()),
            threads: None,
        }
    }

    /// Create a device on a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, DeviceError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("histeq-worker-{i}"))
            .build()
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        let mut device = Self::new();
        device.info.compute_units = pool.current_num_threads();
        device.info.name = format!("rayon ({} threads)", pool.current_num_threads());
        device.threads = Some(pool);
        Ok(device)
    }

    /// Rename the device as reported by [`ComputeDevice::info`].
    pub(crate) fn named(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    /// Number of buffers currently allocated on this device.
    pub fn live_buffers(&self) -> usize {
        self.pool.live()
    }

    fn owns<T: DeviceElement>(&self, buffer: &DeviceBuffer<T>) -> Result<(), DeviceError> {
        if Arc::ptr_eq(&self.pool, &buffer.pool) {
            Ok(())
        } else {
            Err(DeviceError::UnknownBuffer(buffer.id()))
        }
    }

    fn resolve_range(&self, kernel: KernelName, range: NdRange) -> Result<WorkRange, DeviceError> {
        let invalid = |reason: String| DeviceError::InvalidRange {
            kernel: kernel.to_string(),
            reason,
        };

        let local = match range.local {
            Some(0) => return Err(invalid("work-group size is zero".into())),
            Some(local) if local > self.info.max_work_group_size => {
                return Err(invalid(format!(
                    "work-group size {local} exceeds device maximum {}",
                    self.info.max_work_group_size
                )))
            }
            Some(local) if range.global % local != 0 => {
                return Err(invalid(format!(
                    "global size {} is not a multiple of work-group size {local}",
                    range.global
                )))
            }
            Some(local) => local,
            None => self.pick_local(kernel, range.global),
        };

        Ok(WorkRange {
            offset: range.offset,
            global: range.global,
            local,
        })
    }

    /// Largest work-group size up to the preferred multiple that divides `global`.
    fn pick_local(&self, kernel: KernelName, global: usize) -> usize {
        let preferred = self.preferred_work_group_multiple(kernel);
        (1..=preferred.min(global.max(1)))
            .rev()
            .find(|d| global % d == 0)
            .unwrap_or(1)
    }

    fn checkout_all(&self, args: &[KernelArg]) -> Result<Vec<Held>, DeviceError> {
        let mut held = Vec::new();
        for arg in args {
            if let KernelArg::Buffer(id) = arg {
                match self.pool.checkout(*id) {
                    Ok(h) => held.push(h),
                    Err(e) => {
                        self.pool.checkin(held);
                        return Err(e);
                    }
                }
            }
        }
        Ok(held)
    }

    fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.threads {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDevice")
            .field("info", &self.info)
            .field("live_buffers", &self.pool.live())
            .finish()
    }
}

impl ComputeDevice for HostDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn preferred_work_group_multiple(&self, _kernel: KernelName) -> usize {
        self.info.preferred_work_group_multiple
    }

    fn max_work_group_size(&self) -> usize {
        self.info.max_work_group_size
    }

    fn create_buffer<T: DeviceElement>(
        &self,
        len: usize,
        access: BufferAccess,
    ) -> Result<DeviceBuffer<T>, DeviceError> {
        let id = self.pool.insert(T::zeroed(len), access);
        trace!(buffer = %id, kind = %T::KIND, len, "created buffer");
        Ok(DeviceBuffer::new(id, len, access, Arc::clone(&self.pool)))
    }

    fn write_buffer<T: DeviceElement>(
        &self,
        buffer: &DeviceBuffer<T>,
        data: &[T],
    ) -> Result<(), DeviceError> {
        self.owns(buffer)?;
        let id = buffer.id();
        self.pool.with_storage(id, |storage| {
            let actual = storage.kind();
            let len = storage.len();
            let dst = T::slice_mut(storage).ok_or(DeviceError::TypeMismatch {
                id,
                expected: T::KIND,
                actual,
            })?;
            if data.len() > len {
                return Err(DeviceError::OutOfRange {
                    start: 0,
                    end: data.len(),
                    len,
                });
            }
            dst[..data.len()].copy_from_slice(data);
            Ok(())
        })
    }

    fn fill_buffer<T: DeviceElement>(
        &self,
        buffer: &DeviceBuffer<T>,
        value: T,
    ) -> Result<(), DeviceError> {
        self.owns(buffer)?;
        let id = buffer.id();
        self.pool.with_storage(id, |storage| {
            let actual = storage.kind();
            let dst = T::slice_mut(storage).ok_or(DeviceError::TypeMismatch {
                id,
                expected: T::KIND,
                actual,
            })?;
            dst.fill(value);
            Ok(())
        })
    }

    fn read_buffer<T: DeviceElement>(
        &self,
        buffer: &DeviceBuffer<T>,
        out: &mut [T],
    ) -> Result<(), DeviceError> {
        self.owns(buffer)?;
        let id = buffer.id();
        self.pool.with_storage(id, |storage| {
            let actual = storage.kind();
            let src = T::slice(storage).ok_or(DeviceError::TypeMismatch {
                id,
                expected: T::KIND,
                actual,
            })?;
            if out.len() > src.len() {
                return Err(DeviceError::OutOfRange {
                    start: 0,
                    end: out.len(),
                    len: src.len(),
                });
            }
            out.copy_from_slice(&src[..out.len()]);
            Ok(())
        })
    }

    fn enqueue_kernel(
        &self,
        kernel: KernelName,
        range: NdRange,
        args: &[KernelArg],
    ) -> Result<KernelEvent, DeviceError> {
        let queued = Instant::now();
        let work = self.resolve_range(kernel, range)?;
        let mut held = self.checkout_all(args)?;

        let started = Instant::now();
        let result = {
            let mut buffers = held.iter_mut();
            let items = args
                .iter()
                .map(|arg| match arg {
                    KernelArg::Buffer(_) => match buffers.next() {
                        Some(h) => ArgItem::Buffer {
                            id: h.id,
                            access: h.access,
                            storage: &mut h.storage,
                        },
                        None => ArgItem::Taken,
                    },
                    KernelArg::Uint(value) => ArgItem::Uint(*value),
                    KernelArg::Local(len) => ArgItem::Local(*len),
                })
                .collect();
            let mut list = ArgList { kernel, items };
            self.install(|| kernels::dispatch(kernel, &work, &mut list))
        };
        let ended = Instant::now();
        self.pool.checkin(held);

        if let Err(e) = &result {
            error!(%kernel, error = %e, "kernel launch failed");
        }
        result?;

        let event = KernelEvent {
            kernel,
            global: work.global,
            local: work.local,
            queued,
            started,
            ended,
        };
        debug!(
            %kernel,
            offset = work.offset,
            global = work.global,
            local = work.local,
            elapsed_us = event.elapsed().as_micros() as u64,
            "kernel complete"
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_download() {
        let device = HostDevice::new();
        let buffer = device.upload(&[1u32, 2, 3], BufferAccess::ReadOnly).unwrap();
        assert_eq!(device.download(&buffer, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(device.download(&buffer, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_create_buffer_is_zeroed() {
        let device = HostDevice::new();
        let buffer = device.create_buffer::<f32>(4, BufferAccess::ReadWrite).unwrap();
        assert_eq!(device.download(&buffer, 4).unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_fill_buffer() {
        let device = HostDevice::new();
        let buffer = device.create_buffer::<u16>(3, BufferAccess::ReadWrite).unwrap();
        device.fill_buffer(&buffer, 7).unwrap();
        assert_eq!(device.download(&buffer, 3).unwrap(), vec![7, 7, 7]);
    }

    #[test]
    fn test_oversized_transfers_fail() {
        let device = HostDevice::new();
        let buffer = device.create_buffer::<u32>(2, BufferAccess::ReadWrite).unwrap();
        assert!(matches!(
            device.write_buffer(&buffer, &[1, 2, 3]),
            Err(DeviceError::OutOfRange { len: 2, .. })
        ));
        let mut out = [0u32; 3];
        assert!(device.read_buffer(&buffer, &mut out).is_err());
    }

    #[test]
    fn test_buffers_released_on_drop() {
        let device = HostDevice::new();
        {
            let _a = device.create_buffer::<u32>(8, BufferAccess::ReadWrite).unwrap();
            let _b = device.create_buffer::<u16>(8, BufferAccess::ReadWrite).unwrap();
            assert_eq!(device.live_buffers(), 2);
        }
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_foreign_buffer_rejected() {
        let a = HostDevice::new();
        let b = HostDevice::new();
        let buffer = a.create_buffer::<u32>(1, BufferAccess::ReadWrite).unwrap();
        assert!(matches!(
            b.write_buffer(&buffer, &[1]),
            Err(DeviceError::UnknownBuffer(_))
        ));
    }

    #[test]
    fn test_local_size_must_divide_global() {
        let device = HostDevice::new();
        let pixels = device.upload(&[0u16; 10], BufferAccess::ReadOnly).unwrap();
        let out = device.create_buffer::<u32>(256, BufferAccess::ReadWrite).unwrap();
        let err = device
            .enqueue_kernel(
                KernelName::HistogramAtomic,
                NdRange::new(10).with_local(4),
                &[pixels.arg(), out.arg(), KernelArg::Uint(1)],
            )
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidRange { .. }));
    }

    #[test]
    fn test_local_size_above_device_max_rejected() {
        let device = HostDevice::with_work_groups(4, 8);
        let pixels = device.upload(&[0u16; 16], BufferAccess::ReadOnly).unwrap();
        let out = device.create_buffer::<u32>(256, BufferAccess::ReadWrite).unwrap();
        let err = device
            .enqueue_kernel(
                KernelName::HistogramAtomic,
                NdRange::new(16).with_local(16),
                &[pixels.arg(), out.arg(), KernelArg::Uint(1)],
            )
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidRange { .. }));
    }

    #[test]
    fn test_binding_same_buffer_twice_fails_and_restores() {
        let device = HostDevice::new();
        let data = device.upload(&[1u32, 2, 3, 4], BufferAccess::ReadWrite).unwrap();
        let err = device
            .enqueue_kernel(
                KernelName::ScanHillisSteeleLocal,
                NdRange::new(4).with_local(4),
                &[data.arg(), data.arg(), KernelArg::Local(4), KernelArg::Local(4)],
            )
            .unwrap_err();
        assert_eq!(err, DeviceError::BufferInUse(data.id()));
        // The buffer is usable again after the failed launch.
        assert_eq!(device.download(&data, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_write_to_read_only_buffer_rejected() {
        let device = HostDevice::new();
        let pixels = device.upload(&[0u16; 4], BufferAccess::ReadOnly).unwrap();
        let out = device.create_buffer::<u32>(256, BufferAccess::ReadOnly).unwrap();
        let err = device
            .enqueue_kernel(
                KernelName::HistogramAtomic,
                NdRange::new(4),
                &[pixels.arg(), out.arg(), KernelArg::Uint(1)],
            )
            .unwrap_err();
        assert!(matches!(err, DeviceError::ReadOnlyBuffer { .. }));
    }

    #[test]
    fn test_type_mismatch_reported() {
        let device = HostDevice::new();
        let pixels = device.upload(&[0u32; 4], BufferAccess::ReadOnly).unwrap();
        let out = device.create_buffer::<u32>(256, BufferAccess::ReadWrite).unwrap();
        let err = device
            .enqueue_kernel(
                KernelName::HistogramAtomic,
                NdRange::new(4),
                &[pixels.arg(), out.arg(), KernelArg::Uint(1)],
            )
            .unwrap_err();
        assert!(matches!(err, DeviceError::TypeMismatch { .. }));
    }

    #[test]
    fn test_event_reports_geometry() {
        let device = HostDevice::new();
        let pixels = device.upload(&[0u16, 1, 2, 3], BufferAccess::ReadOnly).unwrap();
        let out = device.create_buffer::<u32>(4, BufferAccess::ReadWrite).unwrap();
        let event = device
            .enqueue_kernel(
                KernelName::HistogramAtomic,
                NdRange::new(4),
                &[pixels.arg(), out.arg(), KernelArg::Uint(1)],
            )
            .unwrap();
        assert_eq!(event.kernel, KernelName::HistogramAtomic);
        assert_eq!(event.global, 4);
        assert_eq!(event.local, 4);
        assert!(event.ended >= event.started);
        assert_eq!(device.download(&out, 4).unwrap(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_dedicated_pool() {
        let device = HostDevice::with_threads(2).unwrap();
        assert_eq!(device.info().compute_units, 2);
        let pixels = device.upload(&[5u16; 64], BufferAccess::ReadOnly).unwrap();
        let out = device.create_buffer::<u32>(8, BufferAccess::ReadWrite).unwrap();
        device
            .enqueue_kernel(
                KernelName::HistogramAtomic,
                NdRange::new(64),
                &[pixels.arg(), out.arg(), KernelArg::Uint(1)],
            )
            .unwrap();
        assert_eq!(device.download(&out, 8).unwrap()[5], 64);
    }
}
