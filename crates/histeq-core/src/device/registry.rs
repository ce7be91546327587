//! Platform and device enumeration.
//!
//! Devices are addressed by a `(platform, device)` index pair, the way the
//! command line selects them. The host platform exposes two devices: rayon's
//! global pool and a single-worker pool for sequential baselines.

use std::fmt;

use tracing::info;

use super::host::{DEFAULT_MAX_WORK_GROUP, DEFAULT_PREFERRED_MULTIPLE};
use super::{DeviceInfo, HostDevice};
use crate::error::DeviceError;

/// Name of the in-process platform.
pub const HOST_PLATFORM: &str = "host";

const VENDOR: &str = "rayon";

/// A platform and the devices it offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub name: String,
    pub vendor: String,
    pub devices: Vec<DeviceInfo>,
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.vendor)
    }
}

fn host_device_info(name: String, compute_units: usize) -> DeviceInfo {
    DeviceInfo {
        platform: HOST_PLATFORM.to_string(),
        name,
        compute_units,
        max_work_group_size: DEFAULT_MAX_WORK_GROUP,
        preferred_work_group_multiple: DEFAULT_PREFERRED_MULTIPLE,
    }
}

/// List every platform with its devices, in index order.
pub fn platforms() -> Vec<PlatformInfo> {
    let threads = rayon::current_num_threads();
    vec![PlatformInfo {
        name: HOST_PLATFORM.to_string(),
        vendor: VENDOR.to_string(),
        devices: vec![
            host_device_info(format!("rayon ({threads} threads)"), threads),
            host_device_info("rayon (1 thread)".to_string(), 1),
        ],
    }]
}

/// Open the device at `(platform, device)`.
///
/// # Errors
///
/// `DeviceNotFound` when either index is out of range, `Unavailable` when the
/// worker pool cannot be started.
pub fn select_device(platform: usize, device: usize) -> Result<HostDevice, DeviceError> {
    let not_found = DeviceError::DeviceNotFound { platform, device };
    let listed = platforms();
    let info = listed
        .get(platform)
        .and_then(|p| p.devices.get(device))
        .ok_or(not_found)?;

    let selected = match device {
        0 => HostDevice::new(),
        _ => HostDevice::with_threads(info.compute_units)?,
    };
    info!(platform, device, name = %info.name, "selected device");
    Ok(selected.named(info.name.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ComputeDevice;

    #[test]
    fn test_host_platform_listed_first() {
        let listed = platforms();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, HOST_PLATFORM);
        assert_eq!(listed[0].devices.len(), 2);
        assert!(listed[0].devices.iter().all(|d| d.platform == HOST_PLATFORM));
    }

    #[test]
    fn test_select_default_device() {
        let device = select_device(0, 0).unwrap();
        assert_eq!(device.info().platform, HOST_PLATFORM);
        assert_eq!(device.max_work_group_size(), DEFAULT_MAX_WORK_GROUP);
    }

    #[test]
    fn test_select_single_worker_device() {
        let device = select_device(0, 1).unwrap();
        assert_eq!(device.info().compute_units, 1);
        assert_eq!(device.info().name, "rayon (1 thread)");
    }

    #[test]
    fn test_select_out_of_range() {
        assert_eq!(
            select_device(1, 0).unwrap_err(),
            DeviceError::DeviceNotFound {
                platform: 1,
                device: 0
            }
        );
        assert!(matches!(
            select_device(0, 7),
            Err(DeviceError::DeviceNotFound { device: 7, .. })
        ));
    }
}
