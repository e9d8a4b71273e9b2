pub mod unit;

use crate::{Device, DeviceOptions};

/// Small fixed-shape device so scheduling tests are deterministic about
/// worker counts.
pub fn test_device(workers: usize, slice_multiplier: usize) -> Device {
    Device::new(DeviceOptions { worker_count: Some(workers), slice_multiplier })
}
