//! Device handles.
//!
//! A device owns the worker pool for the lifetime of everything scheduled on
//! it. Queues receive the pool as shared ownership at construction, so the
//! pool strictly outlives every queue that references it; dropping the
//! device drains and joins the workers.

use std::sync::Arc;

use tracing::debug;

use crate::pool::ThreadPool;
use crate::queue::Queue;

/// Device construction options.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Worker thread count; defaults to the machine's available parallelism.
    pub worker_count: Option<usize>,
    /// ND-range over-subscription factor (slices = workers × multiplier,
    /// clamped to the work-group count). At least 1.
    pub slice_multiplier: usize,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self { worker_count: None, slice_multiplier: 2 }
    }
}

#[derive(Debug)]
pub struct Device {
    pool: Arc<ThreadPool>,
    slice_multiplier: usize,
}

impl Device {
    pub fn new(options: DeviceOptions) -> Self {
        let workers = options
            .worker_count
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        let pool = Arc::new(ThreadPool::new(workers));
        debug!(workers = pool.worker_count(), slice_multiplier = options.slice_multiplier, "device created");
        Self { pool, slice_multiplier: options.slice_multiplier.max(1) }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Create a queue on this device. All queues share the device's pool.
    pub fn create_queue(&self) -> Arc<Queue> {
        Queue::new(Arc::clone(&self.pool), self.slice_multiplier)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new(DeviceOptions::default())
    }
}
