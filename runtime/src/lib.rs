//! Execution core of the veles device runtime.
//!
//! Recorded command buffers enter through [`Queue::dispatch`], park behind
//! their wait semaphores, and run to completion on the device's fixed
//! worker pool. Commands within one buffer execute strictly in recorded
//! order; a kernel dispatch fans out across the pool inside its one step of
//! that order. Completion is observable through [`Fence`]s, typed
//! completion closures, and the [`Semaphore`]s a buffer signals — which is
//! also the only cross-buffer ordering mechanism.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use veles_device::Buffer;
//! use veles_runtime::{Command, CommandBuffer, Device, DeviceOptions, Fence};
//!
//! let device = Device::new(DeviceOptions::default());
//! let queue = device.create_queue();
//!
//! let buffer = Arc::new(Buffer::new(64));
//! let commands = Arc::new(CommandBuffer::new(vec![Command::FillBuffer {
//!     dst: Arc::clone(&buffer),
//!     offset: 0,
//!     size: 64,
//!     pattern: [0xa5].into_iter().collect(),
//! }]));
//!
//! let fence = Arc::new(Fence::new());
//! queue.dispatch(&commands, Some(Arc::clone(&fence)), &[], &[], None).unwrap();
//! fence.wait().unwrap();
//! assert!(buffer.contents().iter().all(|&b| b == 0xa5));
//! ```

pub mod command;
pub mod command_buffer;
pub mod device;
pub mod error;
pub mod fence;
pub mod latch;
pub mod queue;
pub mod semaphore;

// The pool is reachable only through the device that owns it.
pub(crate) mod pool;

#[cfg(test)]
pub mod test;

pub use command::{Command, NDRange, PatternBytes};
pub use command_buffer::{CommandBuffer, CommandBufferId, CompletionCallback};
pub use device::{Device, DeviceOptions};
pub use error::{Error, Result};
pub use fence::{CompletionStatus, Fence, FenceStatus};
pub use latch::WorkCounter;
pub use queue::Queue;
pub use semaphore::Semaphore;
