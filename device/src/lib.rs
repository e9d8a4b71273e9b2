//! Device-side objects for the veles runtime.
//!
//! This crate holds the passive pieces the execution core schedules work
//! against: host-visible memory ([`Buffer`], [`Image`]), compiled kernels
//! with their work-group-shape variant selection ([`Kernel`]), the per-slice
//! launch geometry handed to entry points ([`ScheduleInfo`]), and duration
//! [`QueryPool`]s. Nothing in here schedules anything — ordering and
//! parallelism are the `veles-runtime` crate's job.

pub mod buffer;
pub mod error;
pub mod image;
pub mod kernel;
pub mod memory;
pub mod query;

#[cfg(test)]
pub mod test;

pub use buffer::{Buffer, BufferId};
pub use error::{Error, Result};
pub use image::{Image, ImageId};
pub use kernel::{EntryPoint, Kernel, KernelVariant, ScheduleInfo};
pub use memory::{HostConstPtr, HostMemory, HostPtr};
pub use query::QueryPool;
