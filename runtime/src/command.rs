//! Recorded commands.
//!
//! One variant per operation a command buffer can carry. Each variant owns
//! exactly the data its handler needs; handlers live in the queue's
//! execution loop, which matches on the closed enum. Commands are immutable
//! once recorded — re-submitting a buffer replays the same payloads.

use std::sync::Arc;

use smallvec::SmallVec;

use veles_device::{Buffer, HostConstPtr, HostPtr, Image, Kernel, QueryPool};

/// Fill patterns and texels are small (at most one element); keep them
/// inline in the command.
pub type PatternBytes = SmallVec<[u8; 16]>;

/// Launch geometry and payload of one kernel dispatch.
///
/// Geometry is stored 3-D regardless of `work_dim`; the 1D/2D constructors
/// pad with identity extents so downstream code never branches on
/// dimensionality.
#[derive(Clone)]
pub struct NDRange {
    pub kernel: Arc<Kernel>,
    /// Packed argument bytes handed to the entry point untouched.
    pub args: Arc<[u8]>,
    pub global_size: [usize; 3],
    pub global_offset: [usize; 3],
    pub local_size: [usize; 3],
    pub work_dim: u32,
}

impl std::fmt::Debug for NDRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NDRange")
            .field("kernel", &self.kernel.name())
            .field("global_size", &self.global_size)
            .field("local_size", &self.local_size)
            .field("work_dim", &self.work_dim)
            .finish()
    }
}

impl NDRange {
    pub fn new_1d(kernel: Arc<Kernel>, args: Arc<[u8]>, global: usize, local: usize) -> Self {
        Self {
            kernel,
            args,
            global_size: [global, 1, 1],
            global_offset: [0; 3],
            local_size: [local, 1, 1],
            work_dim: 1,
        }
    }

    pub fn new_2d(kernel: Arc<Kernel>, args: Arc<[u8]>, global: [usize; 2], local: [usize; 2]) -> Self {
        Self {
            kernel,
            args,
            global_size: [global[0], global[1], 1],
            global_offset: [0; 3],
            local_size: [local[0], local[1], 1],
            work_dim: 2,
        }
    }

    pub fn new_3d(kernel: Arc<Kernel>, args: Arc<[u8]>, global: [usize; 3], local: [usize; 3]) -> Self {
        Self { kernel, args, global_size: global, global_offset: [0; 3], local_size: local, work_dim: 3 }
    }

    pub fn with_offset(mut self, offset: [usize; 3]) -> Self {
        self.global_offset = offset;
        self
    }
}

/// One recorded operation inside a command buffer.
pub enum Command {
    /// Buffer → host pointer.
    ReadBuffer { src: Arc<Buffer>, offset: usize, size: usize, dst: HostPtr },
    /// Host pointer → buffer.
    WriteBuffer { dst: Arc<Buffer>, offset: usize, size: usize, src: HostConstPtr },
    FillBuffer { dst: Arc<Buffer>, offset: usize, size: usize, pattern: PatternBytes },
    CopyBuffer { src: Arc<Buffer>, dst: Arc<Buffer>, src_offset: usize, dst_offset: usize, size: usize },
    /// Image region → host pointer, tightly packed.
    ReadImage { src: Arc<Image>, origin: [usize; 3], region: [usize; 3], dst: HostPtr },
    /// Tightly packed host pointer → image region.
    WriteImage { dst: Arc<Image>, origin: [usize; 3], region: [usize; 3], src: HostConstPtr },
    FillImage { dst: Arc<Image>, origin: [usize; 3], region: [usize; 3], texel: PatternBytes },
    CopyImage {
        src: Arc<Image>,
        dst: Arc<Image>,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
    },
    CopyImageToBuffer { src: Arc<Image>, dst: Arc<Buffer>, origin: [usize; 3], region: [usize; 3], buffer_offset: usize },
    CopyBufferToImage { src: Arc<Buffer>, dst: Arc<Image>, buffer_offset: usize, origin: [usize; 3], region: [usize; 3] },
    NDRangeDispatch(NDRange),
    /// Host callback executed in command order on the worker thread.
    UserCallback { callback: Arc<dyn Fn() + Send + Sync> },
    BeginQuery { pool: Arc<QueryPool>, index: usize },
    EndQuery { pool: Arc<QueryPool>, index: usize },
    ResetQueryPool { pool: Arc<QueryPool>, first: usize, count: usize },
}

impl Command {
    /// Command kind name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::ReadBuffer { .. } => "read_buffer",
            Command::WriteBuffer { .. } => "write_buffer",
            Command::FillBuffer { .. } => "fill_buffer",
            Command::CopyBuffer { .. } => "copy_buffer",
            Command::ReadImage { .. } => "read_image",
            Command::WriteImage { .. } => "write_image",
            Command::FillImage { .. } => "fill_image",
            Command::CopyImage { .. } => "copy_image",
            Command::CopyImageToBuffer { .. } => "copy_image_to_buffer",
            Command::CopyBufferToImage { .. } => "copy_buffer_to_image",
            Command::NDRangeDispatch { .. } => "ndrange_dispatch",
            Command::UserCallback { .. } => "user_callback",
            Command::BeginQuery { .. } => "begin_query",
            Command::EndQuery { .. } => "end_query",
            Command::ResetQueryPool { .. } => "reset_query_pool",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("kind", &self.kind()).finish()
    }
}
