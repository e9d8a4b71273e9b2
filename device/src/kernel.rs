//! Compiled kernels and per-slice launch geometry.
//!
//! The compiler pipeline that produces entry points lives outside this
//! workspace; here a kernel is an opaque callable plus zero or more
//! specializations keyed by exact work-group shape. The runtime picks the
//! most specialized entry point for a dispatch and fans it out across pool
//! workers, handing each slice a [`ScheduleInfo`] describing its share.
//!
//! # Geometry
//!
//! All geometry is materialized as 3-element vectors regardless of the
//! declared work dimensionality: a 1D or 2D dispatch is a 3D dispatch with
//! identity extents in the trailing dimensions. Entry points therefore never
//! branch on `work_dim` in the invocation hot path.
//!
//! # Partitioning
//!
//! Work-groups are linearized (x fastest) and split into contiguous blocks,
//! one block per slice. [`ScheduleInfo::slice_groups`] yields exactly the
//! linear group ids a slice owns; every group belongs to exactly one slice
//! and slices beyond the group count receive empty ranges.

use std::ops::Range;
use std::sync::Arc;

/// Opaque kernel entry point: packed argument bytes plus launch geometry.
pub type EntryPoint = Arc<dyn Fn(&[u8], &ScheduleInfo) + Send + Sync>;

/// Per-slice launch geometry, computed fresh for every dispatch and consumed
/// immediately by the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    /// Total work items per dimension.
    pub global_size: [usize; 3],
    /// Offset added to every global item id.
    pub global_offset: [usize; 3],
    /// Work-group extent per dimension.
    pub local_size: [usize; 3],
    /// Declared dimensionality (1..=3); informational only, see module docs.
    pub work_dim: u32,
    /// Which slice of the fan-out this invocation is.
    pub slice_index: usize,
    /// How many slices the dispatch was split into.
    pub total_slices: usize,
}

impl ScheduleInfo {
    /// Work-group count per dimension. Partial trailing groups count.
    pub fn workgroup_count(&self) -> [usize; 3] {
        [
            self.global_size[0].div_ceil(self.local_size[0]),
            self.global_size[1].div_ceil(self.local_size[1]),
            self.global_size[2].div_ceil(self.local_size[2]),
        ]
    }

    /// Total number of work-groups in the dispatch.
    pub fn total_workgroups(&self) -> usize {
        self.workgroup_count().iter().product()
    }

    /// Linearized work-group ids owned by this slice: a contiguous block,
    /// with the remainder spread over the leading slices.
    pub fn slice_groups(&self) -> Range<usize> {
        let total = self.total_workgroups();
        let base = total / self.total_slices;
        let rem = total % self.total_slices;
        let start = self.slice_index * base + self.slice_index.min(rem);
        let len = base + usize::from(self.slice_index < rem);
        start..start + len
    }

    /// Decompose a linear group id into a 3D group coordinate.
    pub fn group_id(&self, linear: usize) -> [usize; 3] {
        let count = self.workgroup_count();
        [linear % count[0], (linear / count[0]) % count[1], linear / (count[0] * count[1])]
    }

    /// First global item id of a group, including the global offset.
    pub fn group_origin(&self, group: [usize; 3]) -> [usize; 3] {
        [
            self.global_offset[0] + group[0] * self.local_size[0],
            self.global_offset[1] + group[1] * self.local_size[1],
            self.global_offset[2] + group[2] * self.local_size[2],
        ]
    }

    /// Item extent of a group, clamped at the global bounds so partial
    /// trailing groups iterate only real items.
    pub fn group_extent(&self, group: [usize; 3]) -> [usize; 3] {
        [
            self.local_size[0].min(self.global_size[0] - group[0] * self.local_size[0]),
            self.local_size[1].min(self.global_size[1] - group[1] * self.local_size[1]),
            self.local_size[2].min(self.global_size[2] - group[2] * self.local_size[2]),
        ]
    }
}

/// One compiled specialization of a kernel.
pub struct KernelVariant {
    /// Exact work-group shape this entry point was compiled for.
    pub local_size: [usize; 3],
    pub entry: EntryPoint,
}

impl std::fmt::Debug for KernelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelVariant").field("local_size", &self.local_size).finish()
    }
}

/// A compiled kernel: a generic entry point plus shape-specialized variants.
pub struct Kernel {
    name: String,
    generic: EntryPoint,
    variants: Vec<KernelVariant>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel").field("name", &self.name).field("variants", &self.variants).finish()
    }
}

impl Kernel {
    pub fn new(name: impl Into<String>, generic: EntryPoint) -> Self {
        Self { name: name.into(), generic, variants: Vec::new() }
    }

    /// Register a specialization for an exact work-group shape.
    pub fn with_variant(mut self, local_size: [usize; 3], entry: EntryPoint) -> Self {
        self.variants.push(KernelVariant { local_size, entry });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Most specialized entry point for the requested work-group shape,
    /// falling back to the generic entry point when nothing matches.
    pub fn entry_for(&self, local_size: [usize; 3]) -> &EntryPoint {
        self.variants.iter().find(|v| v.local_size == local_size).map(|v| &v.entry).unwrap_or(&self.generic)
    }
}
