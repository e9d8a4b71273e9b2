//! Linear device buffers.
//!
//! A `Buffer` is a byte-addressed allocation plus an identity. Transfer
//! commands operate on it through the bounds-checked [`HostMemory`] loops;
//! the runtime never interprets buffer contents.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::memory::HostMemory;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a buffer, independent of its storage address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct Buffer {
    id: BufferId,
    memory: Arc<HostMemory>,
}

impl Buffer {
    /// Create a zero-initialized buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self { id: BufferId::next(), memory: Arc::new(HostMemory::new(size)) }
    }

    /// Create a buffer holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self { id: BufferId::next(), memory: Arc::new(HostMemory::from_bytes(data)) }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Backing storage, for the command handlers.
    pub fn memory(&self) -> &HostMemory {
        &self.memory
    }

    /// Snapshot the whole buffer contents. Intended for tests and read-back
    /// convenience, not the hot path.
    pub fn contents(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.size()];
        self.memory.read(0, &mut out).expect("full-range read is always in bounds");
        out
    }
}
