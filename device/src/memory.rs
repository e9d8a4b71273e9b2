//! Host-visible storage backing buffer and image payloads.
//!
//! Transfer commands are thin byte loops over this storage. The scheduler is
//! responsible for ordering conflicting accesses (commands within one command
//! buffer run in recorded order; cross-buffer conflicts require semaphores),
//! so the storage itself only validates bounds.

use std::cell::UnsafeCell;

use snafu::ensure;

use crate::error::{InvalidPatternSnafu, InvalidRegionSnafu, Result};

/// Fixed-size byte storage shared between recorded commands and the worker
/// threads that execute them.
pub struct HostMemory {
    bytes: UnsafeCell<Box<[u8]>>,
}

// SAFETY: access is ordered by the command scheduler. Unordered overlapping
// writes are a caller contract violation, exactly as they would be for the
// raw device pointers this storage stands in for.
unsafe impl Send for HostMemory {}
unsafe impl Sync for HostMemory {}

impl std::fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMemory").field("len", &self.len()).finish()
    }
}

impl HostMemory {
    /// Create zero-initialized storage of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self { bytes: UnsafeCell::new(vec![0u8; len].into_boxed_slice()) }
    }

    /// Create storage holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self { bytes: UnsafeCell::new(data.to_vec().into_boxed_slice()) }
    }

    pub fn len(&self) -> usize {
        // SAFETY: the length is fixed at construction and never mutated.
        unsafe { (&(*self.bytes.get())).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_range(&self, offset: usize, size: usize) -> Result<()> {
        let len = self.len();
        ensure!(offset.checked_add(size).is_some_and(|end| end <= len), InvalidRegionSnafu { offset, size, len });
        Ok(())
    }

    /// Base pointer of the allocation.
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: the box itself is never reallocated, only its contents change.
        unsafe { (*self.bytes.get()).as_mut_ptr() }
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.check_range(offset, dst.len())?;
        // SAFETY: range checked above; scheduler orders conflicting access.
        unsafe { std::ptr::copy_nonoverlapping(self.as_ptr().add(offset), dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    /// Copy `src` into the storage starting at `offset`.
    pub fn write(&self, offset: usize, src: &[u8]) -> Result<()> {
        self.check_range(offset, src.len())?;
        // SAFETY: range checked above; scheduler orders conflicting access.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), self.as_ptr().add(offset), src.len()) };
        Ok(())
    }

    /// Copy `size` bytes starting at `offset` to a raw host destination.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for `size` writes and must not alias this storage.
    pub unsafe fn read_to_ptr(&self, offset: usize, size: usize, dst: *mut u8) -> Result<()> {
        self.check_range(offset, size)?;
        unsafe { std::ptr::copy_nonoverlapping(self.as_ptr().add(offset), dst, size) };
        Ok(())
    }

    /// Copy `size` bytes from a raw host source into the storage at `offset`.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `size` reads and must not alias this storage.
    pub unsafe fn write_from_ptr(&self, offset: usize, size: usize, src: *const u8) -> Result<()> {
        self.check_range(offset, size)?;
        unsafe { std::ptr::copy_nonoverlapping(src, self.as_ptr().add(offset), size) };
        Ok(())
    }

    /// Tile `pattern` over `size` bytes starting at `offset`.
    pub fn fill(&self, offset: usize, size: usize, pattern: &[u8]) -> Result<()> {
        ensure!(!pattern.is_empty() && size % pattern.len() == 0, InvalidPatternSnafu { pattern: pattern.len(), size });
        self.check_range(offset, size)?;
        let mut at = offset;
        while at < offset + size {
            // SAFETY: range checked above; scheduler orders conflicting access.
            unsafe { std::ptr::copy_nonoverlapping(pattern.as_ptr(), self.as_ptr().add(at), pattern.len()) };
            at += pattern.len();
        }
        Ok(())
    }

    /// Copy `size` bytes from `src` at `src_offset` into this storage at `dst_offset`.
    pub fn copy_from(&self, src: &HostMemory, src_offset: usize, dst_offset: usize, size: usize) -> Result<()> {
        src.check_range(src_offset, size)?;
        self.check_range(dst_offset, size)?;
        // SAFETY: both ranges checked; distinct allocations cannot overlap and
        // commands never record a self-copy.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr().add(src_offset), self.as_ptr().add(dst_offset), size) };
        Ok(())
    }
}

/// Mutable raw host pointer captured by a recorded read-back command.
///
/// The producer of a command buffer guarantees the pointee stays valid and
/// unaliased until the dispatch completes; wrapping the pointer makes the
/// command payload movable across worker threads.
#[derive(Clone, Copy, Debug)]
pub struct HostPtr(pub *mut u8);

// SAFETY: validity and exclusivity are the recording side's contract, as for
// every host pointer handed to a device runtime.
unsafe impl Send for HostPtr {}
unsafe impl Sync for HostPtr {}

/// Read-only counterpart of [`HostPtr`], captured by write commands.
#[derive(Clone, Copy, Debug)]
pub struct HostConstPtr(pub *const u8);

// SAFETY: see `HostPtr`.
unsafe impl Send for HostConstPtr {}
unsafe impl Sync for HostConstPtr {}
