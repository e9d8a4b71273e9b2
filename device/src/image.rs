//! Three-dimensional images over host-visible storage.
//!
//! Images are byte-level objects here: an extent, an element size and the
//! row/slice pitches needed to walk regions. Sampling, formats and layout
//! transitions belong to the API surface above this crate; the runtime only
//! moves bytes. 1D and 2D images are 3D images with identity extents, which
//! keeps every region loop three-deep with no dimensionality branches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use snafu::ensure;

use crate::buffer::Buffer;
use crate::error::{IncompatibleImagesSnafu, InvalidImageRegionSnafu, Result, SizeMismatchSnafu};
use crate::memory::HostMemory;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

#[derive(Debug, Clone)]
pub struct Image {
    id: ImageId,
    memory: Arc<HostMemory>,
    extent: [usize; 3],
    element_size: usize,
    row_pitch: usize,
    slice_pitch: usize,
}

impl Image {
    /// Create a zero-initialized image with tight pitches.
    pub fn new(extent: [usize; 3], element_size: usize) -> Self {
        let row_pitch = extent[0] * element_size;
        let slice_pitch = row_pitch * extent[1];
        Self {
            id: ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)),
            memory: Arc::new(HostMemory::new(slice_pitch * extent[2])),
            extent,
            element_size,
            row_pitch,
            slice_pitch,
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn memory(&self) -> &HostMemory {
        &self.memory
    }

    fn check_region(&self, origin: [usize; 3], region: [usize; 3]) -> Result<()> {
        let fits = (0..3).all(|d| origin[d].checked_add(region[d]).is_some_and(|end| end <= self.extent[d]));
        ensure!(fits, InvalidImageRegionSnafu { origin, region, extent: self.extent });
        Ok(())
    }

    /// Byte offset of a texel coordinate within the backing storage.
    fn byte_offset(&self, coord: [usize; 3]) -> usize {
        coord[0] * self.element_size + coord[1] * self.row_pitch + coord[2] * self.slice_pitch
    }

    /// Walk a region row by row: `f(storage_offset, packed_offset, row_bytes)`,
    /// where `packed_offset` is the offset of the row in a tightly-packed
    /// host copy of the region.
    fn for_each_row(&self, origin: [usize; 3], region: [usize; 3], mut f: impl FnMut(usize, usize, usize) -> Result<()>) -> Result<()> {
        let row_bytes = region[0] * self.element_size;
        let mut packed = 0;
        for z in 0..region[2] {
            for y in 0..region[1] {
                let offset = self.byte_offset([origin[0], origin[1] + y, origin[2] + z]);
                f(offset, packed, row_bytes)?;
                packed += row_bytes;
            }
        }
        Ok(())
    }

    /// Total bytes of a tightly-packed host copy of `region`.
    pub fn region_bytes(&self, region: [usize; 3]) -> usize {
        region.iter().product::<usize>() * self.element_size
    }

    /// Copy a region into a tightly-packed host slice.
    pub fn read_region(&self, origin: [usize; 3], region: [usize; 3], dst: &mut [u8]) -> Result<()> {
        self.check_region(origin, region)?;
        ensure!(dst.len() == self.region_bytes(region), SizeMismatchSnafu { expected: self.region_bytes(region), actual: dst.len() });
        self.for_each_row(origin, region, |offset, packed, row| self.memory.read(offset, &mut dst[packed..packed + row]))
    }

    /// Copy a tightly-packed host slice into a region.
    pub fn write_region(&self, origin: [usize; 3], region: [usize; 3], src: &[u8]) -> Result<()> {
        self.check_region(origin, region)?;
        ensure!(src.len() == self.region_bytes(region), SizeMismatchSnafu { expected: self.region_bytes(region), actual: src.len() });
        self.for_each_row(origin, region, |offset, packed, row| self.memory.write(offset, &src[packed..packed + row]))
    }

    /// Copy a region to a raw host destination (tightly packed).
    ///
    /// # Safety
    ///
    /// `dst` must be valid for `region_bytes(region)` writes.
    pub unsafe fn read_region_to_ptr(&self, origin: [usize; 3], region: [usize; 3], dst: *mut u8) -> Result<()> {
        self.check_region(origin, region)?;
        self.for_each_row(origin, region, |offset, packed, row| unsafe {
            self.memory.read_to_ptr(offset, row, dst.add(packed))
        })
    }

    /// Copy a tightly-packed raw host source into a region.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `region_bytes(region)` reads.
    pub unsafe fn write_region_from_ptr(&self, origin: [usize; 3], region: [usize; 3], src: *const u8) -> Result<()> {
        self.check_region(origin, region)?;
        self.for_each_row(origin, region, |offset, packed, row| unsafe {
            self.memory.write_from_ptr(offset, row, src.add(packed))
        })
    }

    /// Fill a region with one texel value.
    pub fn fill_region(&self, origin: [usize; 3], region: [usize; 3], texel: &[u8]) -> Result<()> {
        self.check_region(origin, region)?;
        ensure!(texel.len() == self.element_size, SizeMismatchSnafu { expected: self.element_size, actual: texel.len() });
        self.for_each_row(origin, region, |offset, _, row| self.memory.fill(offset, row, texel))
    }

    /// Copy a region from `src` into this image.
    pub fn copy_region(
        &self,
        src: &Image,
        src_origin: [usize; 3],
        dst_origin: [usize; 3],
        region: [usize; 3],
    ) -> Result<()> {
        ensure!(
            self.element_size == src.element_size,
            IncompatibleImagesSnafu { src: src.element_size, dst: self.element_size }
        );
        src.check_region(src_origin, region)?;
        self.check_region(dst_origin, region)?;
        let row = region[0] * self.element_size;
        for z in 0..region[2] {
            for y in 0..region[1] {
                let src_offset = src.byte_offset([src_origin[0], src_origin[1] + y, src_origin[2] + z]);
                let dst_offset = self.byte_offset([dst_origin[0], dst_origin[1] + y, dst_origin[2] + z]);
                self.memory.copy_from(&src.memory, src_offset, dst_offset, row)?;
            }
        }
        Ok(())
    }

    /// Copy a region into a buffer, tightly packed at `buffer_offset`.
    pub fn copy_to_buffer(&self, dst: &Buffer, origin: [usize; 3], region: [usize; 3], buffer_offset: usize) -> Result<()> {
        self.check_region(origin, region)?;
        self.for_each_row(origin, region, |offset, packed, row| {
            dst.memory().copy_from(&self.memory, offset, buffer_offset + packed, row)
        })
    }

    /// Copy tightly-packed rows from a buffer at `buffer_offset` into a region.
    pub fn copy_from_buffer(&self, src: &Buffer, buffer_offset: usize, origin: [usize; 3], region: [usize; 3]) -> Result<()> {
        self.check_region(origin, region)?;
        self.for_each_row(origin, region, |offset, packed, row| {
            self.memory.copy_from(src.memory(), buffer_offset + packed, offset, row)
        })
    }
}
