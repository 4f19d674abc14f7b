use core::ptr;

use crate::common::align_up;
use crate::slassert;
use crate::sys;

extern crate static_assertions;

/// Upper bound on the heap segment, matching the 30-bit block size field.
/// Address space up to this size is reserved once at init; pages become
/// usable only as the segment grows into the reservation.
#[cfg(target_pointer_width = "64")]
pub const MAX_SEGMENT_SIZE: usize = 1 << 30;
#[cfg(target_pointer_width = "32")]
pub const MAX_SEGMENT_SIZE: usize = 1 << 28;

static_assertions::const_assert!(MAX_SEGMENT_SIZE - 1 <= (u32::MAX >> 2) as usize);

/// One contiguous, growable run of committed pages. The base address is
/// fixed at init; `extend` appends pages at the end and never moves or
/// releases anything (pages are not returned to the OS).
pub struct HeapSegment {
    base: *mut u8,
    size: usize,
    reserved: usize,
}

/// Constant initializer for an unmapped segment.
pub const SEGMENT_INIT: HeapSegment = HeapSegment {
    base: ptr::null_mut(),
    size: 0,
    reserved: 0,
};

impl HeapSegment {
    pub fn page_size() -> usize {
        sys::page_size()
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One-shot: reserves the maximal region and commits the first
    /// `npages` pages. Returns the segment base, or null on failure.
    pub unsafe fn init(&mut self, npages: usize) -> *mut u8 {
        slassert!(self.base.is_null());

        let nbytes = npages * sys::page_size();
        let reserved = align_up(MAX_SEGMENT_SIZE, sys::page_size());
        if nbytes == 0 || nbytes > reserved {
            return ptr::null_mut();
        }

        let base = sys::reserve(reserved);
        if base.is_null() {
            return ptr::null_mut();
        }
        if !sys::commit(base, nbytes) {
            return ptr::null_mut();
        }

        self.base = base;
        self.size = nbytes;
        self.reserved = reserved;
        base
    }

    /// Appends `npages` pages immediately after the current end. Returns
    /// a pointer to the start of the new region (the old end), or null if
    /// the reservation is exhausted or the pages cannot be committed.
    pub unsafe fn extend(&mut self, npages: usize) -> *mut u8 {
        if self.base.is_null() {
            return ptr::null_mut();
        }

        let grow = npages * sys::page_size();
        if grow == 0 || self.size + grow > self.reserved {
            return ptr::null_mut();
        }

        let end = self.base.add(self.size);
        if !sys::commit(end, grow) {
            return ptr::null_mut();
        }
        self.size += grow;
        end
    }
}
