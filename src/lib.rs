//! A segregated-fit memory allocator with boundary-tagged blocks.
//!
//! The allocator services malloc/free/realloc requests from one contiguous
//! heap segment that grows page-by-page into an address-space reservation.
//! Free blocks are indexed by 30 size-class lists; adjacent free blocks are
//! merged eagerly on every free using the boundary-tag footers. The design
//! is wrapped up in a `Slmalloc` type, and every instance owns its own heap,
//! so independent heaps can coexist in one process.
//!
//! Only 8-byte alignment is offered, freeing does not zero memory, and pages
//! are never handed back to the OS. Currently doesn't implement `Drop` to
//! release the segment either. That may happen eventually though!

#![no_std]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::missing_safety_doc)]

#[cfg(test)]
extern crate std;

use core::ptr;

mod common;
mod segment;
mod slmalloc;
#[doc(hidden)]
pub mod slverbose;

#[cfg(all(feature = "global", not(test)))]
mod global;
#[cfg(all(feature = "global", not(test)))]
pub use self::global::GlobalSlmalloc;
#[cfg(all(feature = "global", not(test)))]
pub use global::alloced_mem_size;

pub use self::slmalloc::ALIGNMENT;

/// An allocator instance
///
/// Instances of this type own one heap segment each and are unusable until
/// `init` has reserved it. All methods are `unsafe` for the same reasons the
/// `GlobalAlloc` contract is: the caller vouches for the pointers it passes
/// back in.
pub struct Slmalloc(slmalloc::Slmalloc);

/// Constant initializer for `Slmalloc` structure.
pub const SLMALLOC_INIT: Slmalloc = Slmalloc(slmalloc::SLMALLOC_INIT);

#[cfg(target_arch = "wasm32")]
#[path = "wasm.rs"]
mod sys;

#[cfg(target_os = "macos")]
#[path = "macos.rs"]
mod sys;

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
mod sys;

#[cfg(target_os = "windows")]
#[path = "windows.rs"]
mod sys;

#[allow(clippy::new_without_default)]
impl Slmalloc {
    /// Creates a new instance of an allocator, same as `SLMALLOC_INIT`.
    pub fn new() -> Slmalloc {
        SLMALLOC_INIT
    }

    /// Reserves and formats the heap segment. Returns false if the OS
    /// refuses the reservation; one-shot per instance.
    #[inline]
    pub unsafe fn init(&mut self) -> bool {
        self.0.init()
    }

    /// Allocates `size` bytes with `align` align.
    ///
    /// Returns a null pointer if allocation fails or if `align` exceeds the
    /// fixed 8-byte alignment this allocator offers. A zero `size` returns
    /// null without touching the heap.
    #[inline]
    pub unsafe fn malloc(&mut self, size: usize, align: usize) -> *mut u8 {
        if align <= ALIGNMENT {
            self.0.malloc(size)
        } else {
            ptr::null_mut()
        }
    }

    /// Same as `malloc`, except if the allocation succeeds it's guaranteed
    /// to point to `size` bytes of zeros.
    #[inline]
    pub unsafe fn calloc(&mut self, size: usize, align: usize) -> *mut u8 {
        let ptr = self.malloc(size, align);
        if !ptr.is_null() {
            ptr::write_bytes(ptr, 0, size);
        }
        ptr
    }

    /// Deallocates `ptr`, a previous allocation of this instance, merging
    /// it with free neighbors. Null is a no-op.
    #[inline]
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        self.0.free(ptr)
    }

    /// Resizes the allocation at `ptr` to `new_size` bytes.
    ///
    /// Shrinks happen in place, growth absorbs a free successor when one is
    /// there and moves the data otherwise. Returns a null pointer if the
    /// memory couldn't be reallocated, but `ptr` is still valid then. A null
    /// `ptr` acts like `malloc`; a zero `new_size` frees `ptr` and returns
    /// null.
    #[inline]
    pub unsafe fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        self.0.realloc(ptr, new_size)
    }

    /// Walks the heap and every free list, checking the structural
    /// invariants. Read-only; returns false on the first violation.
    #[inline]
    pub unsafe fn validate(&self) -> bool {
        self.0.validate()
    }

    /// Returns alloced mem size
    pub unsafe fn alloced_mem_size(&self) -> usize {
        self.0.alloced_mem_size()
    }
}
