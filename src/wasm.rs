use core::arch::wasm32;
use core::ptr;

pub fn page_size() -> usize {
    64 * 1024
}

/// Linear memory cannot be reserved ahead of time, so the heap claims the
/// current memory end as its base and commits by growing.
pub unsafe fn reserve(_size: usize) -> *mut u8 {
    (wasm32::memory_size(0) * page_size()) as *mut u8
}

/// Grows linear memory by `size` bytes. Fails if the grown region does not
/// start exactly at `ptr`, which means someone else grew memory in between
/// and the segment can no longer stay contiguous.
pub unsafe fn commit(ptr: *mut u8, size: usize) -> bool {
    let pages = size / page_size();
    let prev = wasm32::memory_grow(0, pages);
    if prev == usize::max_value() {
        return false;
    }
    prev * page_size() == ptr as usize
}

#[cfg(feature = "global")]
pub fn acquire_global_lock() {
    // single threaded, no need!
}

#[cfg(feature = "global")]
pub fn release_global_lock() {
    // single threaded, no need!
}
