//! Windows is unsupported currently.
//! It means, that you cannot use this allocator in native windows programs.

pub fn page_size() -> usize {
    unreachable!("Windows is unsupported");
}

pub unsafe fn reserve(_size: usize) -> *mut u8 {
    unreachable!("Windows is unsupported");
}

pub unsafe fn commit(_ptr: *mut u8, _size: usize) -> bool {
    unreachable!("Windows is unsupported");
}

#[cfg(feature = "global")]
pub fn acquire_global_lock() {
    unreachable!("Windows is unsupported");
}

#[cfg(feature = "global")]
pub fn release_global_lock() {
    unreachable!("Windows is unsupported");
}
