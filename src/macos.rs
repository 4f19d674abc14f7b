extern crate libc;

use core::ptr;

pub fn page_size() -> usize {
    0x4000
}

/// Reserves `size` bytes of address space without making them accessible.
pub unsafe fn reserve(size: usize) -> *mut u8 {
    let addr = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_NONE,
        libc::MAP_ANON | libc::MAP_PRIVATE,
        -1,
        0,
    );
    if addr == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        addr as *mut u8
    }
}

/// Makes `size` reserved bytes starting at `ptr` readable and writable.
pub unsafe fn commit(ptr: *mut u8, size: usize) -> bool {
    libc::mprotect(ptr as *mut _, size, libc::PROT_READ | libc::PROT_WRITE) == 0
}

#[cfg(feature = "global")]
static mut LOCK: libc::pthread_mutex_t = libc::PTHREAD_MUTEX_INITIALIZER;

#[cfg(feature = "global")]
pub fn acquire_global_lock() {
    unsafe { assert_eq!(libc::pthread_mutex_lock(core::ptr::addr_of_mut!(LOCK)), 0) }
}

#[cfg(feature = "global")]
pub fn release_global_lock() {
    unsafe { assert_eq!(libc::pthread_mutex_unlock(core::ptr::addr_of_mut!(LOCK)), 0) }
}
