use core::fmt::Arguments;

pub static SL_CHECKS: bool = cfg!(feature = "debug");
pub static SL_VERBOSE: bool = cfg!(feature = "verbose");
pub static VERBOSE_DEL: &str = "====================================";

#[cfg(unix)]
mod ext {
    pub fn debug(s: &str) {
        libc_print::libc_println!("{}", s);
    }
}

#[cfg(not(unix))]
mod ext {
    // No host print facility is assumed here; traces are dropped.
    pub fn debug(_s: &str) {}
}

/// Static out buffer type
type StaticStr = str_buf::StrBuf<200>;
/// Static out buffer - we use it to avoid memory allocations,
/// when something is printed inside allocator code.
static OUT_BUFFER: spin::Mutex<StaticStr> = spin::Mutex::new(StaticStr::new());

/// Prints string with args.
/// What is the out stream defines in @ext module.
#[inline(never)]
pub fn slprint_fn(args: Arguments<'_>) {
    let mut buf = OUT_BUFFER.lock();
    let _ = core::fmt::write(&mut *buf, args);
    ext::debug(&buf);
    *buf = StaticStr::new();
}

/// Prints string with args if @SL_VERBOSE is set.
/// What is the out stream defines in @ext module.
#[macro_export]
macro_rules! slverbose {
    ($($arg:tt)*) => {
        if $crate::slverbose::SL_VERBOSE {
            $crate::slverbose::slprint_fn(format_args!($($arg)*))
        }
    }
}

extern crate alloc;
use self::alloc::alloc::handle_alloc_error;

/// Prints current line and throw error using @handle_alloc_error.
#[inline(never)]
pub fn slassert_fn(line: u32) -> ! {
    slprint_fn(format_args!("ALLOC ASSERT: {}", line));
    handle_alloc_error(self::alloc::alloc::Layout::new::<u32>());
}

/// Acts like assert using handle_alloc_error if @SL_CHECKS is set, else does nothing.
#[macro_export]
macro_rules! slassert {
    ($check:expr) => {
        if $crate::slverbose::SL_CHECKS && !($check) {
            $crate::slverbose::slassert_fn(line!());
        }
    };
}
