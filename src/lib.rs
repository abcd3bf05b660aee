// src/lib.rs
//! mux_os - process-execution core of a small x86_64 kernel
//!
//! Creates, runs, suspends, resumes and tears down user programs,
//! multiplexing them across three independent terminals on a single CPU
//! with no preemptive scheduler. Control moves between processes only
//! through the execute/halt protocol or through a terminal hotkey switch.
//!
//! Boot glue (GDT/IDT/PIC setup, the bootloader handshake) lives outside
//! this crate; it is expected to call [`arch::x86_64::paging::init`],
//! [`init_heap`], mount a file system via [`kernel::fs::mount`] and then
//! enter [`kernel::process::exec::run_initial_shell`].

#![cfg_attr(not(feature = "std-tests"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod arch;
pub mod errors;
pub mod kernel;

/// Global heap allocator backing the few boxed objects in the kernel
/// (currently only the mounted file-system trait object).
///
/// Disabled under `std-tests`: the host test harness brings its own.
#[cfg(not(feature = "std-tests"))]
#[global_allocator]
static ALLOCATOR: linked_list_allocator::LockedHeap = linked_list_allocator::LockedHeap::empty();

/// Heap initialization error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// Already initialized
    AlreadyInitialized,
}

/// Initialize the kernel heap.
///
/// # Safety
///
/// - `heap_start..heap_start + heap_size` must be a mapped, writable
///   region that is used for nothing else
/// - must be called at most once, before any allocation
///
/// # Errors
///
/// - `HeapError::AlreadyInitialized` if the heap was already set up
#[cfg(not(feature = "std-tests"))]
pub unsafe fn init_heap(heap_start: *mut u8, heap_size: usize) -> Result<(), HeapError> {
    let mut heap = ALLOCATOR.lock();
    if heap.size() != 0 {
        return Err(HeapError::AlreadyInitialized);
    }
    unsafe {
        heap.init(heap_start, heap_size);
    }
    Ok(())
}

/// Kernel debug logging macro.
///
/// Formats into the text display through the console writer. Logging from
/// the core is limited to lifecycle events (process created/terminated,
/// terminal switched); user-visible diagnostics stay with the shell.
#[macro_export]
macro_rules! debug_println {
    () => {
        $crate::kernel::driver::display::debug_write(format_args!("\n"))
    };
    ($($arg:tt)*) => {{
        $crate::kernel::driver::display::debug_write(format_args!($($arg)*));
        $crate::kernel::driver::display::debug_write(format_args!("\n"));
    }};
}
