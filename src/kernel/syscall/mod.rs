// src/kernel/syscall/mod.rs
//! System call dispatch
//!
//! The interrupt stub (outside this crate) lands here with the call
//! number and three raw arguments. Every pointer argument is checked
//! against the user window before it is touched; results are returned
//! as non-negative values, failures as negative errno-style codes.

use crate::arch::x86_64::paging;
use crate::errors::{KernelError, KernelResult};
use crate::kernel::fd;
use crate::kernel::fs::MAX_NAME_LEN;
use crate::kernel::process::exec;
use crate::kernel::process::MAX_ARG_LEN;

/// System call result type
pub type SyscallResult = i64;

/// Returned for call numbers outside the table
pub const ERR_INVALID_SYSCALL: SyscallResult = -1;

pub const SYS_HALT: u64 = 1;
pub const SYS_EXECUTE: u64 = 2;
pub const SYS_READ: u64 = 3;
pub const SYS_WRITE: u64 = 4;
pub const SYS_OPEN: u64 = 5;
pub const SYS_CLOSE: u64 = 6;
pub const SYS_GETARGS: u64 = 7;
pub const SYS_VIDMAP: u64 = 8;
pub const SYS_SET_HANDLER: u64 = 9;
pub const SYS_SIGRETURN: u64 = 10;

/// Map a kernel error onto its errno-style code.
const fn errno(err: KernelError) -> SyscallResult {
    match err {
        KernelError::NotFound => -2,
        KernelError::Format => -8,
        KernelError::InvalidHandle => -9,
        KernelError::ResourceExhausted => -11,
        KernelError::Validation => -22,
        KernelError::NotSupported => -38,
    }
}

fn result_to_ret(result: KernelResult<usize>) -> SyscallResult {
    match result {
        Ok(n) => n as SyscallResult,
        Err(err) => errno(err),
    }
}

/// Borrow user memory for reading. The window check is the only
/// guard; the region is mapped whenever the check passes.
fn user_slice<'a>(addr: u64, len: u64) -> KernelResult<&'a [u8]> {
    if !paging::user_window_contains(addr, len) {
        return Err(KernelError::Validation);
    }
    Ok(unsafe { core::slice::from_raw_parts(addr as *const u8, len as usize) })
}

fn user_slice_mut<'a>(addr: u64, len: u64) -> KernelResult<&'a mut [u8]> {
    if !paging::user_window_contains(addr, len) {
        return Err(KernelError::Validation);
    }
    Ok(unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len as usize) })
}

/// Copy a NUL-terminated user string into `buf`, returning its length.
fn read_user_cstr(addr: u64, buf: &mut [u8]) -> KernelResult<usize> {
    for i in 0..buf.len() {
        let byte = user_slice(addr + i as u64, 1)?[0];
        if byte == 0 {
            return Ok(i);
        }
        buf[i] = byte;
    }
    // No terminator within the buffer.
    Err(KernelError::Validation)
}

fn sys_halt(status: u64, _a2: u64, _a3: u64) -> SyscallResult {
    exec::halt(status as u8)
}

fn sys_execute(command: u64, _a2: u64, _a3: u64) -> SyscallResult {
    let mut buf = [0u8; MAX_ARG_LEN];
    let len = match read_user_cstr(command, &mut buf) {
        Ok(len) => len,
        Err(err) => return errno(err),
    };
    let Ok(command) = core::str::from_utf8(&buf[..len]) else {
        return errno(KernelError::Validation);
    };
    match exec::execute(command) {
        Ok(status) => SyscallResult::from(status),
        Err(err) => errno(err),
    }
}

fn sys_read(fd: u64, buf: u64, len: u64) -> SyscallResult {
    match user_slice_mut(buf, len) {
        Ok(buf) => result_to_ret(fd::read(fd as usize, buf)),
        Err(err) => errno(err),
    }
}

fn sys_write(fd: u64, buf: u64, len: u64) -> SyscallResult {
    match user_slice(buf, len) {
        Ok(buf) => result_to_ret(fd::write(fd as usize, buf)),
        Err(err) => errno(err),
    }
}

fn sys_open(name: u64, _a2: u64, _a3: u64) -> SyscallResult {
    let mut buf = [0u8; MAX_NAME_LEN + 1];
    let len = match read_user_cstr(name, &mut buf) {
        Ok(len) => len,
        Err(err) => return errno(err),
    };
    let Ok(name) = core::str::from_utf8(&buf[..len]) else {
        return errno(KernelError::Validation);
    };
    result_to_ret(fd::open(name))
}

fn sys_close(fd: u64, _a2: u64, _a3: u64) -> SyscallResult {
    match fd::close(fd as usize) {
        Ok(()) => 0,
        Err(err) => errno(err),
    }
}

fn sys_getargs(buf: u64, len: u64, _a3: u64) -> SyscallResult {
    match user_slice_mut(buf, len) {
        Ok(buf) => result_to_ret(fd::getargs(buf)),
        Err(err) => errno(err),
    }
}

/// Hand the caller a user-space view of the text display. The target
/// pointer must itself live in the user window.
fn sys_vidmap(target: u64, _a2: u64, _a3: u64) -> SyscallResult {
    if !paging::user_window_contains(target, core::mem::size_of::<u64>() as u64) {
        return errno(KernelError::Validation);
    }
    let vid = paging::map_display_for_user();
    unsafe { core::ptr::write(target as *mut u64, vid) };
    0
}

fn sys_set_handler(_signum: u64, _handler: u64, _a3: u64) -> SyscallResult {
    errno(KernelError::NotSupported)
}

fn sys_sigreturn(_a1: u64, _a2: u64, _a3: u64) -> SyscallResult {
    errno(KernelError::NotSupported)
}

type SyscallHandler = fn(u64, u64, u64) -> SyscallResult;

/// Dispatch table, indexed by call number minus one
static SYSCALL_TABLE: &[SyscallHandler] = &[
    sys_halt,        // 1
    sys_execute,     // 2
    sys_read,        // 3
    sys_write,       // 4
    sys_open,        // 5
    sys_close,       // 6
    sys_getargs,     // 7
    sys_vidmap,      // 8
    sys_set_handler, // 9
    sys_sigreturn,   // 10
];

/// Dispatch a system call to its handler.
pub fn dispatch(number: u64, arg1: u64, arg2: u64, arg3: u64) -> SyscallResult {
    let Some(index) = (number as usize).checked_sub(1) else {
        return ERR_INVALID_SYSCALL;
    };
    let Some(handler) = SYSCALL_TABLE.get(index) else {
        return ERR_INVALID_SYSCALL;
    };
    handler(arg1, arg2, arg3)
}
