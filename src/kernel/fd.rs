// src/kernel/fd.rs
//! Per-process file descriptors
//!
//! Every process owns a fixed table of [`MAX_OPEN_FILES`] descriptors.
//! Descriptors 0 and 1 are the console and can never be closed; the
//! rest are opened by name and dispatch on the device behind them.

use crate::arch::without_interrupts;
use crate::errors::{KernelError, KernelResult};
use crate::kernel::driver::{console, rtc};
use crate::kernel::fs::{self, FileKind, MAX_NAME_LEN};
use crate::kernel::process::{ProcessId, PROCESS_TABLE};
use crate::kernel::terminal;

/// Descriptor table size per process
pub const MAX_OPEN_FILES: usize = 8;
/// First descriptor available to `open`
pub const FIRST_USER_FD: usize = 2;

/// Device behind an open descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceOps {
    ConsoleInput,
    ConsoleOutput,
    File { inode: u32 },
    Directory,
    Clock,
}

/// One slot of a process's descriptor table
#[derive(Debug, Clone, Copy)]
pub struct FdEntry {
    ops: DeviceOps,
    position: usize,
    in_use: bool,
}

impl FdEntry {
    #[must_use]
    pub const fn closed() -> Self {
        Self { ops: DeviceOps::ConsoleInput, position: 0, in_use: false }
    }

    #[must_use]
    pub const fn console_input() -> Self {
        Self { ops: DeviceOps::ConsoleInput, position: 0, in_use: true }
    }

    #[must_use]
    pub const fn console_output() -> Self {
        Self { ops: DeviceOps::ConsoleOutput, position: 0, in_use: true }
    }

    #[must_use]
    pub const fn in_use(&self) -> bool {
        self.in_use
    }

    #[must_use]
    pub const fn is_console_input(&self) -> bool {
        self.in_use && matches!(self.ops, DeviceOps::ConsoleInput)
    }

    #[must_use]
    pub const fn is_console_output(&self) -> bool {
        self.in_use && matches!(self.ops, DeviceOps::ConsoleOutput)
    }
}

fn current_pid() -> KernelResult<ProcessId> {
    terminal::foreground_of_active().ok_or(KernelError::InvalidHandle)
}

/// Open `name` on the calling process, returning the new descriptor.
pub fn open(name: &str) -> KernelResult<usize> {
    let dentry = fs::with(|fs| fs.lookup(name))?.ok_or(KernelError::NotFound)?;
    let pid = current_pid()?;
    without_interrupts(|| {
        let mut table = PROCESS_TABLE.lock();
        let pcb = table.pcb_mut(pid);
        let fd = (FIRST_USER_FD..MAX_OPEN_FILES)
            .find(|&fd| !pcb.fds[fd].in_use)
            .ok_or(KernelError::ResourceExhausted)?;
        let ops = match dentry.kind {
            FileKind::Clock => {
                rtc::open();
                DeviceOps::Clock
            }
            FileKind::Directory => DeviceOps::Directory,
            FileKind::Regular => DeviceOps::File { inode: dentry.inode },
        };
        pcb.fds[fd] = FdEntry { ops, position: 0, in_use: true };
        Ok(fd)
    })
}

/// Read from descriptor `fd` into `buf`.
///
/// Console and clock reads block; the descriptor table lock is never
/// held across a blocking wait.
pub fn read(fd: usize, buf: &mut [u8]) -> KernelResult<usize> {
    let pid = current_pid()?;
    let entry = lookup_entry(pid, fd)?;
    let advance;
    let read = match entry.ops {
        DeviceOps::ConsoleInput => {
            advance = 0;
            console::read_line(buf)?
        }
        DeviceOps::ConsoleOutput => return Err(KernelError::Validation),
        DeviceOps::File { inode } => {
            let n = fs::with(|fs| fs.read_bytes(inode, entry.position, buf))?;
            advance = n;
            n
        }
        DeviceOps::Directory => {
            let Some(dentry) = fs::with(|fs| fs.dentry_by_index(entry.position))? else {
                return Ok(0);
            };
            let n = dentry.name_len.min(buf.len()).min(MAX_NAME_LEN);
            buf[..n].copy_from_slice(&dentry.name[..n]);
            advance = 1;
            n
        }
        DeviceOps::Clock => {
            advance = 0;
            rtc::wait_tick();
            0
        }
    };
    if advance > 0 {
        without_interrupts(|| {
            PROCESS_TABLE.lock().pcb_mut(pid).fds[fd].position += advance;
        });
    }
    Ok(read)
}

/// Write `buf` to descriptor `fd`. Only the console and the clock
/// accept writes.
pub fn write(fd: usize, buf: &[u8]) -> KernelResult<usize> {
    let pid = current_pid()?;
    let entry = lookup_entry(pid, fd)?;
    match entry.ops {
        DeviceOps::ConsoleOutput => Ok(console::write(buf)),
        DeviceOps::Clock => {
            let bytes: [u8; 4] = buf.try_into().map_err(|_| KernelError::Validation)?;
            rtc::set_frequency(u32::from_le_bytes(bytes))?;
            Ok(buf.len())
        }
        _ => Err(KernelError::Validation),
    }
}

/// Close descriptor `fd`. The console descriptors 0 and 1 are
/// permanent and refuse to close.
pub fn close(fd: usize) -> KernelResult<()> {
    if fd < FIRST_USER_FD {
        return Err(KernelError::Validation);
    }
    if fd >= MAX_OPEN_FILES {
        return Err(KernelError::InvalidHandle);
    }
    let pid = current_pid()?;
    without_interrupts(|| {
        let mut table = PROCESS_TABLE.lock();
        let pcb = table.pcb_mut(pid);
        if !pcb.fds[fd].in_use {
            return Err(KernelError::InvalidHandle);
        }
        if matches!(pcb.fds[fd].ops, DeviceOps::Clock) {
            rtc::close();
        }
        pcb.fds[fd] = FdEntry::closed();
        Ok(())
    })
}

/// Copy the calling process's launch argument into `buf`.
pub fn getargs(buf: &mut [u8]) -> KernelResult<usize> {
    let pid = current_pid()?;
    without_interrupts(|| PROCESS_TABLE.lock().pcb_mut(pid).take_arg(buf))
}

fn lookup_entry(pid: ProcessId, fd: usize) -> KernelResult<FdEntry> {
    if fd >= MAX_OPEN_FILES {
        return Err(KernelError::InvalidHandle);
    }
    without_interrupts(|| {
        let table = PROCESS_TABLE.lock();
        let entry = table.pcb(pid).fds[fd];
        if entry.in_use { Ok(entry) } else { Err(KernelError::InvalidHandle) }
    })
}
