// src/kernel/process/mod.rs
//! Process table and per-process bookkeeping
//!
//! A fixed table of [`MAX_PROCESSES`] slots backs all processes. Slot
//! index doubles as the process identifier and selects the process's
//! physical frame and kernel stack. Slots 0..[`ROOT_SLOTS`] are
//! reserved so that every terminal can always start its first shell;
//! the remaining slots are shared by nested launches on any terminal.

pub mod exec;

use spin::Mutex;

use crate::arch::x86_64::context::SavedContext;
use crate::errors::{KernelError, KernelResult};
use crate::kernel::fd::{FdEntry, MAX_OPEN_FILES};

/// Total process slots
pub const MAX_PROCESSES: usize = 6;
/// Slots reserved for each terminal's first shell
pub const ROOT_SLOTS: usize = 3;
/// Maximum stored argument length, excluding the terminator
pub const MAX_ARG_LEN: usize = 128;

/// Process identifier, equal to the process-table slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProcessId(usize);

impl ProcessId {
    #[must_use]
    pub const fn new(slot: usize) -> Self {
        Self(slot)
    }

    #[must_use]
    pub const fn as_index(self) -> usize {
        self.0
    }
}

/// Per-process control block
pub struct Pcb {
    pub pid: ProcessId,
    /// Launching process, `None` for a terminal's root shell
    pub parent: Option<ProcessId>,
    /// Continuation of the launcher, resumed when this process halts
    pub launch_ctx: SavedContext,
    /// Continuation saved when the owning terminal is switched away
    pub resume_ctx: SavedContext,
    arg: [u8; MAX_ARG_LEN],
    arg_len: usize,
    arg_present: bool,
    pub fds: [FdEntry; MAX_OPEN_FILES],
}

impl Pcb {
    const EMPTY: Self = Self {
        pid: ProcessId::new(0),
        parent: None,
        launch_ctx: SavedContext::empty(),
        resume_ctx: SavedContext::empty(),
        arg: [0; MAX_ARG_LEN],
        arg_len: 0,
        arg_present: false,
        fds: [FdEntry::closed(); MAX_OPEN_FILES],
    };

    /// Initialize this block for a fresh launch. Descriptors 0 and 1
    /// are bound to the console; everything else starts closed.
    pub fn reset_for_launch(&mut self, pid: ProcessId, parent: Option<ProcessId>, arg: &[u8]) {
        self.pid = pid;
        self.parent = parent;
        self.launch_ctx = SavedContext::empty();
        self.resume_ctx = SavedContext::empty();
        self.arg = [0; MAX_ARG_LEN];
        let len = arg.len().min(MAX_ARG_LEN);
        self.arg[..len].copy_from_slice(&arg[..len]);
        self.arg_len = len;
        self.arg_present = len > 0;
        self.fds = [FdEntry::closed(); MAX_OPEN_FILES];
        self.fds[0] = FdEntry::console_input();
        self.fds[1] = FdEntry::console_output();
    }

    /// Copy the launch argument plus a NUL terminator into `out` and
    /// consume it. A second call fails until the next launch.
    pub fn take_arg(&mut self, out: &mut [u8]) -> KernelResult<usize> {
        if !self.arg_present {
            return Err(KernelError::NotFound);
        }
        if self.arg_len + 1 > out.len() {
            return Err(KernelError::Validation);
        }
        out[..self.arg_len].copy_from_slice(&self.arg[..self.arg_len]);
        out[self.arg_len] = b'\0';
        self.arg_present = false;
        Ok(self.arg_len)
    }

}

/// Fixed table of process control blocks
pub struct ProcessTable {
    slots: [Pcb; MAX_PROCESSES],
    in_use: [bool; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self { slots: [Pcb::EMPTY; MAX_PROCESSES], in_use: [false; MAX_PROCESSES] }
    }

    /// Claim the lowest free slot from the appropriate pool. The root
    /// pool serves a terminal starting its first process; nested
    /// launches draw from the shared pool only.
    pub fn allocate(&mut self, terminal_has_foreground: bool) -> KernelResult<ProcessId> {
        let range = if terminal_has_foreground { ROOT_SLOTS..MAX_PROCESSES } else { 0..ROOT_SLOTS };
        for slot in range {
            if !self.in_use[slot] {
                self.in_use[slot] = true;
                return Ok(ProcessId::new(slot));
            }
        }
        Err(KernelError::ResourceExhausted)
    }

    /// Release a slot. Block contents stay readable until the next
    /// launch reuses the slot; teardown reads them after freeing.
    pub fn free(&mut self, pid: ProcessId) {
        self.in_use[pid.as_index()] = false;
    }

    #[must_use]
    pub fn is_in_use(&self, pid: ProcessId) -> bool {
        self.in_use[pid.as_index()]
    }

    #[must_use]
    pub fn pcb(&self, pid: ProcessId) -> &Pcb {
        &self.slots[pid.as_index()]
    }

    #[must_use]
    pub fn pcb_mut(&mut self, pid: ProcessId) -> &mut Pcb {
        &mut self.slots[pid.as_index()]
    }
}

pub static PROCESS_TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable::new());

/// Raw pointer to a block's launch continuation. The pointee lives in
/// static storage; callers hand it to the stack switcher, which
/// writes through it after all locks are released.
pub(crate) fn launch_ctx_ptr(pid: ProcessId) -> *mut SavedContext {
    &mut PROCESS_TABLE.lock().pcb_mut(pid).launch_ctx as *mut SavedContext
}

pub(crate) fn resume_ctx_ptr(pid: ProcessId) -> *mut SavedContext {
    &mut PROCESS_TABLE.lock().pcb_mut(pid).resume_ctx as *mut SavedContext
}

pub(crate) fn resume_ctx(pid: ProcessId) -> SavedContext {
    PROCESS_TABLE.lock().pcb(pid).resume_ctx
}

#[cfg(all(test, feature = "std-tests"))]
mod tests {
    use super::*;

    #[test]
    fn root_pool_serves_first_process_per_terminal() {
        let mut table = ProcessTable::new();
        let a = table.allocate(false).unwrap();
        let b = table.allocate(false).unwrap();
        let c = table.allocate(false).unwrap();
        assert_eq!(a.as_index(), 0);
        assert_eq!(b.as_index(), 1);
        assert_eq!(c.as_index(), 2);
        // A fourth terminal cannot exist, but a stale cold start with a
        // full root pool must not spill into the shared pool.
        assert_eq!(table.allocate(false), Err(KernelError::ResourceExhausted));
    }

    #[test]
    fn nested_launches_use_shared_pool_only() {
        let mut table = ProcessTable::new();
        let root = table.allocate(false).unwrap();
        assert_eq!(root.as_index(), 0);
        for expected in ROOT_SLOTS..MAX_PROCESSES {
            assert_eq!(table.allocate(true).unwrap().as_index(), expected);
        }
        assert_eq!(table.allocate(true), Err(KernelError::ResourceExhausted));
        // Root slots 1 and 2 stay free throughout.
        assert!(!table.is_in_use(ProcessId::new(1)));
        assert!(!table.is_in_use(ProcessId::new(2)));
    }

    #[test]
    fn freed_slot_is_reused_lowest_first() {
        let mut table = ProcessTable::new();
        table.allocate(false).unwrap();
        let p3 = table.allocate(true).unwrap();
        let p4 = table.allocate(true).unwrap();
        table.free(p3);
        assert_eq!(table.allocate(true).unwrap(), p3);
        assert!(table.is_in_use(p4));
    }

    #[test]
    fn take_arg_is_single_use() {
        let mut pcb = Pcb::EMPTY;
        pcb.reset_for_launch(ProcessId::new(3), Some(ProcessId::new(0)), b"frame0.txt");
        let mut out = [0u8; 32];
        let n = pcb.take_arg(&mut out).unwrap();
        assert_eq!(&out[..n], b"frame0.txt");
        assert_eq!(out[n], b'\0');
        assert_eq!(pcb.take_arg(&mut out), Err(KernelError::NotFound));
    }

    #[test]
    fn take_arg_requires_room_for_terminator() {
        let mut pcb = Pcb::EMPTY;
        pcb.reset_for_launch(ProcessId::new(3), None, b"abcd");
        let mut exact = [0u8; 4];
        assert_eq!(pcb.take_arg(&mut exact), Err(KernelError::Validation));
        // Failure must not consume the argument.
        let mut out = [0u8; 5];
        assert_eq!(pcb.take_arg(&mut out), Ok(4));
    }

    #[test]
    fn launch_without_argument_reports_not_found() {
        let mut pcb = Pcb::EMPTY;
        pcb.reset_for_launch(ProcessId::new(0), None, b"");
        let mut out = [0u8; 8];
        assert_eq!(pcb.take_arg(&mut out), Err(KernelError::NotFound));
    }

    #[test]
    fn reset_binds_console_descriptors() {
        let mut pcb = Pcb::EMPTY;
        pcb.reset_for_launch(ProcessId::new(0), None, b"");
        assert!(pcb.fds[0].is_console_input());
        assert!(pcb.fds[1].is_console_output());
        for fd in 2..MAX_OPEN_FILES {
            assert!(!pcb.fds[fd].in_use());
        }
    }
}
