// src/kernel/process/exec.rs
//! Program launch and teardown
//!
//! `execute` runs a program synchronously: the caller's continuation
//! is captured, the child runs in its place, and the caller resumes
//! with the child's exit status once the child calls `halt`. Launch
//! depth is bounded only by the process table.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

use crate::arch::x86_64::{context, paging, tss};
use crate::arch::{disable_interrupts, enable_interrupts};
use crate::debug_println;
use crate::errors::{KernelError, KernelResult};
use crate::kernel::fd::{FdEntry, FIRST_USER_FD, MAX_OPEN_FILES};
use crate::kernel::fs::{self, FileKind};
use crate::kernel::process::{ProcessId, PROCESS_TABLE};
use crate::kernel::terminal;

/// First four bytes of a loadable program image
pub const EXEC_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
/// Byte offset of the little-endian 32-bit entry point in the image
pub const ENTRY_OFFSET: usize = 24;
/// Longest accepted program name
pub const MAX_PROGRAM_NAME: usize = 32;
/// Status reported when a program dies on an exception
pub const FORCED_STATUS: u16 = 256;

/// Set by the exception path so the next halt reports [`FORCED_STATUS`]
static SQUASH_FLAG: AtomicBool = AtomicBool::new(false);
/// Exit status in flight from a halting child to its resuming parent
static LAST_HALT_STATUS: AtomicU16 = AtomicU16::new(0);
/// Entry point handed from the launch path to the new context
static PENDING_ENTRY: AtomicU64 = AtomicU64::new(0);

/// Split a command line into program name and argument string.
fn parse_command(command: &str) -> KernelResult<(&str, &str)> {
    let command = command.trim_start_matches(' ');
    if command.is_empty() {
        return Err(KernelError::Validation);
    }
    let (name, rest) = match command.find(' ') {
        Some(split) => (&command[..split], command[split..].trim_start_matches(' ')),
        None => (command, ""),
    };
    if name.len() > MAX_PROGRAM_NAME {
        return Err(KernelError::Validation);
    }
    Ok((name, rest))
}

#[derive(Debug)]
struct Launch {
    pid: ProcessId,
    entry: u32,
    inode: u32,
}

/// Validate the command and claim all bookkeeping for the launch.
/// Fails without touching any table. Interrupts must be masked.
fn stage_execute(command: &str) -> KernelResult<Launch> {
    let (name, arg) = parse_command(command)?;
    let dentry = fs::with(|fs| fs.lookup(name))?.ok_or(KernelError::NotFound)?;
    if dentry.kind != FileKind::Regular {
        return Err(KernelError::Format);
    }
    let mut header = [0u8; 28];
    let got = fs::with(|fs| fs.read_bytes(dentry.inode, 0, &mut header))?;
    if got < header.len() || header[..4] != EXEC_MAGIC {
        return Err(KernelError::Format);
    }
    let entry = u32::from_le_bytes([
        header[ENTRY_OFFSET],
        header[ENTRY_OFFSET + 1],
        header[ENTRY_OFFSET + 2],
        header[ENTRY_OFFSET + 3],
    ]);
    if !paging::user_window_contains(u64::from(entry), 1) {
        return Err(KernelError::Format);
    }

    let parent = terminal::foreground_of_active();
    let pid = PROCESS_TABLE.lock().allocate(parent.is_some())?;
    terminal::set_active_foreground(Some(pid));
    PROCESS_TABLE.lock().pcb_mut(pid).reset_for_launch(pid, parent, arg.as_bytes());
    Ok(Launch { pid, entry, inode: dentry.inode })
}

/// Run `command` and block until the launched program halts.
///
/// On success the return value is the child's exit status: 0..=255
/// for a voluntary halt, [`FORCED_STATUS`] when the child died on an
/// exception. On failure nothing was launched and no state changed.
pub fn execute(command: &str) -> KernelResult<u16> {
    disable_interrupts();
    let launch = match stage_execute(command) {
        Ok(launch) => launch,
        Err(err) => {
            enable_interrupts();
            return Err(err);
        }
    };
    unsafe { commit_and_launch(&launch) };
    // Back here only after the child halted; its status is staged and
    // interrupts are still masked.
    let status = LAST_HALT_STATUS.load(Ordering::SeqCst);
    enable_interrupts();
    Ok(status)
}

/// Map the child's frame, load its image, and switch onto its kernel
/// stack. Returns when the child halts.
unsafe fn commit_and_launch(launch: &Launch) {
    let slot = launch.pid.as_index();
    paging::map_process(slot);
    let image = unsafe {
        core::slice::from_raw_parts_mut(
            paging::USER_LOAD_VIRT as *mut u8,
            (paging::PROCESS_FRAME_SIZE - paging::USER_LOAD_OFFSET) as usize,
        )
    };
    // fs::with cannot fail here, stage_execute already read the header.
    let _ = fs::with(|fs| fs.read_bytes(launch.inode, 0, image));

    tss::set_kernel_stack(tss::kernel_stack_top(slot));
    PENDING_ENTRY.store(u64::from(launch.entry), Ordering::SeqCst);
    let fresh = unsafe { context::initial_context(tss::kernel_stack_top(slot), launch_entry) };
    unsafe { context::switch_into(super::launch_ctx_ptr(launch.pid), fresh) };
}

/// First code on a new process's kernel stack: drop to ring 3.
unsafe extern "C" fn launch_entry() -> ! {
    let entry = PENDING_ENTRY.load(Ordering::SeqCst);
    unsafe { context::enter_user(entry, paging::USER_STACK_TOP) }
}

enum HaltAction {
    /// Root shell of a terminal ended; start a fresh one
    RelaunchShell,
    /// Wake the launcher with the staged status
    ResumeParent { parent: ProcessId, status: u16, resume: context::SavedContext },
}

/// Release the halting process's bookkeeping and decide where control
/// goes next. Interrupts must be masked.
fn stage_halt(forced: bool, status: u8) -> HaltAction {
    let Some(pid) = terminal::foreground_of_active() else {
        debug_assert!(false, "halt without a foreground process");
        return HaltAction::RelaunchShell;
    };
    let (parent, resume) = {
        let mut table = PROCESS_TABLE.lock();
        let pcb = table.pcb_mut(pid);
        let parent = pcb.parent;
        for fd in FIRST_USER_FD..MAX_OPEN_FILES {
            pcb.fds[fd] = FdEntry::closed();
        }
        let resume = pcb.launch_ctx;
        table.free(pid);
        (parent, resume)
    };
    match parent {
        None => {
            terminal::set_active_foreground(None);
            debug_println!("root shell exited with status {}", status);
            HaltAction::RelaunchShell
        }
        Some(parent) => {
            terminal::set_active_foreground(Some(parent));
            let status = if forced && status == u8::MAX { FORCED_STATUS } else { u16::from(status) };
            HaltAction::ResumeParent { parent, status, resume }
        }
    }
}

/// Terminate the calling process and resume its launcher.
///
/// A terminal's root shell has no launcher; its exit restarts the
/// shell instead. Never returns to the caller.
pub fn halt(status: u8) -> ! {
    disable_interrupts();
    // Consume the squash marker unconditionally so a stale flag can
    // never inflate a later voluntary exit.
    let forced = SQUASH_FLAG.swap(false, Ordering::SeqCst);
    match stage_halt(forced, status) {
        HaltAction::RelaunchShell => {
            enable_interrupts();
            run_initial_shell()
        }
        HaltAction::ResumeParent { parent, status, resume } => unsafe {
            paging::map_process(parent.as_index());
            tss::set_kernel_stack(tss::kernel_stack_top(parent.as_index()));
            LAST_HALT_STATUS.store(status, Ordering::SeqCst);
            context::resume(resume)
        },
    }
}

/// Exception-path teardown: mark the death as forced, then halt.
pub fn forced_terminate() -> ! {
    SQUASH_FLAG.store(true, Ordering::SeqCst);
    halt(u8::MAX)
}

/// Run the active terminal's shell, restarting it forever.
pub fn run_initial_shell() -> ! {
    loop {
        if let Err(err) = execute("shell") {
            debug_println!("cannot start shell: {}", err);
            loop {
                core::hint::spin_loop();
            }
        }
    }
}

#[cfg(all(test, feature = "std-tests"))]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use crate::kernel::fs::fixtures;
    use crate::kernel::process::{ProcessTable, MAX_PROCESSES, ROOT_SLOTS};
    use crate::kernel::terminal::TerminalId;

    fn fresh_tables() {
        *PROCESS_TABLE.lock() = ProcessTable::new();
        terminal::set_active_foreground_for_tests(TerminalId::new(0), None);
        fixtures::mount_standard();
    }

    #[test]
    fn command_parsing_splits_name_and_argument() {
        assert_eq!(parse_command("shell"), Ok(("shell", "")));
        assert_eq!(parse_command("  cat   notes.txt"), Ok(("cat", "notes.txt")));
        assert_eq!(parse_command("grep a b"), Ok(("grep", "a b")));
        assert_eq!(parse_command(""), Err(KernelError::Validation));
        assert_eq!(parse_command("    "), Err(KernelError::Validation));
    }

    #[test]
    fn overlong_program_names_are_rejected() {
        let long = "x".repeat(MAX_PROGRAM_NAME + 1);
        assert_eq!(parse_command(&long), Err(KernelError::Validation));
        let max = "x".repeat(MAX_PROGRAM_NAME);
        assert!(parse_command(&max).is_ok());
    }

    #[test]
    fn staging_rejects_missing_and_malformed_programs() {
        let _guard = terminal::test_lock();
        fresh_tables();
        assert_eq!(stage_execute("nothere").unwrap_err(), KernelError::NotFound);
        // Present but not a program image.
        assert_eq!(stage_execute("notes.txt").unwrap_err(), KernelError::Format);
        // Directory and device files never execute.
        assert_eq!(stage_execute(".").unwrap_err(), KernelError::Format);
        assert_eq!(stage_execute("clock").unwrap_err(), KernelError::Format);
        // Failures leave the table untouched.
        assert!(!PROCESS_TABLE.lock().is_in_use(ProcessId::new(0)));
        assert_eq!(terminal::foreground_of_active(), None);
    }

    #[test]
    fn staging_rejects_entry_outside_the_user_window() {
        let _guard = terminal::test_lock();
        fresh_tables();
        let mut fs = fixtures::RamFs::new();
        fs.add_program("bad", 0);
        fs::mount(Box::new(fs));
        assert_eq!(stage_execute("bad").unwrap_err(), KernelError::Format);
    }

    #[test]
    fn first_launch_on_a_terminal_uses_the_root_pool() {
        let _guard = terminal::test_lock();
        fresh_tables();
        let launch = stage_execute("shell").unwrap();
        assert_eq!(launch.pid.as_index(), 0);
        assert_eq!(terminal::foreground_of_active(), Some(launch.pid));
        let table = PROCESS_TABLE.lock();
        assert!(table.is_in_use(launch.pid));
        assert_eq!(table.pcb(launch.pid).parent, None);
    }

    #[test]
    fn nested_launches_chain_parents_through_the_shared_pool() {
        let _guard = terminal::test_lock();
        fresh_tables();
        let root = stage_execute("shell").unwrap();
        let mid = stage_execute("prog arg1").unwrap();
        let leaf = stage_execute("prog").unwrap();
        assert_eq!(mid.pid.as_index(), ROOT_SLOTS);
        assert_eq!(leaf.pid.as_index(), ROOT_SLOTS + 1);
        let table = PROCESS_TABLE.lock();
        assert_eq!(table.pcb(mid.pid).parent, Some(root.pid));
        assert_eq!(table.pcb(leaf.pid).parent, Some(mid.pid));
        drop(table);
        assert_eq!(terminal::foreground_of_active(), Some(leaf.pid));
    }

    #[test]
    fn exhausted_pool_fails_without_side_effects() {
        let _guard = terminal::test_lock();
        fresh_tables();
        stage_execute("shell").unwrap();
        for _ in ROOT_SLOTS..MAX_PROCESSES {
            stage_execute("prog").unwrap();
        }
        let before = terminal::foreground_of_active();
        assert_eq!(stage_execute("prog").unwrap_err(), KernelError::ResourceExhausted);
        assert_eq!(terminal::foreground_of_active(), before);
    }

    #[test]
    fn halt_returns_control_and_slot_to_the_parent() {
        let _guard = terminal::test_lock();
        fresh_tables();
        let root = stage_execute("shell").unwrap();
        let child = stage_execute("prog").unwrap();
        match stage_halt(false, 7) {
            HaltAction::ResumeParent { parent, status, .. } => {
                assert_eq!(parent, root.pid);
                assert_eq!(status, 7);
            }
            HaltAction::RelaunchShell => panic!("expected a parent resume"),
        }
        assert_eq!(terminal::foreground_of_active(), Some(root.pid));
        assert!(!PROCESS_TABLE.lock().is_in_use(child.pid));
    }

    #[test]
    fn forced_death_squashes_255_to_the_sentinel() {
        let _guard = terminal::test_lock();
        fresh_tables();
        stage_execute("shell").unwrap();
        stage_execute("prog").unwrap();
        match stage_halt(true, u8::MAX) {
            HaltAction::ResumeParent { status, .. } => assert_eq!(status, FORCED_STATUS),
            HaltAction::RelaunchShell => panic!("expected a parent resume"),
        }
    }

    #[test]
    fn voluntary_255_stays_255() {
        let _guard = terminal::test_lock();
        fresh_tables();
        stage_execute("shell").unwrap();
        stage_execute("prog").unwrap();
        match stage_halt(false, u8::MAX) {
            HaltAction::ResumeParent { status, .. } => assert_eq!(status, 255),
            HaltAction::RelaunchShell => panic!("expected a parent resume"),
        }
    }

    #[test]
    fn root_halt_clears_the_terminal_for_a_fresh_shell() {
        let _guard = terminal::test_lock();
        fresh_tables();
        let root = stage_execute("shell").unwrap();
        assert!(matches!(stage_halt(false, 0), HaltAction::RelaunchShell));
        assert_eq!(terminal::foreground_of_active(), None);
        assert!(!PROCESS_TABLE.lock().is_in_use(root.pid));
        // The freed root slot is reclaimed by the next shell.
        assert_eq!(stage_execute("shell").unwrap().pid, root.pid);
    }

    #[test]
    fn halt_closes_user_descriptors_but_keeps_the_console_pair() {
        let _guard = terminal::test_lock();
        fresh_tables();
        stage_execute("shell").unwrap();
        let child = stage_execute("prog").unwrap();
        PROCESS_TABLE.lock().pcb_mut(child.pid).fds[3] = FdEntry::console_output();
        stage_halt(false, 0);
        let table = PROCESS_TABLE.lock();
        let pcb = table.pcb(child.pid);
        assert!(pcb.fds[0].is_console_input());
        assert!(pcb.fds[1].is_console_output());
        assert!(!pcb.fds[3].in_use());
    }
}
