// src/kernel/terminal/mod.rs
//! Terminal multiplexing and the cooperative scheduler
//!
//! Three virtual terminals share the display and keyboard. Exactly
//! one is active at a time; Alt+F1..F3 switches between them. Each
//! terminal carries its own screen snapshot, editing line, and
//! foreground process. Switching away suspends the foreground process
//! mid-kernel by saving its continuation; switching back resumes it
//! exactly where it stopped. No timer preemption: a terminal's
//! process chain runs until it blocks, halts, or is switched away.

use spin::Mutex;

use crate::arch::x86_64::context;
use crate::arch::x86_64::paging;
use crate::arch::x86_64::tss;
use crate::arch::{disable_interrupts, enable_interrupts};
use crate::kernel::driver::console::{self, LINE_CAPACITY};
use crate::kernel::driver::display::{self, VRAM_SIZE};
use crate::kernel::process::{self, ProcessId};

/// Number of virtual terminals
pub const NUM_TERMINALS: usize = 3;

/// Terminal identifier in `0..NUM_TERMINALS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalId(usize);

impl TerminalId {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn as_index(self) -> usize {
        self.0
    }
}

/// Everything a backgrounded terminal needs to come back unchanged
struct TerminalContext {
    foreground: Option<ProcessId>,
    display: [u8; VRAM_SIZE],
    cursor: (usize, usize),
    line: [u8; LINE_CAPACITY],
    line_len: usize,
    line_ready: bool,
}

impl TerminalContext {
    const EMPTY: Self = Self {
        foreground: None,
        display: [0; VRAM_SIZE],
        cursor: (0, 0),
        line: [0; LINE_CAPACITY],
        line_len: 0,
        line_ready: false,
    };
}

/// What the switch path has to do once state is staged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchPlan {
    /// Target terminal has no process yet; start its first shell
    ColdStart { from: Option<ProcessId> },
    /// Target terminal has a suspended process to resume
    Resume { from: Option<ProcessId>, to: ProcessId },
}

struct TerminalScheduler {
    terminals: [TerminalContext; NUM_TERMINALS],
    active: TerminalId,
}

impl TerminalScheduler {
    const fn new() -> Self {
        Self {
            terminals: [TerminalContext::EMPTY, TerminalContext::EMPTY, TerminalContext::EMPTY],
            active: TerminalId::new(0),
        }
    }

    /// Swap display, cursor, and line state from the outgoing to the
    /// incoming terminal, mark the target active, and report what the
    /// caller still has to do. `None` means nothing: the target was
    /// already active.
    fn stage_switch(&mut self, target: TerminalId) -> Option<SwitchPlan> {
        if target == self.active {
            return None;
        }
        let outgoing = self.active.as_index();
        {
            let out = &mut self.terminals[outgoing];
            display::snapshot_into(&mut out.display);
            out.cursor = display::cursor();
            out.line_ready = console::save_line(&mut out.line, &mut out.line_len);
        }
        self.active = target;
        let incoming = &self.terminals[target.as_index()];
        display::restore_from(&incoming.display);
        display::set_cursor(incoming.cursor.0, incoming.cursor.1);
        console::restore_line(&incoming.line, incoming.line_len, incoming.line_ready);

        let from = self.terminals[outgoing].foreground;
        match incoming.foreground {
            Some(to) => Some(SwitchPlan::Resume { from, to }),
            None => Some(SwitchPlan::ColdStart { from }),
        }
    }
}

static SCHEDULER: Mutex<TerminalScheduler> = Mutex::new(TerminalScheduler::new());

/// Make `target` the active terminal.
///
/// Called from the keyboard interrupt path. When the outgoing
/// terminal has a foreground process, its continuation is saved on
/// the current kernel stack and control only comes back here when
/// some later switch selects it again.
pub fn switch_to(target: TerminalId) {
    disable_interrupts();
    let plan = SCHEDULER.lock().stage_switch(target);
    let Some(plan) = plan else {
        enable_interrupts();
        return;
    };
    match plan {
        SwitchPlan::Resume { from, to } => unsafe {
            paging::map_process(to.as_index());
            tss::set_kernel_stack(tss::kernel_stack_top(to.as_index()));
            match from {
                Some(from) => {
                    context::switch_into(process::resume_ctx_ptr(from), process::resume_ctx(to));
                }
                None => context::resume(process::resume_ctx(to)),
            }
        },
        SwitchPlan::ColdStart { from } => match from {
            Some(from) => unsafe {
                let fresh =
                    context::initial_context(bootstrap_stack_top(target.as_index()), first_shell);
                context::switch_into(process::resume_ctx_ptr(from), fresh);
            },
            None => {
                // Nothing is running yet; claim this stack for the
                // target terminal's first shell.
                enable_interrupts();
                crate::kernel::process::exec::run_initial_shell();
            }
        },
    }
    enable_interrupts();
}

/// Active terminal.
#[must_use]
pub fn active() -> TerminalId {
    SCHEDULER.lock().active
}

/// Foreground process of the active terminal, `None` before its first
/// shell starts.
#[must_use]
pub fn foreground_of_active() -> Option<ProcessId> {
    let sched = SCHEDULER.lock();
    sched.terminals[sched.active.as_index()].foreground
}

/// Record the active terminal's foreground process. Launch and halt
/// paths call this with interrupts masked.
pub fn set_active_foreground(pid: Option<ProcessId>) {
    let mut sched = SCHEDULER.lock();
    let active = sched.active.as_index();
    sched.terminals[active].foreground = pid;
}

#[repr(C, align(16))]
struct BootstrapStack(core::cell::UnsafeCell<[u8; tss::KERNEL_STACK_SIZE]>);

unsafe impl Sync for BootstrapStack {}

// One spare stack per terminal for the window between a cold start
// and the first shell claiming a process slot.
static BOOTSTRAP_STACKS: [BootstrapStack; NUM_TERMINALS] = [
    BootstrapStack(core::cell::UnsafeCell::new([0; tss::KERNEL_STACK_SIZE])),
    BootstrapStack(core::cell::UnsafeCell::new([0; tss::KERNEL_STACK_SIZE])),
    BootstrapStack(core::cell::UnsafeCell::new([0; tss::KERNEL_STACK_SIZE])),
];

fn bootstrap_stack_top(terminal: usize) -> u64 {
    BOOTSTRAP_STACKS[terminal].0.get() as u64 + tss::KERNEL_STACK_SIZE as u64
}

unsafe extern "C" fn first_shell() -> ! {
    enable_interrupts();
    crate::kernel::process::exec::run_initial_shell();
}

#[cfg(all(test, feature = "std-tests"))]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(all(test, feature = "std-tests"))]
pub(crate) fn set_active_foreground_for_tests(terminal: TerminalId, pid: Option<ProcessId>) {
    let mut sched = SCHEDULER.lock();
    sched.active = terminal;
    sched.terminals[terminal.as_index()].foreground = pid;
}

#[cfg(all(test, feature = "std-tests"))]
mod tests {
    use super::*;

    #[test]
    fn switching_to_the_active_terminal_is_a_no_op() {
        let _guard = test_lock();
        let mut sched = TerminalScheduler::new();
        assert_eq!(sched.stage_switch(TerminalId::new(0)), None);
    }

    #[test]
    fn empty_target_stages_a_cold_start() {
        let _guard = test_lock();
        let mut sched = TerminalScheduler::new();
        sched.terminals[0].foreground = Some(ProcessId::new(0));
        let plan = sched.stage_switch(TerminalId::new(1));
        assert_eq!(plan, Some(SwitchPlan::ColdStart { from: Some(ProcessId::new(0)) }));
        assert_eq!(sched.active, TerminalId::new(1));
    }

    #[test]
    fn occupied_target_stages_a_resume() {
        let _guard = test_lock();
        let mut sched = TerminalScheduler::new();
        sched.terminals[0].foreground = Some(ProcessId::new(0));
        sched.terminals[2].foreground = Some(ProcessId::new(2));
        let plan = sched.stage_switch(TerminalId::new(2));
        assert_eq!(
            plan,
            Some(SwitchPlan::Resume { from: Some(ProcessId::new(0)), to: ProcessId::new(2) })
        );
    }

    #[test]
    fn away_and_back_resumes_the_same_process() {
        let _guard = test_lock();
        let mut sched = TerminalScheduler::new();
        sched.terminals[0].foreground = Some(ProcessId::new(0));
        sched.terminals[1].foreground = Some(ProcessId::new(1));
        sched.stage_switch(TerminalId::new(1));
        let back = sched.stage_switch(TerminalId::new(0));
        assert_eq!(
            back,
            Some(SwitchPlan::Resume { from: Some(ProcessId::new(1)), to: ProcessId::new(0) })
        );
    }

    #[test]
    fn screen_and_line_follow_the_terminal() {
        let _guard = test_lock();
        let mut sched = TerminalScheduler::new();
        display::clear();
        display::putc(b'A');
        console::input_char('l');
        console::input_char('s');
        sched.stage_switch(TerminalId::new(1));
        // Terminal 1 starts blank with an empty line.
        assert_eq!(display::char_at(0, 0), 0);
        display::clear();
        display::putc(b'B');
        sched.stage_switch(TerminalId::new(0));
        assert_eq!(display::char_at(0, 0), b'A');
        console::input_char('\n');
        let mut buf = [0u8; LINE_CAPACITY];
        let n = console::read_line(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ls\n");
        assert_eq!(sched.terminals[1].display[0], b'B');
    }
}
