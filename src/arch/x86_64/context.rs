// src/arch/x86_64/context.rs
//! Saved continuations and control transfer
//!
//! A continuation is the kernel stack pointer of a suspended execution,
//! with the callee-saved registers and return address parked on that
//! stack. [`switch_into`] captures the current continuation and activates
//! another; [`resume`] activates one without keeping the current point
//! reachable (the halt path). New processes start from a hand-built frame
//! whose return address is a trampoline ([`initial_context`]).

use core::arch::naked_asm;

/// Opaque captured execution point; resuming it returns exactly where the
/// owner was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct SavedContext(u64);

impl SavedContext {
    /// A context that has never been captured.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether this context has been captured.
    #[must_use]
    pub const fn is_captured(&self) -> bool {
        self.0 != 0
    }
}

/// Save callee-saved registers and the current RSP into `*prev`, then
/// activate the stack at `next` and return into its parked frame.
///
/// # C ABI
/// - RDI: prev (*mut u64)
/// - RSI: next (u64)
#[unsafe(naked)]
unsafe extern "C" fn switch_stacks(prev: *mut u64, next: u64) {
    naked_asm!(
        "push rbx",
        "push rbp",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbp",
        "pop rbx",
        "ret",
    );
}

/// Suspend here, storing the continuation into `*save`, and activate
/// `next`. Returns when some other execution resumes `*save`.
///
/// # Safety
///
/// - `save` must stay valid until the continuation is resumed or the
///   owning process slot is reused
/// - `next` must be a captured continuation or one built by
///   [`initial_context`]
pub unsafe fn switch_into(save: *mut SavedContext, next: SavedContext) {
    debug_assert!(next.is_captured());
    unsafe {
        switch_stacks(save.cast::<u64>(), next.0);
    }
}

/// One-way transfer into `next`; the current execution point is
/// abandoned.
///
/// # Safety
///
/// Same requirements as [`switch_into`]; additionally the current stack
/// must hold nothing that still needs to run.
pub unsafe fn resume(next: SavedContext) -> ! {
    let mut discard = SavedContext::empty();
    unsafe {
        switch_into(&mut discard, next);
    }
    unreachable!("resumed a discarded continuation");
}

/// Build a continuation that, when activated, calls `entry` on the stack
/// topped at `stack_top`.
///
/// Writes the frame [`switch_stacks`] pops: six zeroed callee-saved
/// registers below the return address.
///
/// # Safety
///
/// `stack_top` must be the 16-byte aligned top of an otherwise unused
/// kernel stack.
pub unsafe fn initial_context(stack_top: u64, entry: unsafe extern "C" fn() -> !) -> SavedContext {
    let top = stack_top as *mut u64;
    unsafe {
        *top.offset(-1) = entry as *const () as usize as u64;
        for slot in 2isize..=7 {
            *top.offset(-slot) = 0;
        }
    }
    SavedContext(stack_top - 7 * 8)
}

/// Transfer into user mode at `entry` with the given user stack.
///
/// Pushes an `iretq` frame with ring-3 selectors and the interrupt flag
/// set, so the process starts running with interrupts enabled. The
/// selector values must match the descriptor table the boot glue built.
///
/// # Safety
///
/// - the user region must be mapped for the current process
/// - `entry` must point at valid user code, `user_stack` at writable
///   user memory
/// - the kernel stack for this process must already be installed
///   ([`super::tss::set_kernel_stack`])
pub unsafe fn enter_user(entry: u64, user_stack: u64) -> ! {
    // Ring 3 selectors (0x18 | 3 code, 0x20 | 3 data)
    const USER_CODE_SELECTOR: u64 = 0x1B;
    const USER_DATA_SELECTOR: u64 = 0x23;
    // RFLAGS: IF set
    const USER_RFLAGS: u64 = 0x202;

    unsafe {
        core::arch::asm!(
            "cli",
            "mov ds, {0:x}",
            "mov es, {0:x}",
            "mov fs, {0:x}",
            "mov gs, {0:x}",
            "push {0}",
            "push {1}",
            "push {2}",
            "push {3}",
            "push {4}",
            "iretq",
            in(reg) USER_DATA_SELECTOR,
            in(reg) user_stack,
            in(reg) USER_RFLAGS,
            in(reg) USER_CODE_SELECTOR,
            in(reg) entry,
            options(noreturn)
        )
    }
}
