// src/arch/x86_64/tss.rs
//! Per-slot kernel stacks and the hardware task-switch hook
//!
//! Each process slot owns a fixed kernel stack. On every control
//! transfer the new owner's stack top is published through
//! [`set_kernel_stack`]; the descriptor-table bootstrap (outside this
//! crate) wires the TSS privilege-0 stack to read it, so the next
//! ring-3 → ring-0 entry lands on the right stack.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::kernel::process::MAX_PROCESSES;

/// Kernel stack size per process slot
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

#[repr(C, align(16))]
struct KernelStack(UnsafeCell<[u8; KERNEL_STACK_SIZE]>);

// Single CPU; each stack is owned by exactly one live process at a time.
unsafe impl Sync for KernelStack {}

impl KernelStack {
    const fn new() -> Self {
        Self(UnsafeCell::new([0; KERNEL_STACK_SIZE]))
    }
}

static KERNEL_STACKS: [KernelStack; MAX_PROCESSES] = [
    KernelStack::new(),
    KernelStack::new(),
    KernelStack::new(),
    KernelStack::new(),
    KernelStack::new(),
    KernelStack::new(),
];

/// Kernel stack top published for the next privilege transition
static CURRENT_KERNEL_STACK: AtomicU64 = AtomicU64::new(0);

/// Top of the kernel stack reserved for `slot` (stacks grow downward).
#[must_use]
pub fn kernel_stack_top(slot: usize) -> u64 {
    debug_assert!(slot < MAX_PROCESSES);
    KERNEL_STACKS[slot].0.get() as u64 + KERNEL_STACK_SIZE as u64
}

/// Install `top` as the kernel stack for the next ring transition.
pub fn set_kernel_stack(top: u64) {
    CURRENT_KERNEL_STACK.store(top, Ordering::SeqCst);
}

/// Kernel stack top the TSS glue should load (0 before the first launch).
#[must_use]
pub fn current_kernel_stack() -> u64 {
    CURRENT_KERNEL_STACK.load(Ordering::SeqCst)
}

#[cfg(all(test, feature = "std-tests"))]
mod tests {
    use super::*;

    #[test]
    fn stack_tops_are_distinct_and_aligned() {
        for slot in 0..MAX_PROCESSES {
            let top = kernel_stack_top(slot);
            assert_eq!(top % 16, 0);
            for other in slot + 1..MAX_PROCESSES {
                assert_ne!(top, kernel_stack_top(other));
            }
        }
    }

    #[test]
    fn published_stack_round_trips() {
        set_kernel_stack(kernel_stack_top(2));
        assert_eq!(current_kernel_stack(), kernel_stack_top(2));
    }
}
