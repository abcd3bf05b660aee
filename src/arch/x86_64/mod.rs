// src/arch/x86_64/mod.rs
//! x86_64 specific implementations
//!
//! Paging, kernel-stack bookkeeping and the continuation primitive used
//! for all control transfers between processes.
//!
//! Interrupt masking is the only lock beyond the spin mutexes: the slot
//! table, PCB fields and the terminal snapshots are mutated exclusively
//! with external interrupts masked, so no interrupt handler can observe a
//! table mid-update. Under `std-tests` the masking helpers are no-ops
//! (the host harness runs in ring 3 where `cli` would fault).

pub mod context;
pub mod paging;
pub mod tss;

/// Run `f` with external interrupts masked, restoring the previous state.
#[cfg(not(feature = "std-tests"))]
pub fn without_interrupts<T>(f: impl FnOnce() -> T) -> T {
    ::x86_64::instructions::interrupts::without_interrupts(f)
}

/// Run `f` with external interrupts masked (host stand-in: plain call,
/// recorded so tests can assert a path masks before touching shared state).
#[cfg(feature = "std-tests")]
pub fn without_interrupts<T>(f: impl FnOnce() -> T) -> T {
    masked_sections::COUNT.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
    f()
}

/// Host-side ledger of masked sections entered.
#[cfg(feature = "std-tests")]
pub(crate) mod masked_sections {
    use core::sync::atomic::{AtomicUsize, Ordering};

    pub static COUNT: AtomicUsize = AtomicUsize::new(0);

    pub fn entered() -> usize {
        COUNT.load(Ordering::SeqCst)
    }
}

/// Mask external interrupts (`cli`).
#[cfg(not(feature = "std-tests"))]
pub fn disable_interrupts() {
    ::x86_64::instructions::interrupts::disable();
}

/// Mask external interrupts (host stand-in: no-op).
#[cfg(feature = "std-tests")]
pub fn disable_interrupts() {}

/// Unmask external interrupts (`sti`).
#[cfg(not(feature = "std-tests"))]
pub fn enable_interrupts() {
    ::x86_64::instructions::interrupts::enable();
}

/// Unmask external interrupts (host stand-in: no-op).
#[cfg(feature = "std-tests")]
pub fn enable_interrupts() {}
