// src/kernel/driver/rtc.rs
//! Real-time clock driver
//!
//! The RTC runs as a programmable periodic tick source. Opening the
//! clock device resets it to 2 Hz; writes reprogram the frequency
//! within 2..=1024 Hz, powers of two only. Reads block until the next
//! tick, which is how user programs pace themselves.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{KernelError, KernelResult};

/// Frequency programmed by `open`
pub const DEFAULT_FREQUENCY_HZ: u32 = 2;
pub const MIN_FREQUENCY_HZ: u32 = 2;
pub const MAX_FREQUENCY_HZ: u32 = 1024;

static TICK: AtomicBool = AtomicBool::new(false);

/// Divider for `frequency`, or `None` when the frequency is out of
/// range or not a power of two. The hardware rate field encodes
/// frequency as `32768 >> (rate - 1)`.
#[must_use]
const fn rate_select(frequency: u32) -> Option<u8> {
    if frequency < MIN_FREQUENCY_HZ || frequency > MAX_FREQUENCY_HZ {
        return None;
    }
    if !frequency.is_power_of_two() {
        return None;
    }
    Some(16 - frequency.trailing_zeros() as u8)
}

#[cfg(not(feature = "std-tests"))]
fn program_rate(rate: u8) {
    use x86_64::instructions::port::Port;

    // Register A selects the divider; NMI stays masked (bit 7) while
    // the index register points away from the default.
    crate::arch::without_interrupts(|| unsafe {
        let mut index: Port<u8> = Port::new(0x70);
        let mut data: Port<u8> = Port::new(0x71);
        index.write(0x8Au8);
        let prev = data.read();
        index.write(0x8Au8);
        data.write((prev & 0xF0) | rate);
    });
}

#[cfg(feature = "std-tests")]
mod mock {
    use core::sync::atomic::{AtomicU8, Ordering};

    pub(super) static LAST_RATE: AtomicU8 = AtomicU8::new(0);

    pub(super) fn program_rate(rate: u8) {
        LAST_RATE.store(rate, Ordering::SeqCst);
    }
}

#[cfg(feature = "std-tests")]
use mock::program_rate;

/// Open the clock device: reset to the default frequency.
pub fn open() {
    if let Some(rate) = rate_select(DEFAULT_FREQUENCY_HZ) {
        program_rate(rate);
    }
    TICK.store(false, Ordering::SeqCst);
}

/// Nothing to release; frequency stays wherever it was.
pub fn close() {}

/// Reprogram the tick frequency.
pub fn set_frequency(frequency: u32) -> KernelResult<()> {
    let rate = rate_select(frequency).ok_or(KernelError::Validation)?;
    program_rate(rate);
    Ok(())
}

/// Block until the next RTC tick. Interrupts stay enabled while
/// spinning so the tick handler can run.
pub fn wait_tick() {
    TICK.store(false, Ordering::SeqCst);
    while !TICK.load(Ordering::SeqCst) {
        core::hint::spin_loop();
    }
}

/// Called from the RTC interrupt handler on every tick.
pub fn on_tick() {
    TICK.store(true, Ordering::SeqCst);
}

/// Frequency implied by the last programmed rate.
#[cfg(feature = "std-tests")]
#[must_use]
pub fn last_programmed_frequency() -> u32 {
    let rate = mock::LAST_RATE.load(Ordering::SeqCst);
    32768 >> (rate - 1)
}

#[cfg(all(test, feature = "std-tests"))]
mod tests {
    use super::*;

    #[test]
    fn rate_encoding_spans_the_supported_range() {
        assert_eq!(rate_select(2), Some(15));
        assert_eq!(rate_select(4), Some(14));
        assert_eq!(rate_select(1024), Some(6));
    }

    #[test]
    fn rejects_out_of_range_and_non_power_of_two() {
        assert_eq!(rate_select(0), None);
        assert_eq!(rate_select(1), None);
        assert_eq!(rate_select(3), None);
        assert_eq!(rate_select(2048), None);
    }

    #[test]
    fn open_programs_the_default_rate() {
        let _guard = crate::kernel::terminal::test_lock();
        open();
        assert_eq!(last_programmed_frequency(), DEFAULT_FREQUENCY_HZ);
    }

    #[test]
    fn tick_from_handler_releases_a_waiter() {
        let _guard = crate::kernel::terminal::test_lock();
        let done = std::sync::Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let ticker = std::thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                on_tick();
                std::thread::yield_now();
            }
        });
        wait_tick();
        done.store(true, Ordering::SeqCst);
        ticker.join().unwrap();
    }
}
