// src/kernel/driver/display.rs
//! VGA text-mode display
//!
//! Writes go straight into the 80x25 text buffer. Terminal switching
//! snapshots and restores the whole buffer plus the cursor, so each
//! terminal keeps its own screen contents while in the background.

use core::fmt;

use spin::Mutex;

pub const COLS: usize = 80;
pub const ROWS: usize = 25;
/// Bytes per saved screen (one 4 KiB page per terminal)
pub const VRAM_SIZE: usize = 4096;

const ATTR: u8 = 0x07;
const TEXT_BYTES: usize = COLS * ROWS * 2;

static CURSOR: Mutex<(usize, usize)> = Mutex::new((0, 0));

#[cfg(not(feature = "std-tests"))]
fn with_live<R>(f: impl FnOnce(&mut [u8; VRAM_SIZE]) -> R) -> R {
    // Identity-mapped VGA text buffer. Exclusive access is guaranteed
    // by the interrupt-masked sections around every caller.
    let vram = unsafe { &mut *(0xB8000 as *mut [u8; VRAM_SIZE]) };
    f(vram)
}

#[cfg(feature = "std-tests")]
static MOCK_VRAM: Mutex<[u8; VRAM_SIZE]> = Mutex::new([0; VRAM_SIZE]);

#[cfg(feature = "std-tests")]
fn with_live<R>(f: impl FnOnce(&mut [u8; VRAM_SIZE]) -> R) -> R {
    f(&mut MOCK_VRAM.lock())
}

/// Blank the screen and home the cursor.
pub fn clear() {
    // The keyboard handler echoes into the same buffer, so every
    // CURSOR-holding section masks interrupts to keep the handler
    // from spinning on a lock held by the interrupted context.
    crate::arch::without_interrupts(|| {
        with_live(|vram| {
            for cell in vram[..TEXT_BYTES].chunks_exact_mut(2) {
                cell[0] = b' ';
                cell[1] = ATTR;
            }
        });
        *CURSOR.lock() = (0, 0);
    });
}

/// Put one byte at the cursor, handling newline and scrolling.
pub fn putc(byte: u8) {
    crate::arch::without_interrupts(|| {
        let mut cursor = CURSOR.lock();
        let (mut col, mut row) = *cursor;
        with_live(|vram| {
            if byte == b'\n' {
                col = 0;
                row += 1;
            } else {
                let offset = (row * COLS + col) * 2;
                vram[offset] = byte;
                vram[offset + 1] = ATTR;
                col += 1;
                if col == COLS {
                    col = 0;
                    row += 1;
                }
            }
            if row == ROWS {
                scroll(vram);
                row = ROWS - 1;
            }
        });
        *cursor = (col, row);
    });
}

/// Erase the character before the cursor, if any.
pub fn backspace() {
    crate::arch::without_interrupts(|| {
        let mut cursor = CURSOR.lock();
        let (mut col, mut row) = *cursor;
        if col == 0 {
            if row == 0 {
                return;
            }
            row -= 1;
            col = COLS - 1;
        } else {
            col -= 1;
        }
        with_live(|vram| {
            let offset = (row * COLS + col) * 2;
            vram[offset] = b' ';
            vram[offset + 1] = ATTR;
        });
        *cursor = (col, row);
    });
}

fn scroll(vram: &mut [u8; VRAM_SIZE]) {
    vram.copy_within(COLS * 2..TEXT_BYTES, 0);
    for cell in vram[TEXT_BYTES - COLS * 2..TEXT_BYTES].chunks_exact_mut(2) {
        cell[0] = b' ';
        cell[1] = ATTR;
    }
}

#[must_use]
pub fn cursor() -> (usize, usize) {
    crate::arch::without_interrupts(|| *CURSOR.lock())
}

pub fn set_cursor(col: usize, row: usize) {
    crate::arch::without_interrupts(|| {
        *CURSOR.lock() = (col.min(COLS - 1), row.min(ROWS - 1));
    });
}

/// Copy the live screen into a background save area.
pub fn snapshot_into(saved: &mut [u8; VRAM_SIZE]) {
    with_live(|vram| saved.copy_from_slice(vram));
}

/// Overwrite the live screen from a background save area.
pub fn restore_from(saved: &[u8; VRAM_SIZE]) {
    with_live(|vram| vram.copy_from_slice(saved));
}

struct DebugWriter;

impl fmt::Write for DebugWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &byte in s.as_bytes() {
            putc(byte);
        }
        Ok(())
    }
}

/// Sink for the `debug_println!` macro.
pub fn debug_write(args: fmt::Arguments) {
    use fmt::Write;
    let _ = DebugWriter.write_fmt(args);
}

#[cfg(all(test, feature = "std-tests"))]
pub(crate) fn char_at(col: usize, row: usize) -> u8 {
    with_live(|vram| vram[(row * COLS + col) * 2])
}
