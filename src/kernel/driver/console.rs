// src/kernel/driver/console.rs
//! Line-buffered console
//!
//! Keyboard input accumulates in a single live line buffer with echo
//! and backspace editing. A read blocks until Enter commits the line,
//! then hands the caller everything up to and including the newline.
//! Each terminal keeps its own copy of the line while backgrounded.

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::arch::{disable_interrupts, enable_interrupts};
use crate::errors::KernelResult;
use crate::kernel::driver::display;

/// Line capacity including the trailing newline
pub const LINE_CAPACITY: usize = 128;
/// Output stops when this byte is encountered
pub const WRITE_SENTINEL: u8 = 0x02;

struct LineBuffer {
    bytes: [u8; LINE_CAPACITY],
    len: usize,
}

static LINE: Mutex<LineBuffer> = Mutex::new(LineBuffer { bytes: [0; LINE_CAPACITY], len: 0 });
static LINE_READY: AtomicBool = AtomicBool::new(false);

/// Feed one decoded character from the keyboard handler.
pub fn input_char(ch: char) {
    if LINE_READY.load(Ordering::SeqCst) {
        // Previous line not consumed yet; drop input until it is.
        return;
    }
    let mut line = LINE.lock();
    match ch {
        '\x08' => {
            if line.len > 0 {
                line.len -= 1;
                display::backspace();
            }
        }
        '\n' => {
            let len = line.len;
            line.bytes[len] = b'\n';
            line.len += 1;
            display::putc(b'\n');
            LINE_READY.store(true, Ordering::SeqCst);
        }
        '\t' => {
            for _ in 0..4 {
                if line.len < LINE_CAPACITY - 1 {
                    let len = line.len;
                    line.bytes[len] = b' ';
                    line.len += 1;
                    display::putc(b' ');
                }
            }
        }
        _ => {
            if line.len < LINE_CAPACITY - 1 && ch.is_ascii() {
                let len = line.len;
                line.bytes[len] = ch as u8;
                line.len += 1;
                display::putc(ch as u8);
            }
        }
    }
}

/// Block until a line is committed, then copy it into `buf`.
///
/// Returns the number of bytes copied, newline included. The copy is
/// clamped to `buf`; an oversized line is silently truncated.
pub fn read_line(buf: &mut [u8]) -> KernelResult<usize> {
    // Interrupts stay enabled while waiting so keystrokes arrive.
    while !LINE_READY.load(Ordering::SeqCst) {
        core::hint::spin_loop();
    }
    disable_interrupts();
    let n = {
        let mut line = LINE.lock();
        let n = line.len.min(buf.len());
        buf[..n].copy_from_slice(&line.bytes[..n]);
        line.len = 0;
        n
    };
    LINE_READY.store(false, Ordering::SeqCst);
    enable_interrupts();
    Ok(n)
}

/// Write `buf` to the display, stopping at [`WRITE_SENTINEL`].
///
/// NUL bytes are skipped. The return value is the full requested
/// length, sentinel or not, so writers of fixed-size records see
/// every byte accounted for.
pub fn write(buf: &[u8]) -> usize {
    for &byte in buf {
        if byte == WRITE_SENTINEL {
            break;
        }
        if byte == 0 {
            continue;
        }
        display::putc(byte);
    }
    buf.len()
}

/// Move the live line into a terminal's save area. Returns whether a
/// committed line was pending; the ready state travels with the line
/// so a reader on another terminal cannot consume it.
pub fn save_line(saved: &mut [u8; LINE_CAPACITY], saved_len: &mut usize) -> bool {
    let mut line = LINE.lock();
    saved[..line.len].copy_from_slice(&line.bytes[..line.len]);
    *saved_len = line.len;
    line.len = 0;
    LINE_READY.swap(false, Ordering::SeqCst)
}

/// Restore a terminal's saved line as the live line.
pub fn restore_line(saved: &[u8; LINE_CAPACITY], saved_len: usize, ready: bool) {
    let mut line = LINE.lock();
    line.bytes[..saved_len].copy_from_slice(&saved[..saved_len]);
    line.len = saved_len;
    LINE_READY.store(ready, Ordering::SeqCst);
}

#[cfg(all(test, feature = "std-tests"))]
pub(crate) fn commit_line(text: &str) {
    for ch in text.chars() {
        input_char(ch);
    }
    input_char('\n');
}
