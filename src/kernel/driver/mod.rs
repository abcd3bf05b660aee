// src/kernel/driver/mod.rs
//! Device drivers: VGA text display, line-buffered console,
//! real-time clock, and the PS/2 keyboard front end.

pub mod console;
pub mod display;
pub mod keyboard;
pub mod rtc;
