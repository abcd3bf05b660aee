// src/kernel/mod.rs
//! Kernel subsystems: process management, file access, terminals,
//! device drivers, and the system call surface.

pub mod driver;
pub mod fd;
pub mod fs;
pub mod process;
pub mod syscall;
pub mod terminal;
