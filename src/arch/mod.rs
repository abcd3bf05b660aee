// src/arch/mod.rs
//! Architecture-specific code

pub mod x86_64;

pub use x86_64::{disable_interrupts, enable_interrupts, without_interrupts};

#[cfg(feature = "std-tests")]
pub(crate) use x86_64::masked_sections;
