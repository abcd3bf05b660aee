// src/errors/mod.rs
//! Unified error types for the kernel
//!
//! Every fallible operation in the core returns [`KernelResult`]. All
//! variants are local, synchronous returns: nothing is retried, and the
//! core never prints on error - diagnostics belong to the caller
//! (typically the shell).

use core::fmt;

/// Kernel Result type
pub type KernelResult<T> = Result<T, KernelError>;

/// Top-level kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Malformed argument: empty command, oversized name, out-of-range
    /// length, pointer outside the user window
    Validation,
    /// No free slot in the applicable pool (process slots, descriptors)
    ResourceExhausted,
    /// Unresolved program/file name, or no stored argument
    NotFound,
    /// Executable signature mismatch or truncated header
    Format,
    /// Descriptor index out of range or not in use
    InvalidHandle,
    /// Stubbed surface (signal handling)
    NotSupported,
}

impl KernelError {
    /// Static description, usable from exception context
    pub const fn as_str(&self) -> &'static str {
        match self {
            KernelError::Validation => "invalid argument",
            KernelError::ResourceExhausted => "resource exhausted",
            KernelError::NotFound => "not found",
            KernelError::Format => "bad executable format",
            KernelError::InvalidHandle => "invalid handle",
            KernelError::NotSupported => "not supported",
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
