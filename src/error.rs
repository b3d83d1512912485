//! The two user-visible failure modes: bad configuration at construction
//! time, and out-of-memory at allocation time. Every other failure in this
//! crate is a `debug_assert!`/`panic!`, reflecting its position below the
//! runtime's own exception-handling infrastructure.

use std::fmt;

/// Returned by [`crate::config::AllocatorConfig::new`] when the supplied
/// tunables cannot be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `large_min_size` was zero or not a multiple of the machine word.
    InvalidLargeMinSize { value: usize },
    /// `free_chunk_min_size` was smaller than the minimum a free chunk's
    /// header plus two-word footer requires, or not word-aligned.
    InvalidFreeChunkMinSize { value: usize, minimum: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidLargeMinSize { value } => write!(
                f,
                "large_min_size must be a positive multiple of the machine word, got {}",
                value
            ),
            ConfigError::InvalidFreeChunkMinSize { value, minimum } => write!(
                f,
                "free_chunk_min_size must be a word-aligned value of at least {} bytes, got {}",
                minimum, value
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The only failure an allocation request can return to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No allocator could satisfy the request even after the collector
    /// was given a chance to reclaim space.
    OutOfMemory { requested: usize },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory { requested } => {
                write!(f, "out of memory: failed to satisfy a {}-byte request", requested)
            }
        }
    }
}

impl std::error::Error for AllocError {}
