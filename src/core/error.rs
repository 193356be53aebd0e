//! Error types for stash operations
//!
//! This module defines all error types used throughout mp4stash.

use std::path::PathBuf;
use thiserror::Error;

/// Error types for stash operations
#[derive(Debug, Error)]
pub enum StashError {
    /// IO error (read or write failure on any of the files involved)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The output path is already taken
    #[error("Output path already exists: {}", .0.display())]
    OutputExists(PathBuf),

    /// The input is not a container this crate can work with
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// Payload plus filler cannot be represented
    #[error("Payload too large: {len} bytes (limit {limit})")]
    PayloadTooLarge { len: u64, limit: u64 },

    /// A box declares size 0 ("extends to end of file")
    #[error("Unsupported box size 0 at output offset {position}")]
    UnsupportedBoxSize { position: u64 },

    /// Structural violation the rewriter will not repair
    #[error("Malformed container at output offset {position}: {reason}")]
    Malformed { position: u64, reason: String },

    /// Patching a 32-bit size field would overflow it
    #[error("Size field at offset {position} overflows: {size} + {increment} exceeds u32::MAX")]
    SizeOverflow {
        position: u64,
        size: u32,
        increment: u64,
    },
}

impl StashError {
    pub(crate) fn malformed(position: u64, reason: impl Into<String>) -> Self {
        StashError::Malformed {
            position,
            reason: reason.into(),
        }
    }
}

/// Result type alias for stash operations
pub type StashResult<T> = Result<T, StashError>;
