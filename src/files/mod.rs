//! File-level stash operations
//!
//! This module ties the box engine to real files: options, the filler placed
//! after the payload, progress reporting, and the two-phase stash itself.

pub mod filler;
pub mod handler;
pub mod progress;
pub mod stash;

pub use filler::{build_filler, build_filler_with, Signature, SIGNATURES};
pub use handler::{FillerMode, StashOptions};
pub use progress::Progress;
pub use stash::{
    stash_bytes, stash_file, stash_file_with_progress, stash_streams, StashReport,
};
