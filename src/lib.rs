//! # mp4stash
//!
//! Hide an arbitrary file inside an MP4 (ISO-BMFF) container while keeping
//! the container playable.
//!
//! The payload is stored in a `free` box placed directly after the `ftyp`
//! box. Every chunk offset table (`stco`/`co64`) in the container is
//! rewritten on the fly so that sample data still resolves after the
//! insertion. When the output reaches 4 GiB, 32-bit `stco` tables are widened
//! to `co64` and the sizes of their enclosing boxes are patched after the copy.
//!
//! The container is processed in a single streamed pass with bounded memory;
//! media data is copied through without being buffered.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mp4stash::{stash_file, StashOptions};
//!
//! let options = StashOptions::default().without_filler();
//! let report = stash_file("movie.mp4", "notes.pdf", "movie-with-notes.mp4", &options)?;
//! println!(
//!     "{} tables rewritten, {} widened",
//!     report.tables_rewritten, report.tables_upgraded
//! );
//! # Ok::<(), mp4stash::StashError>(())
//! ```
//!
//! ## Features
//!
//! - `serde`: serialize [`StashReport`]
//! - `cli`: the `mp4stash` command-line tool (default)

pub mod bmff;
pub mod core;
pub mod files;

pub use crate::core::{StashError, StashResult};
pub use bmff::{BoxWalker, FreeBoxHeader, SizeLedger};
pub use files::{
    stash_bytes, stash_file, stash_file_with_progress, stash_streams, FillerMode, Progress,
    StashOptions, StashReport,
};
