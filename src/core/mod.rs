//! Core module
//!
//! Shared building blocks used by the box engine and the file-level API.

pub mod error;

pub use error::{StashError, StashResult};
