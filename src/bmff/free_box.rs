//! Header of the injected `free` box
//!
//! The box carries the payload followed by filler. Its total size is the
//! number of bytes inserted after `ftyp`, i.e. the amount every chunk offset
//! in the container has to be shifted by.

use super::{EXTENDED_HEADER_LEN, EXTENDED_SIZE_MARKER, FREE_BOX, HEADER_LEN};
use crate::core::error::{StashError, StashResult};
use std::io::Write;

/// Largest content length accepted for the `free` box (2^53 - 1)
pub const MAX_CONTENT_LEN: u64 = (1 << 53) - 1;

/// Sized `free` box header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBoxHeader {
    content_len: u64,
}

impl FreeBoxHeader {
    /// Size a header for `payload_len` payload bytes and `filler_len` filler bytes
    pub fn new(payload_len: u64, filler_len: u64) -> StashResult<Self> {
        let content_len = payload_len
            .checked_add(filler_len)
            .filter(|&len| len < MAX_CONTENT_LEN)
            .ok_or(StashError::PayloadTooLarge {
                len: payload_len.saturating_add(filler_len),
                limit: MAX_CONTENT_LEN,
            })?;
        Ok(Self { content_len })
    }

    /// Payload plus filler
    pub fn content_len(&self) -> u64 {
        self.content_len
    }

    /// Whether the box needs the 64-bit size form
    pub fn is_extended(&self) -> bool {
        HEADER_LEN + self.content_len > u32::MAX as u64
    }

    pub fn header_len(&self) -> u64 {
        if self.is_extended() {
            EXTENDED_HEADER_LEN
        } else {
            HEADER_LEN
        }
    }

    /// Total bytes the box adds to the file
    pub fn total_size(&self) -> u64 {
        self.header_len() + self.content_len
    }

    /// Serialized header (8 or 16 bytes)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(self.header_len() as usize);
        if self.is_extended() {
            header.extend_from_slice(&EXTENDED_SIZE_MARKER.to_be_bytes());
            header.extend_from_slice(FREE_BOX);
            header.extend_from_slice(&self.total_size().to_be_bytes());
        } else {
            header.extend_from_slice(&(self.total_size() as u32).to_be_bytes());
            header.extend_from_slice(FREE_BOX);
        }
        header
    }

    /// Write the header
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }
}
