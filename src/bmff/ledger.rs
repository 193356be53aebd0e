//! Ancestor size ledger and post-pass patcher
//!
//! When a chunk-offset table grows during the streamed copy, the size fields
//! of its enclosing boxes have already been written. The walker records the
//! growth here, keyed by the output offset of each ancestor's size field, and
//! [`SizeLedger::apply`] patches those fields once the copy is closed and the
//! output can be reopened for random access.

use crate::bmff::{EXTENDED_SIZE_MARKER, HEADER_LEN};
use crate::core::error::{StashError, StashResult};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

/// Accumulated size increments per box position
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SizeLedger {
    increments: BTreeMap<u64, u64>,
}

impl SizeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `increment` to the box whose size field sits at `position`
    pub fn record(&mut self, position: u64, increment: u64) {
        *self.increments.entry(position).or_insert(0) += increment;
    }

    /// Accumulated increment for one position
    #[cfg(test)]
    fn get(&self, position: u64) -> Option<u64> {
        self.increments.get(&position).copied()
    }

    /// `(position, increment)` pairs in ascending position order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.increments.iter().map(|(&p, &i)| (p, i))
    }

    pub fn len(&self) -> usize {
        self.increments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.increments.is_empty()
    }

    /// Patch every recorded size field in `file`
    ///
    /// A size field holding the extended marker gets the increment added to
    /// its 64-bit size instead. A standard size field that would pass
    /// `u32::MAX` is reported as [`StashError::SizeOverflow`]; fields patched
    /// before the failing one stay patched.
    ///
    /// Returns the number of size fields patched.
    pub fn apply<F: Read + Write + Seek>(&self, file: &mut F) -> StashResult<usize> {
        for (position, increment) in self.iter() {
            let mut size_bytes = [0u8; 4];
            file.seek(SeekFrom::Start(position))?;
            file.read_exact(&mut size_bytes)?;
            let size = u32::from_be_bytes(size_bytes);

            if size == EXTENDED_SIZE_MARKER {
                let large_position = position + HEADER_LEN;
                let mut large_bytes = [0u8; 8];
                file.seek(SeekFrom::Start(large_position))?;
                file.read_exact(&mut large_bytes)?;
                let large_size = u64::from_be_bytes(large_bytes);
                let patched = large_size.checked_add(increment).ok_or_else(|| {
                    StashError::malformed(position, "64-bit box size overflows")
                })?;

                file.seek(SeekFrom::Start(large_position))?;
                file.write_all(&patched.to_be_bytes())?;
                debug!(position, large_size, patched, "patched extended box size");
            } else {
                let patched = u32::try_from(size as u64 + increment).map_err(|_| {
                    StashError::SizeOverflow {
                        position,
                        size,
                        increment,
                    }
                })?;

                file.seek(SeekFrom::Start(position))?;
                file.write_all(&patched.to_be_bytes())?;
                debug!(position, size, patched, "patched box size");
            }
        }

        file.flush()?;
        Ok(self.len())
    }
}

impl FromIterator<(u64, u64)> for SizeLedger {
    fn from_iter<I: IntoIterator<Item = (u64, u64)>>(iter: I) -> Self {
        let mut ledger = SizeLedger::new();
        for (position, increment) in iter {
            ledger.record(position, increment);
        }
        ledger
    }
}
