//! Chunked byte window
//!
//! Sits between the input reads and the output writer. Input arrives in
//! arbitrary chunks through [`ChunkedWindow::append`]; the box walker looks
//! at the buffered front, optionally rewrites it in place, and then commits
//! a number of bytes, either emitting them to the output or discarding them.
//!
//! A commit may be larger than what is currently buffered. The shortfall is
//! remembered as "owed" and settled from the front of the next appended
//! chunks before any of their bytes become visible. This lets the walker
//! decide the fate of a whole box body (for example a multi-gigabyte `mdat`)
//! without holding it in memory.

use std::io::{self, Write};

/// Growable byte window with deferred commits
#[derive(Debug)]
pub struct ChunkedWindow<W> {
    out: W,
    buf: Vec<u8>,
    /// Start of the unconsumed region in `buf`
    head: usize,
    /// Bytes still to be committed from future appends
    owed: u64,
    /// Whether owed bytes are emitted or discarded
    owed_emit: bool,
    /// Absolute output offset of the next emitted byte
    cursor: u64,
}

impl<W: Write> ChunkedWindow<W> {
    /// Create a window whose first emitted byte lands at output offset `cursor`
    pub fn new(out: W, cursor: u64) -> Self {
        Self {
            out,
            buf: Vec::new(),
            head: 0,
            owed: 0,
            owed_emit: true,
            cursor,
        }
    }

    /// Accumulate a chunk of input
    ///
    /// Settles any owed commit first; only the remainder of the chunk
    /// becomes visible through [`bytes`](Self::bytes).
    pub fn append(&mut self, mut chunk: &[u8]) -> io::Result<()> {
        if self.owed > 0 {
            let take = self.owed.min(chunk.len() as u64) as usize;
            let (settled, rest) = chunk.split_at(take);
            if self.owed_emit {
                self.out.write_all(settled)?;
                self.cursor += take as u64;
            }
            self.owed -= take as u64;
            chunk = rest;
        }

        if self.head > 0 {
            self.buf.drain(..self.head);
            self.head = 0;
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Remove `len` bytes from the front, emitting them if `emit` is set
    ///
    /// If fewer than `len` bytes are buffered, the rest is owed and will be
    /// taken from the next appends.
    pub fn commit(&mut self, len: u64, emit: bool) -> io::Result<()> {
        debug_assert_eq!(self.owed, 0, "commit while a previous commit is owed");
        let now = len.min(self.len() as u64) as usize;
        if emit {
            self.out.write_all(&self.buf[self.head..self.head + now])?;
            self.cursor += now as u64;
        }
        self.head += now;
        self.owed = len - now as u64;
        self.owed_emit = emit;
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W> ChunkedWindow<W> {
    /// Pad the front of the window with `len` zero bytes
    ///
    /// Used to make room when a field is about to be widened in place.
    pub fn prepend(&mut self, len: usize) {
        if self.head >= len {
            self.head -= len;
            self.buf[self.head..self.head + len].fill(0);
        } else {
            self.buf
                .splice(self.head..self.head, std::iter::repeat(0).take(len));
        }
    }

    /// Number of buffered, uncommitted bytes
    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether at least `k` bytes are visible
    pub fn has(&self, k: u64) -> bool {
        self.owed == 0 && self.len() as u64 >= k
    }

    /// Buffered bytes
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    /// Buffered bytes, for in-place rewrites before committing
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..]
    }

    /// Big-endian u32 at `at` (caller checked availability)
    pub fn read_u32(&self, at: usize) -> u32 {
        let b = self.bytes();
        u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    /// Big-endian u64 at `at` (caller checked availability)
    pub fn read_u64(&self, at: usize) -> u64 {
        let b = self.bytes();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b[at..at + 8]);
        u64::from_be_bytes(raw)
    }

    /// Overwrite a big-endian u32 at `at`
    pub fn write_u32(&mut self, at: usize, value: u32) {
        self.bytes_mut()[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Overwrite a big-endian u64 at `at`
    pub fn write_u64(&mut self, at: usize, value: u64) {
        self.bytes_mut()[at..at + 8].copy_from_slice(&value.to_be_bytes());
    }

    /// Bytes still owed by the last commit
    pub fn owed(&self) -> u64 {
        self.owed
    }

    /// Absolute output offset of the next emitted byte
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Borrow the writer
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Give back the writer
    pub fn into_inner(self) -> W {
        self.out
    }
}
