//! Streaming box walker
//!
//! Copies the container body (everything after `ftyp`) from input chunks to
//! the output while tracking the box tree, and rewrites every chunk offset
//! table on the way through:
//!
//! - each `stco`/`co64` entry is shifted by the insertion length
//! - once the projected output size reaches 4 GiB, every `stco` table is
//!   widened into a `co64` table; its own header is rewritten in the stream
//!   and the growth is recorded in the [`SizeLedger`] for every enclosing box,
//!   whose size fields were already emitted
//!
//! Boxes that cannot be parsed as nested boxes are copied through untouched:
//! `mdat`/`free`/`skip`/`wide` by type, anything else as soon as its content
//! does not start with a plausible box header.

use super::ledger::SizeLedger;
use super::stack::{BoxDescriptor, BoxStack};
use super::window::ChunkedWindow;
use super::{
    format_fourcc, is_opaque, is_valid_fourcc, FourCc, CO64_BOX, EXTENDED_HEADER_LEN,
    EXTENDED_SIZE_MARKER, FOUR_GIB, HEADER_LEN, MDAT_BOX, STCO_BOX,
};
use crate::core::error::{StashError, StashResult};
use std::io::Write;
use tracing::{debug, info, trace, warn};

/// Version/flags field in front of every chunk offset table
const TABLE_PREAMBLE_LEN: u64 = 4;

/// Entry count field
const ENTRY_COUNT_LEN: u64 = 4;

/// Chunk offset table being streamed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Table {
    /// Input table stores 64-bit entries
    wide: bool,
    /// 32-bit entries are written out as 64-bit entries
    upgraded: bool,
    /// Declared bytes of the entry area
    entries_len: u64,
    /// Entries left to rewrite
    remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a box header (8 bytes)
    Header,
    /// Expecting the 64-bit size of a header announced with size 1
    ExtendedHeader,
    /// Table header plus version/flags, held back for a possible rewrite
    TablePreamble,
    EntryCount(Table),
    Offset32(Table),
    Offset64(Table),
}

/// Counters collected while walking
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WalkStats {
    /// Boxes whose header was parsed
    pub boxes_visited: u64,
    /// Chunk offset tables rewritten
    pub tables_rewritten: u64,
    /// `stco` tables widened to `co64`
    pub tables_upgraded: u64,
    /// Individual chunk offsets shifted
    pub offsets_rewritten: u64,
}

/// Result of a completed walk
#[derive(Debug)]
pub struct WalkOutcome<W> {
    /// The output writer, flushed
    pub writer: W,
    /// Size increments still owed by ancestor boxes
    pub ledger: SizeLedger,
    pub stats: WalkStats,
    /// Output offset just past the last written byte
    pub output_len: u64,
}

/// Single-pass box rewriter
#[derive(Debug)]
pub struct BoxWalker<W> {
    window: ChunkedWindow<W>,
    stack: BoxStack,
    ledger: SizeLedger,
    state: State,
    insertion_len: u64,
    projected_total: u64,
    /// An `mdat` box has been opened
    seen_mdat: bool,
    stats: WalkStats,
}

impl<W: Write> BoxWalker<W> {
    /// Create a walker
    ///
    /// * `writer` - Destination of the rewritten container body
    /// * `start` - Output offset at which the body begins (after `ftyp` and the injected box)
    /// * `insertion_len` - Bytes inserted in front of the body; added to every chunk offset
    /// * `projected_total` - Expected size of the whole output file
    pub fn new(writer: W, start: u64, insertion_len: u64, projected_total: u64) -> Self {
        Self {
            window: ChunkedWindow::new(writer, start),
            stack: BoxStack::new(),
            ledger: SizeLedger::new(),
            state: State::Header,
            insertion_len,
            projected_total,
            seen_mdat: false,
            stats: WalkStats::default(),
        }
    }

    /// Output offset of the next byte to be written
    pub fn cursor(&self) -> u64 {
        self.window.cursor()
    }

    /// Expected size of the output, including growth from widened tables
    pub fn projected_total(&self) -> u64 {
        self.projected_total
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    /// Process one chunk of input
    pub fn feed(&mut self, chunk: &[u8]) -> StashResult<()> {
        self.window.append(chunk)?;
        self.drain()
    }

    /// Finish the walk once all input has been fed
    ///
    /// Fails if the input ended inside a box.
    pub fn finish(mut self) -> StashResult<WalkOutcome<W>> {
        if self.window.owed() > 0 || !self.stack.is_empty() || !self.window.is_empty() {
            let open = self
                .stack
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" > ");
            return Err(StashError::malformed(
                self.window.cursor(),
                format!(
                    "truncated input (open boxes: [{}], {} bytes missing, {} bytes left over)",
                    open,
                    self.window.owed(),
                    self.window.len()
                ),
            ));
        }

        self.window.flush()?;
        debug!(
            output_len = self.window.cursor(),
            ancestors = self.ledger.len(),
            "box walk finished"
        );

        let output_len = self.window.cursor();
        Ok(WalkOutcome {
            writer: self.window.into_inner(),
            ledger: self.ledger,
            stats: self.stats,
            output_len,
        })
    }

    /// Run the state machine as far as the buffered bytes allow
    fn drain(&mut self) -> StashResult<()> {
        loop {
            if self.window.owed() > 0 {
                return Ok(());
            }

            // A container with less than a header left cannot hold another child
            if self.state == State::Header {
                if let Some(room) = self.stack.remaining() {
                    if room < HEADER_LEN {
                        self.skip_parent("no room for a box header")?;
                        continue;
                    }
                }
            }

            if !self.window.has(self.needed()) {
                return Ok(());
            }

            match self.state {
                State::Header => self.on_header()?,
                State::ExtendedHeader => self.on_extended_header()?,
                State::TablePreamble => self.on_table_preamble()?,
                State::EntryCount(table) => self.on_entry_count(table)?,
                State::Offset32(table) => self.on_offset32(table)?,
                State::Offset64(table) => self.on_offset64(table)?,
            }
        }
    }

    /// Bytes that must be buffered before the current state can proceed
    fn needed(&self) -> u64 {
        match self.state {
            State::Header => HEADER_LEN,
            State::ExtendedHeader => EXTENDED_HEADER_LEN,
            State::TablePreamble => {
                self.stack.top().map_or(HEADER_LEN, |t| t.header_len) + TABLE_PREAMBLE_LEN
            }
            State::EntryCount(_) | State::Offset32(_) => 4,
            State::Offset64(_) => 8,
        }
    }

    fn on_header(&mut self) -> StashResult<()> {
        let size = self.window.read_u32(0);
        let box_type = self.box_type_at_front();

        if !is_valid_fourcc(&box_type) {
            return self.skip_parent("invalid box type");
        }

        if size == EXTENDED_SIZE_MARKER {
            if self.stack.remaining().is_some_and(|room| room < EXTENDED_HEADER_LEN) {
                return self.skip_parent("no room for an extended box header");
            }
            self.state = State::ExtendedHeader;
            return Ok(());
        }

        self.open_box(box_type, size as u64, HEADER_LEN)
    }

    fn on_extended_header(&mut self) -> StashResult<()> {
        let box_type = self.box_type_at_front();
        let size = self.window.read_u64(8);
        self.open_box(box_type, size, EXTENDED_HEADER_LEN)
    }

    /// Validate a parsed header and enter the box
    ///
    /// The header bytes are still at the front of the window.
    fn open_box(&mut self, box_type: FourCc, size: u64, header_len: u64) -> StashResult<()> {
        let position = self.window.cursor();

        if size == 0 {
            return Err(StashError::UnsupportedBoxSize { position });
        }

        match self.stack.remaining() {
            None if size < header_len => {
                return Err(StashError::malformed(
                    position,
                    format!(
                        "box '{}' declares size {} below its header length",
                        format_fourcc(&box_type),
                        size
                    ),
                ));
            }
            None => {}
            Some(room) if size < header_len || size > room => {
                return self.skip_parent("child box does not fit its parent");
            }
            Some(_) => {}
        }

        self.stats.boxes_visited += 1;
        self.seen_mdat |= &box_type == MDAT_BOX;
        let descriptor = BoxDescriptor::new(box_type, size, header_len, position);
        trace!(depth = self.stack.depth(), box_info = %descriptor, "open box");
        self.stack.push(descriptor);
        self.state = State::Header;

        if size == header_len {
            self.window.commit(header_len, true)?;
            self.close_top();
            return Ok(());
        }

        if &box_type == STCO_BOX || &box_type == CO64_BOX {
            if size < header_len + TABLE_PREAMBLE_LEN + ENTRY_COUNT_LEN {
                return Err(StashError::malformed(
                    position,
                    format!("chunk offset table of {} bytes is too short", size),
                ));
            }
            // Header stays buffered until the upgrade decision is made
            self.state = State::TablePreamble;
            return Ok(());
        }

        self.window.commit(header_len, true)?;

        if is_opaque(&box_type) {
            trace!(box_type = %format_fourcc(&box_type), len = size - header_len, "copy opaque box");
            self.window.commit(size - header_len, true)?;
            self.close_top();
        }

        Ok(())
    }

    /// Decide whether the table is widened, then release its header
    fn on_table_preamble(&mut self) -> StashResult<()> {
        let Some(top) = self.stack.top().cloned() else {
            return Err(StashError::malformed(
                self.window.cursor(),
                "chunk offset table without an open box",
            ));
        };

        let wide = &top.box_type == CO64_BOX;
        let entries_len = top.declared_size - top.header_len - TABLE_PREAMBLE_LEN - ENTRY_COUNT_LEN;
        let upgraded = !wide && self.projected_total >= FOUR_GIB;

        if upgraded {
            self.widen_table(&top, entries_len)?;
        }

        self.window.commit(top.header_len + TABLE_PREAMBLE_LEN, true)?;
        self.state = State::EntryCount(Table {
            wide,
            upgraded,
            entries_len,
            remaining: 0,
        });
        Ok(())
    }

    /// Rewrite the buffered `stco` header as `co64` and charge the growth to the ancestors
    fn widen_table(&mut self, table: &BoxDescriptor, entries_len: u64) -> StashResult<()> {
        // 4 bytes per entry become 8
        let increment = entries_len;
        let new_size = table.declared_size + increment;

        if table.is_extended() {
            self.window.write_u64(8, new_size);
        } else {
            let new_size = u32::try_from(new_size).map_err(|_| {
                StashError::malformed(
                    table.position,
                    format!("widened chunk offset table of {} bytes needs a 64-bit size", new_size),
                )
            })?;
            self.window.write_u32(0, new_size);
        }
        self.window.bytes_mut()[4..8].copy_from_slice(CO64_BOX);

        for ancestor in self.stack.ancestors() {
            self.ledger.record(ancestor.position, increment);
        }

        self.projected_total = self
            .projected_total
            .checked_add(increment)
            .ok_or(StashError::PayloadTooLarge {
                len: self.projected_total,
                limit: u64::MAX,
            })?;
        self.stats.tables_upgraded += 1;

        info!(
            position = table.position,
            increment,
            ancestors = self.stack.depth() - 1,
            "widening stco table to co64"
        );
        if !self.seen_mdat {
            // A later mdat moves by the growth as well, its offsets do not
            warn!(
                position = table.position,
                increment,
                "widened chunk offsets ahead of mdat; the moov box should come after mdat"
            );
        }
        Ok(())
    }

    fn on_entry_count(&mut self, mut table: Table) -> StashResult<()> {
        let count = self.window.read_u32(0);
        let width = if table.wide { 8 } else { 4 };

        if count as u64 * width != table.entries_len {
            let position = self.stack.top().map_or(self.window.cursor(), |t| t.position);
            return Err(StashError::malformed(
                position,
                format!(
                    "chunk offset table lists {} entries but has room for {} bytes",
                    count, table.entries_len
                ),
            ));
        }

        self.window.commit(ENTRY_COUNT_LEN, true)?;
        self.stats.tables_rewritten += 1;

        if count == 0 {
            self.close_table();
            return Ok(());
        }

        table.remaining = count;
        self.state = if table.wide {
            State::Offset64(table)
        } else {
            State::Offset32(table)
        };
        Ok(())
    }

    fn on_offset32(&mut self, table: Table) -> StashResult<()> {
        let shifted = self.window.read_u32(0) as u64 + self.insertion_len;

        if table.upgraded {
            // Widen in place: the 4 pad bytes plus the old field make room for 8
            self.window.prepend(4);
            self.window.write_u64(0, shifted);
            self.window.commit(8, true)?;
        } else {
            let value = u32::try_from(shifted).map_err(|_| {
                StashError::malformed(
                    self.window.cursor(),
                    format!("chunk offset {} does not fit a 32-bit table", shifted),
                )
            })?;
            self.window.write_u32(0, value);
            self.window.commit(4, true)?;
        }

        self.next_entry(table);
        Ok(())
    }

    fn on_offset64(&mut self, table: Table) -> StashResult<()> {
        let offset = self.window.read_u64(0);
        let shifted = offset.checked_add(self.insertion_len).ok_or_else(|| {
            StashError::malformed(self.window.cursor(), "64-bit chunk offset overflows")
        })?;
        self.window.write_u64(0, shifted);
        self.window.commit(8, true)?;

        self.next_entry(table);
        Ok(())
    }

    fn next_entry(&mut self, mut table: Table) {
        self.stats.offsets_rewritten += 1;
        table.remaining -= 1;

        if table.remaining == 0 {
            self.close_table();
        } else if table.wide {
            self.state = State::Offset64(table);
        } else {
            self.state = State::Offset32(table);
        }
    }

    fn close_table(&mut self) {
        self.close_top();
        self.state = State::Header;
    }

    /// Treat the rest of the innermost box as opaque content
    ///
    /// The bytes at the front of the window belong to that box and are
    /// copied through verbatim.
    fn skip_parent(&mut self, reason: &str) -> StashResult<()> {
        let Some(parent) = self.stack.top() else {
            return Err(StashError::malformed(
                self.window.cursor(),
                format!("invalid top-level box header ({})", reason),
            ));
        };

        let remaining = parent.remaining();
        trace!(box_info = %parent, remaining, reason, "copy rest of box as opaque");
        self.window.commit(remaining, true)?;
        self.close_top();
        self.state = State::Header;
        Ok(())
    }

    fn close_top(&mut self) {
        if let Some((closed, popped)) = self.stack.close_top() {
            trace!(box_info = %closed, popped, "close box");
        }
    }

    fn box_type_at_front(&self) -> FourCc {
        let b = self.window.bytes();
        [b[4], b[5], b[6], b[7]]
    }
}
