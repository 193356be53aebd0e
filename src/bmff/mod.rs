//! ISO Base Media File Format (BMFF) box engine
//!
//! This module holds everything that touches the box structure of an MP4
//! container while it is being copied:
//! - `window`: chunked byte window that sits between input reads and the output
//! - `stack`: descriptors of the currently open boxes
//! - `walker`: the streaming state machine that rewrites chunk-offset tables
//! - `ledger`: size increments owed by ancestor boxes, applied after the copy
//! - `free_box`: header of the injected `free` box
//!
//! BMFF Structure:
//! - Files are composed of "boxes" (also called "atoms" in QuickTime)
//! - Each box has: 4-byte size, 4-byte type, optional extended size, data
//! - All multi-byte integers are big-endian

use std::io::{Read, Seek, Write};

pub mod free_box;
pub mod ledger;
pub mod stack;
pub mod walker;
pub mod window;

pub use free_box::FreeBoxHeader;
pub use ledger::SizeLedger;
pub use stack::{BoxDescriptor, BoxStack};
pub use walker::{BoxWalker, WalkOutcome, WalkStats};
pub use window::ChunkedWindow;

// ============================================================================
// Constants
// ============================================================================

/// Four-character box type
pub type FourCc = [u8; 4];

/// ftyp box type (file type box)
pub const FTYP_BOX: &FourCc = b"ftyp";

/// free box type (free space box, carries the payload)
pub const FREE_BOX: &FourCc = b"free";

/// mdat box type (media data)
pub const MDAT_BOX: &FourCc = b"mdat";

/// 32-bit chunk offset table
pub const STCO_BOX: &FourCc = b"stco";

/// 64-bit chunk offset table
pub const CO64_BOX: &FourCc = b"co64";

/// Boxes whose content is never parsed as nested boxes
pub const OPAQUE_BOXES: &[&FourCc] = &[b"mdat", b"free", b"skip", b"wide"];

/// Standard header: 32-bit size + type
pub const HEADER_LEN: u64 = 8;

/// Extended header: size marker 1 + type + 64-bit size
pub const EXTENDED_HEADER_LEN: u64 = 16;

/// Size field value announcing a 64-bit size after the type
pub const EXTENDED_SIZE_MARKER: u32 = 1;

/// Files at or above this size cannot be addressed by 32-bit offsets
pub const FOUR_GIB: u64 = 1 << 32;

// ============================================================================
// Helpers
// ============================================================================

/// Check that a box type only uses space, ASCII digits and ASCII letters
pub fn is_valid_fourcc(box_type: &[u8]) -> bool {
    box_type
        .iter()
        .all(|&b| b == b' ' || b.is_ascii_digit() || b.is_ascii_alphabetic())
}

/// Whether a box of this type must be copied through without descending
pub fn is_opaque(box_type: &FourCc) -> bool {
    OPAQUE_BOXES.iter().any(|t| *t == box_type)
}

/// Render a box type for logs and error messages
pub fn format_fourcc(box_type: &FourCc) -> String {
    std::str::from_utf8(box_type).unwrap_or("????").to_string()
}

// ============================================================================
// Types
// ============================================================================

/// BMFF box information
#[derive(Debug, Clone)]
pub struct BmffBox {
    /// Box size (including header)
    pub size: u64,
    /// Box type (4-byte FourCC)
    pub box_type: FourCc,
    /// Offset where box data starts (after header)
    pub data_offset: u64,
    /// Offset where box header starts
    pub header_offset: u64,
}

impl BmffBox {
    /// Get the size of the box header (8 or 16 bytes for extended size)
    pub fn header_size(&self) -> u64 {
        self.data_offset - self.header_offset
    }
}

// ============================================================================
// Reading Functions
// ============================================================================

/// Read a box header at the current position
pub fn read_box<R: Read + Seek>(reader: &mut R) -> std::io::Result<BmffBox> {
    let header_offset = reader.stream_position()?;

    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let box_type = [header[4], header[5], header[6], header[7]];

    // Handle extended size (size == 1 means extended size follows)
    let (actual_size, data_offset) = if size == EXTENDED_SIZE_MARKER {
        let mut ext_size_bytes = [0u8; 8];
        reader.read_exact(&mut ext_size_bytes)?;
        (
            u64::from_be_bytes(ext_size_bytes),
            header_offset + EXTENDED_HEADER_LEN,
        )
    } else {
        (size as u64, header_offset + HEADER_LEN)
    };

    Ok(BmffBox {
        size: actual_size,
        box_type,
        data_offset,
        header_offset,
    })
}

/// Copy bytes from reader to writer
///
/// Returns the number of bytes actually copied, which is less than `count`
/// only if the reader hit end of input.
pub fn copy_bytes<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    count: u64,
) -> std::io::Result<u64> {
    let mut buffer = [0u8; 8192];
    let mut remaining = count;

    while remaining > 0 {
        let to_read = remaining.min(buffer.len() as u64) as usize;
        let n = reader.read(&mut buffer[..to_read])?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n])?;
        remaining -= n as u64;
    }

    Ok(count - remaining)
}
