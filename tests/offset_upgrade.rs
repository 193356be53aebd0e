//! Tests for widening 32-bit chunk offset tables
//!
//! A real 4 GiB output is not written; the walker is told the projected
//! output size instead, exactly as the stash operation does.

#[path = "fixtures/mod.rs"]
mod fixtures;

use fixtures::{box_size, movie, read_tables, Layout, Movie, Table};
use mp4stash::bmff::{BoxWalker, FOUR_GIB};
use mp4stash::{SizeLedger, StashError};
use pretty_assertions::assert_eq;
use std::io::Cursor;

/// Run the walker over everything after `ftyp` and patch the result
///
/// Returns the rewritten container (with the original `ftyp`, without the
/// inserted bytes) so box offsets can be compared with the input.
fn rewrite(movie: &Movie, insertion_len: u64, projected_total: u64) -> (Vec<u8>, SizeLedger) {
    let ftyp_len = movie.ftyp_len as u64;
    let mut out = movie.bytes[..movie.ftyp_len].to_vec();
    let mut walker = BoxWalker::new(&mut out, ftyp_len, insertion_len, projected_total);
    for chunk in movie.bytes[movie.ftyp_len..].chunks(1000) {
        walker.feed(chunk).unwrap();
    }
    let ledger = walker.finish().unwrap().ledger;

    let mut file = Cursor::new(out);
    ledger.apply(&mut file).unwrap();
    (file.into_inner(), ledger)
}

#[test]
fn stco_becomes_co64_past_four_gib() {
    let movie = movie(Layout::MdatFirst, 1024 * 1024, &[Table::Stco], 100);
    let insertion_len = FOUR_GIB;
    let (out, ledger) = rewrite(&movie, insertion_len, FOUR_GIB + movie.bytes.len() as u64);

    assert_eq!(out.len(), movie.bytes.len() + 400);

    for name in [b"moov", b"trak", b"mdia", b"minf", b"stbl"] {
        assert_eq!(
            box_size(&out, name),
            box_size(&movie.bytes, name) + 400,
            "{}",
            String::from_utf8_lossy(name)
        );
    }
    assert_eq!(ledger.len(), 5);
    assert!(ledger.iter().all(|(_, increment)| increment == 400));

    let tables = read_tables(&out);
    assert_eq!(tables.len(), 1);
    assert_eq!(&tables[0].box_type, b"co64");
    assert_eq!(tables[0].size, 16 + 100 * 8);
    let expected: Vec<u64> = movie.offsets[0].iter().map(|o| o + insertion_len).collect();
    assert_eq!(tables[0].offsets, expected);
    assert!(tables[0].offsets.iter().all(|&o| o > u32::MAX as u64));
}

#[test]
fn below_threshold_keeps_stco() {
    let movie = movie(Layout::MdatFirst, 64 * 1024, &[Table::Stco], 100);
    let (out, ledger) = rewrite(&movie, 2048, FOUR_GIB - 1);

    assert!(ledger.is_empty());
    assert_eq!(out.len(), movie.bytes.len());
    let tables = read_tables(&out);
    assert_eq!(&tables[0].box_type, b"stco");
    assert_eq!(tables[0].offsets.len(), 100);
}

#[test]
fn every_track_is_widened_and_ancestors_accumulate() {
    let movie = movie(
        Layout::MoovFirst,
        64 * 1024,
        &[Table::Stco, Table::Co64, Table::Stco],
        10,
    );
    let (out, _) = rewrite(&movie, 100, FOUR_GIB);

    let tables = read_tables(&out);
    let types: Vec<&[u8; 4]> = tables.iter().map(|t| &t.box_type).collect();
    assert_eq!(types, vec![b"co64", b"co64", b"co64"]);
    for (table, original) in tables.iter().zip(&movie.offsets) {
        let shifted: Vec<u64> = original.iter().map(|o| o + 100).collect();
        assert_eq!(table.offsets, shifted);
    }

    // Two widened tables of 10 entries each
    assert_eq!(box_size(&out, b"moov"), box_size(&movie.bytes, b"moov") + 80);
    // The trailing mdat also moves by the growth; offsets only move by the insertion
    assert_eq!(out.len(), movie.bytes.len() + 80);
}

#[test]
fn patch_reports_32bit_overflow() {
    // A moov whose size is one table growth away from u32::MAX
    let mut data = Vec::new();
    data.extend_from_slice(&(u32::MAX - 10).to_be_bytes());
    data.extend_from_slice(b"moov");
    let ledger: SizeLedger = [(0, 400)].into_iter().collect();

    let err = ledger.apply(&mut Cursor::new(data)).unwrap_err();
    assert!(matches!(
        err,
        StashError::SizeOverflow {
            position: 0,
            increment: 400,
            ..
        }
    ));
}
