//! Synthetic MP4 fixtures
//!
//! Containers are built in memory: `ftyp`, an `mdat` of generated sample
//! bytes, and a `moov` whose tracks carry chunk offset tables pointing into
//! that `mdat`. [`read_tables`] is an independent reader used to check the
//! rewritten output.

#![allow(dead_code)]

use mp4stash::bmff::{read_box, BmffBox};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Chunk offset table flavor for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Stco,
    Co64,
}

/// Box order at top level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// ftyp, mdat, moov
    MdatFirst,
    /// ftyp, moov, mdat
    MoovFirst,
}

/// A generated container and the offsets its tables hold
#[derive(Debug, Clone)]
pub struct Movie {
    pub bytes: Vec<u8>,
    /// Chunk offsets per track, as stored in the input
    pub offsets: Vec<Vec<u64>>,
    pub ftyp_len: usize,
}

pub fn box_bytes(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + body.len());
    data.extend_from_slice(&(8 + body.len() as u32).to_be_bytes());
    data.extend_from_slice(box_type);
    data.extend_from_slice(body);
    data
}

/// Box with version 0 and no flags in front of `body`
pub fn full_box(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut content = vec![0, 0, 0, 0];
    content.extend_from_slice(body);
    box_bytes(box_type, &content)
}

pub fn ftyp() -> Vec<u8> {
    box_bytes(b"ftyp", b"isom\x00\x00\x02\x00isomiso2avc1mp41")
}

pub fn stco(offsets: &[u32]) -> Vec<u8> {
    let mut body = (offsets.len() as u32).to_be_bytes().to_vec();
    for offset in offsets {
        body.extend_from_slice(&offset.to_be_bytes());
    }
    full_box(b"stco", &body)
}

pub fn co64(offsets: &[u64]) -> Vec<u8> {
    let mut body = (offsets.len() as u32).to_be_bytes().to_vec();
    for offset in offsets {
        body.extend_from_slice(&offset.to_be_bytes());
    }
    full_box(b"co64", &body)
}

/// Sample bytes for the `mdat`
///
/// Every 4 KiB block starts with bytes that look like an `stco` header.
pub fn media_data(len: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len).map(|i| (i * 31 % 251) as u8).collect();
    for block in data.chunks_mut(4096) {
        if block.len() >= 8 {
            block[..4].copy_from_slice(&16u32.to_be_bytes());
            block[4..8].copy_from_slice(b"stco");
        }
    }
    data
}

fn trak(table: Vec<u8>) -> Vec<u8> {
    let mut stbl = full_box(b"stsd", &0u32.to_be_bytes());
    stbl.extend(table);
    let stbl = box_bytes(b"stbl", &stbl);

    let mut minf = full_box(b"vmhd", &[0u8; 8]);
    minf.extend(box_bytes(b"dinf", &full_box(b"dref", &0u32.to_be_bytes())));
    minf.extend(stbl);
    let minf = box_bytes(b"minf", &minf);

    let mut mdia = full_box(b"mdhd", &[0u8; 20]);
    mdia.extend(full_box(b"hdlr", b"\0\0\0\0vide\0\0\0\0\0\0\0\0\0\0\0\0VideoHandler\0"));
    mdia.extend(minf);
    let mdia = box_bytes(b"mdia", &mdia);

    let mut trak = full_box(b"tkhd", &[0u8; 80]);
    trak.extend(mdia);
    box_bytes(b"trak", &trak)
}

fn moov(tables: Vec<Vec<u8>>) -> Vec<u8> {
    let mut moov = full_box(b"mvhd", &[0u8; 96]);
    for table in tables {
        moov.extend(trak(table));
    }
    // QuickTime-style user data with a trailing zero terminator
    let mut udta = box_bytes(b"\xa9too", b"\0\x05\0\0mp4st");
    udta.extend_from_slice(&[0, 0, 0, 0]);
    moov.extend(box_bytes(b"udta", &udta));
    box_bytes(b"moov", &moov)
}

fn table_bytes(kind: Table, offsets: &[u64]) -> Vec<u8> {
    match kind {
        Table::Stco => {
            let offsets: Vec<u32> = offsets.iter().map(|&o| o as u32).collect();
            stco(&offsets)
        }
        Table::Co64 => co64(offsets),
    }
}

/// Build a movie with one track per entry of `tracks`, each table holding
/// `entries` chunk offsets spread over an `mdat` of `mdat_len` bytes
pub fn movie(layout: Layout, mdat_len: usize, tracks: &[Table], entries: usize) -> Movie {
    let ftyp = ftyp();
    let mdat = box_bytes(b"mdat", &media_data(mdat_len));

    // Table sizes do not depend on the offset values, so size moov first
    let placeholder: Vec<Vec<u8>> = tracks
        .iter()
        .map(|&kind| table_bytes(kind, &vec![0; entries]))
        .collect();
    let moov_len = moov(placeholder).len();

    let mdat_data_start = match layout {
        Layout::MdatFirst => ftyp.len() + 8,
        Layout::MoovFirst => ftyp.len() + moov_len + 8,
    } as u64;

    let stride = (mdat_len / entries.max(1)) as u64;
    let offsets: Vec<Vec<u64>> = tracks
        .iter()
        .enumerate()
        .map(|(track, _)| {
            (0..entries as u64)
                .map(|i| mdat_data_start + i * stride + track as u64)
                .collect()
        })
        .collect();

    let tables = tracks
        .iter()
        .zip(&offsets)
        .map(|(&kind, offsets)| table_bytes(kind, offsets))
        .collect();
    let moov = moov(tables);

    let mut bytes = ftyp.clone();
    match layout {
        Layout::MdatFirst => {
            bytes.extend(mdat);
            bytes.extend(moov);
        }
        Layout::MoovFirst => {
            bytes.extend(moov);
            bytes.extend(mdat);
        }
    }

    Movie {
        bytes,
        offsets,
        ftyp_len: ftyp.len(),
    }
}

/// A chunk offset table found by [`read_tables`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundTable {
    pub box_type: [u8; 4],
    pub header_offset: u64,
    pub size: u64,
    pub offsets: Vec<u64>,
}

const CONTAINERS: &[&[u8; 4]] = &[b"moov", b"trak", b"mdia", b"minf", b"stbl"];

/// Every `stco`/`co64` table of a container, in file order
pub fn read_tables(data: &[u8]) -> Vec<FoundTable> {
    let mut found = Vec::new();
    scan(data, 0, data.len() as u64, &mut found);
    found
}

fn scan(data: &[u8], start: u64, end: u64, found: &mut Vec<FoundTable>) {
    let mut reader = Cursor::new(data);
    let mut pos = start;
    while pos + 8 <= end {
        reader.set_position(pos);
        let info = read_box(&mut reader).unwrap();
        assert!(info.size >= info.header_size(), "bad box at {}", pos);
        let box_end = pos + info.size;

        if CONTAINERS.contains(&&info.box_type) {
            scan(data, info.data_offset, box_end, found);
        } else if &info.box_type == b"stco" || &info.box_type == b"co64" {
            found.push(parse_table(data, &info));
        }
        pos = box_end;
    }
}

fn parse_table(data: &[u8], info: &BmffBox) -> FoundTable {
    let at = info.data_offset as usize + 4;
    let count = u32::from_be_bytes(data[at..at + 4].try_into().unwrap()) as usize;
    let width = if &info.box_type == b"co64" { 8 } else { 4 };
    let offsets = (0..count)
        .map(|i| {
            let p = at + 4 + i * width;
            if width == 8 {
                u64::from_be_bytes(data[p..p + 8].try_into().unwrap())
            } else {
                u32::from_be_bytes(data[p..p + 4].try_into().unwrap()) as u64
            }
        })
        .collect();

    FoundTable {
        box_type: info.box_type,
        header_offset: info.header_offset,
        size: info.size,
        offsets,
    }
}

/// Declared size of the first box of `box_type` on the path to the tables
pub fn box_size(data: &[u8], box_type: &[u8; 4]) -> u64 {
    let mut reader = Cursor::new(data);
    let mut pos = 0;
    loop {
        reader.set_position(pos);
        let info = read_box(&mut reader).unwrap();
        if &info.box_type == box_type {
            return info.size;
        }
        pos = if CONTAINERS.contains(&&info.box_type) {
            info.data_offset
        } else {
            pos + info.size
        };
    }
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}
