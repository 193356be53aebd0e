//! Filler written after the payload inside the `free` box
//!
//! The random filler is laid out as
//! `signature ‖ random bytes ‖ signature ‖ random bytes`, with the signatures
//! picked from common archive magic numbers. The tail is padded so that the
//! payload and filler together end on a 4-byte boundary.

use super::handler::FillerMode;
use rand::Rng;

/// Archive magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub magic: &'static [u8],
}

/// Signatures the random filler draws from
pub const SIGNATURES: &[Signature] = &[
    Signature {
        name: "RAR4",
        magic: &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00],
    },
    Signature {
        name: "RAR5",
        magic: &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00],
    },
    Signature {
        name: "ZIP",
        magic: &[0x50, 0x4B, 0x03, 0x04],
    },
    Signature {
        name: "GZIP",
        magic: &[0x1F, 0x8B],
    },
    Signature {
        name: "BZIP2",
        magic: &[0x42, 0x5A, 0x68],
    },
    Signature {
        name: "XZ",
        magic: &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00],
    },
    Signature {
        name: "7Z",
        magic: &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C],
    },
];

/// Random block sizes, in KiB
const BLOCK_KIB: std::ops::RangeInclusive<usize> = 5..=10;

/// Build the filler for `mode` using the thread-local generator
pub fn build_filler(mode: FillerMode, payload_len: u64) -> Vec<u8> {
    build_filler_with(mode, payload_len, &mut rand::rng())
}

/// Build the filler for `mode` using `rng`
pub fn build_filler_with<R: Rng>(mode: FillerMode, payload_len: u64, rng: &mut R) -> Vec<u8> {
    match mode {
        FillerMode::Random => random_filler(payload_len, rng),
        FillerMode::None => Vec::new(),
        FillerMode::Zeroes(len) => vec![0; len],
    }
}

fn random_filler<R: Rng>(payload_len: u64, rng: &mut R) -> Vec<u8> {
    let first = pick_signature(rng);
    let second = pick_signature(rng);
    let signatures_len = (first.magic.len() + second.magic.len()) as u64;
    let pad = 4 - (signatures_len + payload_len) % 4;

    let first_block = 1024 * rng.random_range(BLOCK_KIB);
    let second_block = 1024 * rng.random_range(BLOCK_KIB) + pad as usize;

    let mut filler = Vec::with_capacity(signatures_len as usize + first_block + second_block);
    filler.extend_from_slice(first.magic);
    append_random(&mut filler, first_block, rng);
    filler.extend_from_slice(second.magic);
    append_random(&mut filler, second_block, rng);
    filler
}

fn pick_signature<R: Rng>(rng: &mut R) -> &'static Signature {
    &SIGNATURES[rng.random_range(0..SIGNATURES.len())]
}

fn append_random<R: Rng>(buf: &mut Vec<u8>, len: usize, rng: &mut R) {
    let start = buf.len();
    buf.resize(start + len, 0);
    rng.fill(&mut buf[start..]);
}
