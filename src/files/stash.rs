//! Two-phase stash operation
//!
//! Phase 1 streams the output front to back: the `ftyp` box, the injected
//! `free` box (header, payload, filler) and the rest of the container as
//! rewritten by the [`BoxWalker`]. Phase 2 reopens the finished output for
//! random access and applies the [`SizeLedger`] the walker left behind.
//! The phases share nothing but that ledger.

use crate::bmff::{
    copy_bytes, format_fourcc, read_box, BmffBox, BoxWalker, FreeBoxHeader, SizeLedger,
    EXTENDED_HEADER_LEN, EXTENDED_SIZE_MARKER, FTYP_BOX, HEADER_LEN,
};
use crate::core::error::{StashError, StashResult};
use crate::files::filler::build_filler;
use crate::files::handler::StashOptions;
use crate::files::progress::Progress;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info};

/// Summary of a finished stash operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StashReport {
    /// Length of the `ftyp` box copied verbatim
    pub ftyp_len: u64,
    pub payload_len: u64,
    pub filler_len: u64,
    /// Total size of the injected `free` box; every chunk offset moved by this much
    pub insertion_len: u64,
    /// Bytes read from the container
    pub input_len: u64,
    /// Bytes written to the output
    pub output_len: u64,
    pub tables_rewritten: u64,
    /// `stco` tables widened to `co64`
    pub tables_upgraded: u64,
    pub offsets_rewritten: u64,
    /// Ancestor size fields patched after the copy
    pub ancestors_patched: u64,
}

/// Hide `payload` inside a copy of `container` written to `output`
///
/// `output` must not exist yet. On failure a partially written output may be
/// left behind and must not be used.
///
/// # Example
///
/// ```rust,no_run
/// use mp4stash::{stash_file, StashOptions};
///
/// let report = stash_file("clip.mp4", "archive.zip", "clip-out.mp4", &StashOptions::default())?;
/// println!("inserted {} bytes", report.insertion_len);
/// # Ok::<(), mp4stash::StashError>(())
/// ```
pub fn stash_file<C, P, O>(
    container: C,
    payload: P,
    output: O,
    options: &StashOptions,
) -> StashResult<StashReport>
where
    C: AsRef<Path>,
    P: AsRef<Path>,
    O: AsRef<Path>,
{
    stash_file_with_progress(container, payload, output, options, &mut ())
}

/// [`stash_file`] reporting progress of the streamed copy to `progress`
pub fn stash_file_with_progress<C, P, O, G>(
    container: C,
    payload: P,
    output: O,
    options: &StashOptions,
    progress: &mut G,
) -> StashResult<StashReport>
where
    C: AsRef<Path>,
    P: AsRef<Path>,
    O: AsRef<Path>,
    G: Progress + ?Sized,
{
    let output = output.as_ref();
    if output.exists() {
        return Err(StashError::OutputExists(output.to_path_buf()));
    }

    let mut container_file = File::open(container.as_ref())?;
    let container_len = container_file.metadata()?.len();
    let ftyp = probe_ftyp(&mut container_file)?;
    debug!(size = ftyp.size, "found ftyp box");

    let mut payload_file = File::open(payload.as_ref())?;
    let payload_len = payload_file.metadata()?.len();

    info!(
        container = %container.as_ref().display(),
        payload = %payload.as_ref().display(),
        output = %output.display(),
        container_len,
        payload_len,
        "stashing payload"
    );

    let out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => StashError::OutputExists(output.to_path_buf()),
            _ => StashError::Io(e),
        })?;

    let mut writer = BufWriter::new(out);
    let (ledger, mut report) = stash_streams(
        &mut container_file,
        container_len,
        &mut payload_file,
        payload_len,
        &mut writer,
        options,
        progress,
    )?;
    // Close the streaming handle before the patch pass
    drop(writer.into_inner().map_err(io::IntoInnerError::into_error)?);
    debug!(output_len = report.output_len, "streamed copy closed");

    if !ledger.is_empty() {
        let mut file = OpenOptions::new().read(true).write(true).open(output)?;
        report.ancestors_patched = ledger.apply(&mut file)? as u64;
        debug!(patched = report.ancestors_patched, "ancestor sizes patched");
    }

    info!(
        insertion_len = report.insertion_len,
        output_len = report.output_len,
        tables_rewritten = report.tables_rewritten,
        tables_upgraded = report.tables_upgraded,
        "stash complete"
    );
    Ok(report)
}

/// Hide `payload` inside an in-memory `container`
///
/// Runs both phases against a memory buffer and returns the finished output.
pub fn stash_bytes(
    container: &[u8],
    payload: &[u8],
    options: &StashOptions,
) -> StashResult<(Vec<u8>, StashReport)> {
    let mut output = Cursor::new(Vec::with_capacity(container.len() + payload.len()));
    let (ledger, mut report) = stash_streams(
        &mut Cursor::new(container),
        container.len() as u64,
        &mut Cursor::new(payload),
        payload.len() as u64,
        &mut output,
        options,
        &mut (),
    )?;
    report.ancestors_patched = ledger.apply(&mut output)? as u64;
    Ok((output.into_inner(), report))
}

/// Phase 1 on arbitrary streams
///
/// Reads the container front to back, writes the rewritten output to
/// `writer`, and returns the ledger still to be applied to the output together
/// with the report. `ancestors_patched` is left at zero; it is known once the
/// ledger has been applied.
///
/// * `container_len` - Total container size, used to decide whether 32-bit
///   chunk offset tables have to be widened
/// * `payload_len` - Exact number of bytes read from `payload`
pub fn stash_streams<R, P, W, G>(
    container: &mut R,
    container_len: u64,
    payload: &mut P,
    payload_len: u64,
    writer: &mut W,
    options: &StashOptions,
    progress: &mut G,
) -> StashResult<(SizeLedger, StashReport)>
where
    R: Read + ?Sized,
    P: Read + ?Sized,
    W: Write + ?Sized,
    G: Progress + ?Sized,
{
    let ftyp_len = copy_ftyp(container, writer)?;

    let filler = build_filler(options.filler, payload_len);
    let header = FreeBoxHeader::new(payload_len, filler.len() as u64)?;
    let insertion_len = header.total_size();
    let projected_total =
        container_len
            .checked_add(insertion_len)
            .ok_or(StashError::PayloadTooLarge {
                len: payload_len,
                limit: u64::MAX - container_len,
            })?;
    debug!(
        insertion_len,
        filler_len = filler.len(),
        extended = header.is_extended(),
        projected_total,
        "writing free box"
    );

    header.write_to(writer)?;
    let copied = copy_bytes(payload, writer, payload_len)?;
    if copied != payload_len {
        return Err(StashError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("payload ended after {} of {} bytes", copied, payload_len),
        )));
    }
    writer.write_all(&filler)?;

    let start = ftyp_len + insertion_len;
    progress.advance(start, projected_total);

    let mut walker = BoxWalker::new(&mut *writer, start, insertion_len, projected_total);
    let mut buf = vec![0u8; options.chunk_size.max(1)];
    let mut input_len = ftyp_len;
    loop {
        let n = match container.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        walker.feed(&buf[..n])?;
        input_len += n as u64;
        progress.advance(walker.cursor(), walker.projected_total());
    }

    let outcome = walker.finish()?;
    progress.advance(outcome.output_len, outcome.output_len);

    let report = StashReport {
        ftyp_len,
        payload_len,
        filler_len: filler.len() as u64,
        insertion_len,
        input_len,
        output_len: outcome.output_len,
        tables_rewritten: outcome.stats.tables_rewritten,
        tables_upgraded: outcome.stats.tables_upgraded,
        offsets_rewritten: outcome.stats.offsets_rewritten,
        ancestors_patched: 0,
    };
    Ok((outcome.ledger, report))
}

/// Check that the container starts with `ftyp`, leaving the reader at offset 0
fn probe_ftyp<R: Read + Seek>(reader: &mut R) -> StashResult<BmffBox> {
    let first = read_box(reader).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            StashError::InvalidContainer("file is shorter than a box header".to_string())
        }
        _ => StashError::Io(e),
    })?;

    if &first.box_type != FTYP_BOX {
        return Err(StashError::InvalidContainer(format!(
            "first box is '{}', expected 'ftyp'",
            format_fourcc(&first.box_type)
        )));
    }
    if first.size < first.header_size() {
        return Err(StashError::InvalidContainer(format!(
            "ftyp box declares size {}",
            first.size
        )));
    }

    reader.seek(SeekFrom::Start(0))?;
    Ok(first)
}

/// Copy the leading `ftyp` box verbatim and return its length
fn copy_ftyp<R, W>(reader: &mut R, writer: &mut W) -> StashResult<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut header = [0u8; EXTENDED_HEADER_LEN as usize];
    read_header_bytes(reader, &mut header[..HEADER_LEN as usize])?;

    if &header[4..8] != FTYP_BOX {
        return Err(StashError::InvalidContainer(
            "container does not start with an ftyp box".to_string(),
        ));
    }

    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let (size, header_len) = if size == EXTENDED_SIZE_MARKER {
        read_header_bytes(reader, &mut header[HEADER_LEN as usize..])?;
        let mut large = [0u8; 8];
        large.copy_from_slice(&header[8..16]);
        (u64::from_be_bytes(large), EXTENDED_HEADER_LEN)
    } else {
        (size as u64, HEADER_LEN)
    };

    if size < header_len {
        return Err(StashError::InvalidContainer(format!(
            "ftyp box declares size {}",
            size
        )));
    }

    writer.write_all(&header[..header_len as usize])?;
    let body = size - header_len;
    if copy_bytes(reader, writer, body)? != body {
        return Err(StashError::InvalidContainer(
            "ftyp box is truncated".to_string(),
        ));
    }
    Ok(size)
}

fn read_header_bytes<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> StashResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            StashError::InvalidContainer("file is shorter than a box header".to_string())
        }
        _ => StashError::Io(e),
    })
}
