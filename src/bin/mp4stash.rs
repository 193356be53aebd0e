//! mp4stash command-line tool
//!
//! Usage: mp4stash -o <output> <video> --attach-file <file> [OPTIONS]
//!
//! Log verbosity is controlled through `RUST_LOG` (default: info).

use anyhow::{bail, Context, Result};
use clap::Parser;
use mp4stash::files::progress::{format_mib, percent};
use mp4stash::{stash_file_with_progress, FillerMode, Progress, StashOptions, StashReport};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Minimum time between two progress lines
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "mp4stash")]
#[command(about = "Hide a file inside an MP4 video while keeping it playable")]
struct Cli {
    /// Cover video (must start with an ftyp box)
    video: PathBuf,
    /// File to hide inside the video
    #[arg(long = "attach-file", value_name = "FILE")]
    attach_file: PathBuf,
    /// Output path (must not exist)
    #[arg(short, long)]
    output: PathBuf,
    /// Store the file without decoy filler
    #[arg(long, conflicts_with = "zero_filler")]
    no_filler: bool,
    /// Use this many zero bytes as filler instead of random decoys
    #[arg(long, value_name = "BYTES")]
    zero_filler: Option<usize>,
    /// Read size in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: usize,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
    /// Do not print progress
    #[arg(short, long)]
    quiet: bool,
}

/// Single-line progress on stderr, redrawn at most every 100 ms
struct StderrProgress {
    last: Option<Instant>,
}

impl StderrProgress {
    /// Throttle redraws, but always draw the final state
    fn should_draw(&self, now: Instant, written: u64, total: u64) -> bool {
        written >= total
            || self
                .last
                .map_or(true, |last| now.duration_since(last) >= PROGRESS_INTERVAL)
    }
}

impl Progress for StderrProgress {
    fn advance(&mut self, written: u64, total: u64) {
        let now = Instant::now();
        if !self.should_draw(now, written, total) {
            return;
        }
        self.last = Some(now);

        let mut stderr = std::io::stderr().lock();
        // Progress output is best effort
        let _ = write!(
            stderr,
            "\r\x1b[2KProgress: {}% ( {} / {} )",
            percent(written, total),
            format_mib(written),
            format_mib(total)
        );
        let _ = stderr.flush();
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !cli.video.is_file() {
        bail!("video file not found: {}", cli.video.display());
    }
    if !cli.attach_file.is_file() {
        bail!("attach file not found: {}", cli.attach_file.display());
    }

    let filler = match (cli.no_filler, cli.zero_filler) {
        (true, _) => FillerMode::None,
        (false, Some(len)) => FillerMode::Zeroes(len),
        (false, None) => FillerMode::Random,
    };
    let options = StashOptions::default()
        .chunk_size(cli.chunk_size)
        .filler(filler);

    let result = if cli.quiet {
        stash_file_with_progress(&cli.video, &cli.attach_file, &cli.output, &options, &mut ())
    } else {
        let mut progress = StderrProgress { last: None };
        let result = stash_file_with_progress(
            &cli.video,
            &cli.attach_file,
            &cli.output,
            &options,
            &mut progress,
        );
        eprintln!();
        result
    };
    let report =
        result.with_context(|| format!("failed to create {}", cli.output.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&cli, &report);
    }

    Ok(())
}

fn print_summary(cli: &Cli, report: &StashReport) {
    println!("Output file created: {}", cli.output.display());
    println!("Original video size: {}", format_mib(report.input_len));
    println!("Attached file size:  {}", format_mib(report.payload_len));
    println!("Final size:          {}", format_mib(report.output_len));
    println!(
        "Chunk offset tables: {} rewritten, {} widened to co64 ({} offsets)",
        report.tables_rewritten, report.tables_upgraded, report.offsets_rewritten
    );
}
