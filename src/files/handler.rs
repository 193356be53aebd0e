//! Options for stash operations

/// Default size of each read from the container (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest accepted read size; every fixed-size field fits in one read
pub const MIN_CHUNK_SIZE: usize = 16;

/// What to put after the payload inside the `free` box
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillerMode {
    /// Archive signatures surrounded by random bytes
    #[default]
    Random,
    /// Payload only
    None,
    /// The given number of zero bytes
    Zeroes(usize),
}

/// Options for stash operations.
///
/// Use the builder pattern to configure options.
///
/// # Example
///
/// ```rust,no_run
/// use mp4stash::{stash_file, FillerMode, StashOptions};
///
/// let options = StashOptions::default()
///     .chunk_size(1024 * 1024)
///     .filler(FillerMode::Zeroes(4096));
/// stash_file("clip.mp4", "notes.txt", "clip-out.mp4", &options)?;
/// # Ok::<(), mp4stash::StashError>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StashOptions {
    /// Bytes requested from the container per read (default: 64 KiB)
    pub chunk_size: usize,
    /// Filler placed after the payload (default: random)
    pub filler: FillerMode,
}

impl Default for StashOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            filler: FillerMode::default(),
        }
    }
}

impl StashOptions {
    /// Read the container in chunks of `size` bytes.
    ///
    /// Values below 16 are raised to 16.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(MIN_CHUNK_SIZE);
        self
    }

    /// Choose the filler placed after the payload.
    pub fn filler(mut self, filler: FillerMode) -> Self {
        self.filler = filler;
        self
    }

    /// Store the payload without any filler.
    pub fn without_filler(self) -> Self {
        self.filler(FillerMode::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StashOptions::default();
        assert_eq!(options.chunk_size, 64 * 1024);
        assert_eq!(options.filler, FillerMode::Random);
    }

    #[test]
    fn test_builder() {
        let options = StashOptions::default()
            .chunk_size(4096)
            .filler(FillerMode::Zeroes(10));
        assert_eq!(options.chunk_size, 4096);
        assert_eq!(options.filler, FillerMode::Zeroes(10));

        assert_eq!(options.without_filler().filler, FillerMode::None);
    }

    #[test]
    fn test_chunk_size_is_clamped() {
        assert_eq!(StashOptions::default().chunk_size(1).chunk_size, MIN_CHUNK_SIZE);
        assert_eq!(StashOptions::default().chunk_size(0).chunk_size, MIN_CHUNK_SIZE);
    }
}
