//! Progress reporting during the streamed copy

/// Receives output progress during the streamed copy
///
/// `written` is the number of output bytes committed so far and `total` the
/// projected size of the finished output. `total` may grow while the copy
/// runs when chunk offset tables are widened.
pub trait Progress {
    fn advance(&mut self, written: u64, total: u64);
}

/// No progress reporting
impl Progress for () {
    fn advance(&mut self, _written: u64, _total: u64) {}
}

impl<P: Progress + ?Sized> Progress for &mut P {
    fn advance(&mut self, written: u64, total: u64) {
        (**self).advance(written, total);
    }
}

/// Whole percent of `written` over `total`, 100 for an empty total
pub fn percent(written: u64, total: u64) -> u64 {
    if total == 0 {
        return 100;
    }
    ((written as u128 * 100 + total as u128 / 2) / total as u128) as u64
}

/// Render a byte count as mebibytes with two decimals
pub fn format_mib(bytes: u64) -> String {
    format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0))
}
