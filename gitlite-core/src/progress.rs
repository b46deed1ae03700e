//! Progress reporting and cooperative cancellation for long-running operations.

/// Receives progress updates from batch work and answers cancellation checks.
pub trait Progress: Send + Sync {
    fn report(&self, message: &str, percent: u8);

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Discards progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Progress for Silent {
    fn report(&self, _message: &str, _percent: u8) {}
}

/// Percentage of `done` out of `total`, clamped to 0..=100.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
