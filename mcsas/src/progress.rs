use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::prelude::*;

/// Cooperative cancellation flag, polled inside the Monte-Carlo loop.
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything known about one finished repetition, for reporting.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    /// Repetition index.
    pub rep: usize,
    /// Repetitions finished so far (converged ones only).
    pub completed: usize,
    pub total: usize,
    pub converged: bool,
    /// Final reduced χ² of the last attempt.
    pub chi_sq: Float,
    pub elapsed_s: f32,
    pub mean_s: f32,
    pub remaining_s: f32,
}

/// Observer for repetition progress; may be called from worker threads.
pub trait Progress: Sync {
    fn repetition(&self, _update: &ProgressUpdate) {}
}

/// Ignores all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}
