//! Run progress reporting and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::aggregator::SourceStat;
use crate::pipeline::RunSummary;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each source adapter finishes.
    fn source_done(&self, stat: &SourceStat);
    /// Called after each matching chunk is merged.
    fn chunk_done(&self, current: usize, total: usize);
    /// Called when the pipeline completes with a report.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_done(&self, _stat: &SourceStat) {}
    fn chunk_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Shared flag asking a run to stop at its next chunk boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
