//! Increment-only progress counter for conversion runs

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use crate::parallel::job::OutcomeKind;

/// Counts finished jobs and broadcasts one update per job.
///
/// Purely observational: the pipeline never reads it back.
pub struct ProgressTracker {
    sender: broadcast::Sender<ProgressUpdate>,
    total: AtomicU64,
    finished: AtomicU64,
    converted: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub finished: u64,
    pub converted: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Progress update event
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started { total: u64 },
    JobFinished {
        source: PathBuf,
        kind: OutcomeKind,
        finished: u64,
    },
    Finished { snapshot: ProgressSnapshot },
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);

        Self {
            sender,
            total: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            converted: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Listen for updates; lagging receivers miss events but never block
    /// the workers.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }

    /// Reset the counters for a run over `total` jobs
    pub fn start(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        for counter in [&self.finished, &self.converted, &self.skipped, &self.failed] {
            counter.store(0, Ordering::Relaxed);
        }

        let _ = self.sender.send(ProgressUpdate::Started { total });
        debug!("Progress tracking started for {} files", total);
    }

    /// Count one finished job
    pub fn record(&self, source: PathBuf, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Converted => self.converted.fetch_add(1, Ordering::Relaxed),
            OutcomeKind::Skipped => self.skipped.fetch_add(1, Ordering::Relaxed),
            OutcomeKind::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            OutcomeKind::Cancelled => 0,
        };
        let finished = self.finished.fetch_add(1, Ordering::Relaxed) + 1;

        let _ = self.sender.send(ProgressUpdate::JobFinished {
            source,
            kind,
            finished,
        });
    }

    /// Announce the end of the run
    pub fn finish(&self) {
        let snapshot = self.snapshot();
        let _ = self.sender.send(ProgressUpdate::Finished { snapshot });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
