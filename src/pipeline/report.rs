//! Aggregate result of one conversion run

use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::parallel::{ConversionOutcome, JobOutcome};

/// One failed file, as kept in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub path: PathBuf,
    pub error: String,
    pub attempts: u32,
}

/// Summary of a run, built once from the outcome stream.
///
/// `outcomes` is a set: its order reflects completion, which is not
/// deterministic.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub total_files: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed_count: usize,
    /// Jobs pulled by a worker but abandoned on cancellation
    pub cancelled: usize,
    /// Whether the run's cancellation token fired
    pub interrupted: bool,
    /// Worker tasks that died before draining the queue
    pub crashed_workers: usize,
    pub first_error: Option<FailureSummary>,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub failures: Vec<FailureSummary>,
    #[serde(skip)]
    pub outcomes: Vec<JobOutcome>,
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl RunReport {
    /// Fold outcomes into counters. Failures keep arrival order, so
    /// `first_error` is the first failure the coordinator received.
    pub fn from_outcomes(total_files: usize, outcomes: Vec<JobOutcome>, elapsed: Duration) -> Self {
        let mut report = Self {
            total_files,
            elapsed,
            ..Self::default()
        };

        for job in &outcomes {
            match &job.outcome {
                ConversionOutcome::Converted { .. } => report.converted += 1,
                ConversionOutcome::Skipped(_) => report.skipped += 1,
                ConversionOutcome::Cancelled => report.cancelled += 1,
                ConversionOutcome::Failed { error, attempts } => {
                    report.failed_count += 1;
                    report.failures.push(FailureSummary {
                        path: job.source.clone(),
                        error: error.to_string(),
                        attempts: *attempts,
                    });
                }
            }
        }

        report.first_error = report.failures.first().cloned();
        report.outcomes = outcomes;
        report
    }

    /// Files that reached a terminal converted/skipped/failed state
    pub fn processed(&self) -> usize {
        self.converted + self.skipped + self.failed_count
    }

    /// True when the run was stopped by cancellation
    pub fn was_cancelled(&self) -> bool {
        self.interrupted || self.cancelled > 0
    }

    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} files: {} converted, {} skipped, {} failed in {:.2}s",
            self.total_files,
            self.converted,
            self.skipped,
            self.failed_count,
            self.elapsed.as_secs_f64()
        );
        if self.was_cancelled() {
            line.push_str(&format!(
                " (cancelled, {} not processed)",
                self.total_files.saturating_sub(self.processed())
            ));
        }
        if self.crashed_workers > 0 {
            line.push_str(&format!(" ({} worker(s) crashed)", self.crashed_workers));
        }
        line
    }
}
