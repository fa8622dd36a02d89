//! Bounded retries with linear, cancellation-aware backoff

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};

/// Default number of attempts per file
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff step
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// How often and how patiently a failing file is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_step: Duration,
}

/// Result of running an operation under a [`RetryPolicy`]
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    /// Retries exhausted, or the error was permanent
    Failed { error: ConvertError, attempts: u32 },
    /// Cancellation observed before an attempt or during a backoff wait
    Cancelled { attempts: u32 },
}

impl RetryPolicy {
    /// `max_attempts` is raised to at least one
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait inserted after the attempt with index `attempt_index` fails:
    /// 0, 1x, 2x the backoff step, and so on.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt_index)
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires.
    ///
    /// An attempt that has already started is always awaited to completion;
    /// cancellation is only observed between attempts.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut index = 0;

        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled { attempts: index };
            }

            let attempts = index + 1;
            match operation(index).await {
                Ok(value) => return RetryOutcome::Succeeded { value, attempts },
                Err(error) if !error.is_retryable() => {
                    debug!("Permanent failure on attempt {}: {}", attempts, error);
                    return RetryOutcome::Failed { error, attempts };
                }
                Err(error) if attempts >= self.max_attempts => {
                    return RetryOutcome::Failed { error, attempts };
                }
                Err(error) => {
                    warn!(
                        "Attempt {}/{} failed: {}",
                        attempts, self.max_attempts, error
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return RetryOutcome::Cancelled { attempts };
                }
                _ = tokio::time::sleep(self.delay_for(index)) => {}
            }

            index = attempts;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_STEP)
    }
}
