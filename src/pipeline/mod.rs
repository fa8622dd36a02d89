//! Pipeline coordinator: validates options, discovers files, runs the
//! worker pool and folds outcomes into a [`RunReport`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ConversionOptions, SourceFormat};
use crate::error::{ConvertError, Result};
use crate::parallel::{
    feed, work_queue, ConversionJob, JobOutcome, ProgressTracker, RetryPolicy, WorkerContext,
    WorkerPool,
};
use crate::processing::{FormatResolver, FormatSniffer, ImageCodec, ImageCrateCodec};

pub mod report;

pub use report::*;

/// Conversion pipeline with pluggable codec and sniffer
pub struct Pipeline {
    codec: Arc<dyn ImageCodec>,
    resolver: FormatResolver,
    retry: RetryPolicy,
    progress: Arc<ProgressTracker>,
}

impl Pipeline {
    /// Pipeline using the `image` crate codec, the `infer` sniffer and the
    /// default retry policy
    pub fn new() -> Self {
        Self {
            codec: Arc::new(ImageCrateCodec::new()),
            resolver: FormatResolver::default(),
            retry: RetryPolicy::default(),
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_sniffer(mut self, sniffer: Arc<dyn FormatSniffer>) -> Self {
        self.resolver = FormatResolver::new(sniffer);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Progress counter updated by the workers; subscribe before `run`
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Convert every matching file in `options.source_dir`.
    ///
    /// Fails before any work starts on invalid options, an uncreatable
    /// target directory or an empty input. Once files are dispatched, the
    /// only error is [`ConvertError::BatchFailed`], returned when at least
    /// one file failed; it carries the full report. Cancelling `cancel`
    /// stops the feeder and the workers and yields a partial report.
    pub async fn run(&self, options: ConversionOptions, cancel: CancellationToken) -> Result<RunReport> {
        let started = Instant::now();
        let options = Arc::new(options.validate()?);

        info!(
            "Converting {:?} -> {:?} ({} to {}, {} workers, quality {})",
            options.source_dir,
            options.target_dir,
            options.source_format,
            options.target_format,
            options.workers,
            options.quality
        );

        tokio::fs::create_dir_all(&options.target_dir)
            .await
            .map_err(|e| ConvertError::io(e, options.target_dir.clone()))?;

        let files = discover_files(&options.source_dir, options.source_format).await?;
        if files.is_empty() {
            return Err(ConvertError::EmptyInput {
                dir: options.source_dir.clone(),
            });
        }

        let total = files.len();
        info!("Found {} files to process", total);
        self.progress.start(total as u64);

        let context = Arc::new(WorkerContext {
            options: Arc::clone(&options),
            resolver: self.resolver.clone(),
            codec: Arc::clone(&self.codec),
            retry: self.retry,
            progress: Arc::clone(&self.progress),
            cancel: cancel.clone(),
        });

        let (sender, queue) = work_queue(options.workers);
        // Room for every outcome, so a worker never waits on the coordinator
        let (results_tx, mut results_rx) = mpsc::channel(total);

        let workers = WorkerPool::new(options.workers).spawn(context, Arc::new(queue), results_tx);

        let jobs: Vec<ConversionJob> = files
            .into_iter()
            .map(|path| ConversionJob::new(path, options.source_format))
            .collect();
        let feeder = tokio::spawn(feed(sender, jobs, cancel.clone()));

        let mut crashed_workers = 0;
        for joined in join_all(workers).await {
            if let Err(e) = joined {
                warn!("Worker task failed: {}", e);
                crashed_workers += 1;
            }
        }

        match feeder.await {
            Ok(enqueued) => debug!("Feeder enqueued {} of {} jobs", enqueued, total),
            Err(e) => warn!("Feeder task failed: {}", e),
        }

        let mut outcomes: Vec<JobOutcome> = Vec::with_capacity(total);
        while let Some(outcome) = results_rx.recv().await {
            outcomes.push(outcome);
        }

        self.progress.finish();
        let mut report = RunReport::from_outcomes(total, outcomes, started.elapsed());
        report.interrupted = cancel.is_cancelled();
        report.crashed_workers = crashed_workers;
        info!("{}", report.summary_line());

        if report.failed_count > 0 {
            let first = report
                .first_error
                .as_ref()
                .map(|failure| format!("{}: {}", failure.path.display(), failure.error))
                .unwrap_or_default();
            return Err(ConvertError::BatchFailed {
                failed: report.failed_count,
                first,
                report: Box::new(report),
            });
        }

        Ok(report)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a conversion with the default pipeline
pub async fn convert_images(options: ConversionOptions, cancel: CancellationToken) -> Result<RunReport> {
    Pipeline::new().run(options, cancel).await
}

/// Cancel `token` on the first Ctrl-C
pub fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            token.cancel();
        }
    })
}

/// List regular files directly inside `dir`, sorted.
///
/// An explicit source format keeps only files with one of its extensions
/// (case-insensitive); `auto` keeps every file.
pub async fn discover_files(dir: &Path, source_format: SourceFormat) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConvertError::io(e, dir))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConvertError::io(e, dir))?
    {
        let path = entry.path();
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }

        let matches = match source_format {
            SourceFormat::Auto => true,
            SourceFormat::Explicit(format) => format.matches_extension(&path),
        };
        if matches {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
