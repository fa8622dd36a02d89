//! Fixed-size worker pool draining the work queue

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConversionOptions;
use crate::error::ConvertError;
use crate::processing::{convert_file, FormatResolver, ImageCodec};

pub mod job;
pub mod progress;
pub mod queue;
pub mod retry;

pub use job::*;
pub use progress::*;
pub use queue::*;
pub use retry::*;

/// State shared read-only by every worker of a run
pub struct WorkerContext {
    pub options: Arc<ConversionOptions>,
    pub resolver: FormatResolver,
    pub codec: Arc<dyn ImageCodec>,
    pub retry: RetryPolicy,
    pub progress: Arc<ProgressTracker>,
    pub cancel: CancellationToken,
}

impl WorkerContext {
    /// Run the per-file pipeline for one job.
    ///
    /// Order: resolve the source format, short-circuit when it already is
    /// the target, honour skip-existing, then convert. Resolution and
    /// conversion each run under the retry policy, so a failed header read
    /// is retried while an unrecognised header fails on its first attempt.
    pub async fn process(&self, job: &ConversionJob) -> ConversionOutcome {
        let source = job.source();
        let declared = job.declared_format();
        let resolver = &self.resolver;

        let format = match self
            .retry
            .run(&self.cancel, |_| resolver.resolve(source, declared))
            .await
        {
            RetryOutcome::Succeeded { value, .. } => value,
            RetryOutcome::Failed { error, attempts } => {
                return ConversionOutcome::Failed { error, attempts }
            }
            RetryOutcome::Cancelled { .. } => return ConversionOutcome::Cancelled,
        };

        if format == self.options.target_format {
            debug!("{:?} is already {}", source, format);
            return ConversionOutcome::Skipped(SkipReason::AlreadyTargetFormat);
        }

        let output = self.options.output_path(source);

        if self.options.skip_existing && tokio::fs::try_exists(&output).await.unwrap_or(false) {
            debug!("Output {:?} exists, skipping", output);
            return ConversionOutcome::Skipped(SkipReason::Exists);
        }

        let outcome = self
            .retry
            .run(&self.cancel, |attempt| {
                let codec = Arc::clone(&self.codec);
                let options = Arc::clone(&self.options);
                let source = source.to_path_buf();
                let output = output.clone();

                async move {
                    if attempt > 0 {
                        debug!("Retrying {:?} (attempt {})", source, attempt + 1);
                    }
                    match tokio::task::spawn_blocking(move || {
                        convert_file(codec.as_ref(), &source, &output, &options)
                    })
                    .await
                    {
                        Ok(result) => result,
                        Err(e) => Err(ConvertError::encode(
                            format!("Conversion task failed: {}", e),
                            None,
                        )),
                    }
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => ConversionOutcome::Converted {
                output: value,
                attempts,
            },
            RetryOutcome::Failed { error, attempts } => ConversionOutcome::Failed { error, attempts },
            RetryOutcome::Cancelled { .. } => ConversionOutcome::Cancelled,
        }
    }
}

/// Pool of `size` workers; at most `size` codec calls run at once.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// `size` is raised to at least one
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Start the workers. Each handle resolves to the number of jobs that
    /// worker finished.
    pub fn spawn(
        &self,
        context: Arc<WorkerContext>,
        queue: Arc<WorkQueue<ConversionJob>>,
        results: mpsc::Sender<JobOutcome>,
    ) -> Vec<JoinHandle<usize>> {
        (0..self.size)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&context),
                    Arc::clone(&queue),
                    results.clone(),
                ))
            })
            .collect()
    }
}

async fn run_worker(
    id: usize,
    context: Arc<WorkerContext>,
    queue: Arc<WorkQueue<ConversionJob>>,
    results: mpsc::Sender<JobOutcome>,
) -> usize {
    let mut processed = 0;

    while let Some(job) = queue.pull(&context.cancel).await {
        let outcome = context.process(&job).await;
        let source: PathBuf = job.source().to_path_buf();

        if let ConversionOutcome::Failed { error, attempts } = &outcome {
            warn!("Error processing {:?} after {} attempt(s): {}", source, attempts, error);
            context.options.report_error(&source, error);
        }

        context.progress.record(source.clone(), outcome.kind());
        processed += 1;

        if results.send(JobOutcome { source, outcome }).await.is_err() {
            debug!("Worker {}: result stream closed", id);
            break;
        }
    }

    debug!("Worker {} exiting after {} job(s)", id, processed);
    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageFormat, SourceFormat};
    use crate::error::Result;
    use crate::processing::FormatSniffer;
    use image::DynamicImage;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Codec that sleeps inside `open` and records peak concurrency
    #[derive(Default)]
    struct SlowCodec {
        active: AtomicUsize,
        peak: AtomicUsize,
        opened: AtomicUsize,
    }

    impl ImageCodec for SlowCodec {
        fn open(&self, _path: &Path) -> Result<DynamicImage> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(DynamicImage::new_rgb8(2, 2))
        }

        fn resize(&self, image: DynamicImage, _: u32, _: u32) -> DynamicImage {
            image
        }

        fn encode(&self, _: &DynamicImage, _: ImageFormat, _: u8) -> Result<Vec<u8>> {
            Ok(vec![0u8; 4])
        }
    }

    struct AlwaysPng;

    impl FormatSniffer for AlwaysPng {
        fn classify(&self, _header: &[u8]) -> Option<&'static str> {
            Some("png")
        }
    }

    fn context(dir: &TempDir, codec: Arc<dyn ImageCodec>, workers: usize) -> Arc<WorkerContext> {
        let options = ConversionOptions::new(dir.path(), dir.path().join("out"), ImageFormat::Jpeg)
            .workers(workers);
        std::fs::create_dir_all(&options.target_dir).unwrap();

        Arc::new(WorkerContext {
            options: Arc::new(options),
            resolver: FormatResolver::new(Arc::new(AlwaysPng)),
            codec,
            retry: RetryPolicy::default(),
            progress: Arc::new(ProgressTracker::new()),
            cancel: CancellationToken::new(),
        })
    }

    fn jobs(dir: &TempDir, count: usize) -> Vec<ConversionJob> {
        (0..count)
            .map(|i| {
                let path = dir.path().join(format!("img{}.png", i));
                std::fs::write(&path, b"fake").unwrap();
                ConversionJob::new(path, SourceFormat::Auto)
            })
            .collect()
    }

    struct Unrecognised;

    impl FormatSniffer for Unrecognised {
        fn classify(&self, _header: &[u8]) -> Option<&'static str> {
            None
        }
    }

    fn context_with_sniffer(dir: &TempDir, sniffer: Arc<dyn FormatSniffer>) -> WorkerContext {
        WorkerContext {
            options: Arc::new(ConversionOptions::new(
                dir.path(),
                dir.path().join("out"),
                ImageFormat::Jpeg,
            )),
            resolver: FormatResolver::new(sniffer),
            codec: Arc::new(SlowCodec::default()),
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            progress: Arc::new(ProgressTracker::new()),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_header_read_failure_is_retried() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_sniffer(&dir, Arc::new(AlwaysPng));
        let job = ConversionJob::new(dir.path().join("vanished.png"), SourceFormat::Auto);

        match ctx.process(&job).await {
            ConversionOutcome::Failed { error, attempts } => {
                assert!(matches!(error, ConvertError::Io { .. }));
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrecognised_header_fails_once() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_sniffer(&dir, Arc::new(Unrecognised));
        let path = dir.path().join("mystery.bin");
        std::fs::write(&path, b"????").unwrap();
        let job = ConversionJob::new(path, SourceFormat::Auto);

        match ctx.process(&job).await {
            ConversionOutcome::Failed { error, attempts } => {
                assert!(matches!(error, ConvertError::UnknownFormat { .. }));
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_resolution() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with_sniffer(&dir, Arc::new(AlwaysPng));
        ctx.cancel.cancel();
        let job = ConversionJob::new(dir.path().join("a.png"), SourceFormat::Auto);

        assert!(matches!(ctx.process(&job).await, ConversionOutcome::Cancelled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_concurrency() {
        let dir = TempDir::new().unwrap();
        let codec = Arc::new(SlowCodec::default());
        let ctx = context(&dir, codec.clone(), 2);

        let (sender, queue) = work_queue(2);
        let (results_tx, mut results_rx) = mpsc::channel(16);

        let handles = WorkerPool::new(2).spawn(ctx.clone(), Arc::new(queue), results_tx);
        let enqueued = feed(sender, jobs(&dir, 8), ctx.cancel.clone()).await;

        let processed: usize = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|h| h.unwrap())
            .sum();

        let mut outcomes = Vec::new();
        while let Some(outcome) = results_rx.recv().await {
            outcomes.push(outcome);
        }

        assert_eq!(enqueued, 8);
        assert_eq!(processed, 8);
        assert_eq!(outcomes.len(), 8);
        assert_eq!(codec.opened.load(Ordering::SeqCst), 8);
        assert!(codec.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_process_short_circuits_target_format() {
        let dir = TempDir::new().unwrap();
        let codec = Arc::new(SlowCodec::default());
        let ctx = context(&dir, codec.clone(), 1);

        let path = dir.path().join("already.jpg");
        std::fs::write(&path, b"x").unwrap();
        let job = ConversionJob::new(path, SourceFormat::Explicit(ImageFormat::Jpeg));

        let outcome = ctx.process(&job).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::AlreadyTargetFormat));
        assert_eq!(codec.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_process_skips_existing_output() {
        let dir = TempDir::new().unwrap();
        let codec = Arc::new(SlowCodec::default());
        let base = context(&dir, codec.clone(), 1);
        let ctx = WorkerContext {
            options: Arc::new((*base.options).clone().skip_existing(true)),
            resolver: base.resolver.clone(),
            codec: base.codec.clone(),
            retry: base.retry,
            progress: base.progress.clone(),
            cancel: base.cancel.clone(),
        };

        let job = jobs(&dir, 1).remove(0);
        std::fs::write(ctx.options.output_path(job.source()), b"old").unwrap();

        let outcome = ctx.process(&job).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::Exists));
        assert_eq!(codec.opened.load(Ordering::SeqCst), 0);
    }
}
