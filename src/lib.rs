//! FastConvert - Concurrent Batch Image Converter
//!
//! Converts every image in a directory into another format, optionally
//! shrinking it to fit a bounding box, using a fixed pool of workers.
//!
//! # Features
//!
//! - **Bounded Parallelism**: a fixed worker pool caps concurrent decodes
//! - **Retries**: transient failures are retried with linear backoff
//! - **Cancellation**: Ctrl-C stops the run and still yields a report
//! - **Format Detection**: source formats sniffed from magic bytes
//! - **Targets**: JPEG, PNG, GIF, BMP
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fastconvert::{convert_images, ConversionOptions, ImageFormat};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> fastconvert::Result<()> {
//! let options = ConversionOptions::new("photos", "converted", ImageFormat::Jpeg)
//!     .max_dimensions(1920, 0)
//!     .quality(85)
//!     .workers(4);
//!
//! let report = convert_images(options, CancellationToken::new()).await?;
//! println!("{}", report.summary_line());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod parallel;
pub mod pipeline;
pub mod processing;

// Re-export commonly used types
pub use config::{ConversionOptions, ImageFormat, LoggingConfig, Settings, SourceFormat};
pub use error::{ConvertError, Result};
pub use parallel::{ConversionOutcome, ProgressTracker, ProgressUpdate, RetryPolicy, SkipReason};
pub use pipeline::{cancel_on_interrupt, convert_images, FailureSummary, Pipeline, RunReport};
pub use processing::{FormatSniffer, ImageCodec, ImageCrateCodec, InferSniffer};

use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level`. Output goes to stderr so stdout
/// stays free for `--json` reports. Only the first call installs anything.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if installed.is_ok() {
        debug!("FastConvert v{} logging initialized", VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_init_logging_twice() {
        let config = LoggingConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
