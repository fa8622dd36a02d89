//! Per-run conversion options

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::ImageFormat;
use crate::error::{ConvertError, Result};

/// Quality used when the requested one is outside 1-100
pub const DEFAULT_QUALITY: i32 = 80;

/// Observer invoked once per failed file. Never influences the run.
pub type ErrorCallback = Arc<dyn Fn(&Path, &ConvertError) + Send + Sync>;

/// Declared source format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Sniff every file's header bytes
    Auto,
    /// Only files with this format's extensions are considered
    Explicit(ImageFormat),
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(format) => write!(f, "{}", format),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Self::Auto)
        } else {
            s.parse().map(Self::Explicit)
        }
    }
}

/// Options for one conversion run.
///
/// Built once, validated once by [`ConversionOptions::validate`], then shared
/// read-only by every worker.
#[derive(Clone)]
pub struct ConversionOptions {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub source_format: SourceFormat,
    pub target_format: ImageFormat,
    /// 0 leaves the width unbounded
    pub max_width: i32,
    /// 0 leaves the height unbounded
    pub max_height: i32,
    pub workers: usize,
    pub quality: i32,
    pub skip_existing: bool,
    pub on_error: Option<ErrorCallback>,
}

impl ConversionOptions {
    /// Options with auto-detection, no resizing, 2 workers and quality 80
    pub fn new<S, T>(source_dir: S, target_dir: T, target_format: ImageFormat) -> Self
    where
        S: Into<PathBuf>,
        T: Into<PathBuf>,
    {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            source_format: SourceFormat::Auto,
            target_format,
            max_width: 0,
            max_height: 0,
            workers: crate::config::DEFAULT_WORKERS,
            quality: DEFAULT_QUALITY,
            skip_existing: false,
            on_error: None,
        }
    }

    pub fn source_format(mut self, format: SourceFormat) -> Self {
        self.source_format = format;
        self
    }

    /// Bounding box for resizing; 0 disables a side
    pub fn max_dimensions(mut self, width: i32, height: i32) -> Self {
        self.max_width = width;
        self.max_height = height;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn quality(mut self, quality: i32) -> Self {
        self.quality = quality;
        self
    }

    pub fn skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    /// Attach a per-file error observer
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Path, &ConvertError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Check the options and return the normalized copy.
    ///
    /// Worker count and dimensions are rejected when invalid; an out-of-range
    /// quality is replaced by [`DEFAULT_QUALITY`].
    pub fn validate(mut self) -> Result<Self> {
        if self.workers < 1 {
            return Err(ConvertError::config("Number of workers must be at least 1"));
        }
        if self.max_width < 0 || self.max_height < 0 {
            return Err(ConvertError::config(format!(
                "Invalid dimensions specified: {}x{}",
                self.max_width, self.max_height
            )));
        }
        if !(1..=100).contains(&self.quality) {
            debug!(
                "Quality {} out of range, using {}",
                self.quality, DEFAULT_QUALITY
            );
            self.quality = DEFAULT_QUALITY;
        }
        Ok(self)
    }

    /// Whether any resizing was requested
    pub fn resizes(&self) -> bool {
        self.max_width > 0 || self.max_height > 0
    }

    /// Output location for a source file: `target_dir/<stem>.<ext>`.
    ///
    /// `<ext>` is the canonical extension of the target format, so a `jpeg`
    /// target is written as `.jpg`.
    pub fn output_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.target_dir
            .join(format!("{}.{}", stem, self.target_format.extension()))
    }

    /// Forward a per-file failure to the observer, if any
    pub fn report_error(&self, path: &Path, error: &ConvertError) {
        if let Some(callback) = &self.on_error {
            callback(path, error);
        }
    }
}

impl fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("source_dir", &self.source_dir)
            .field("target_dir", &self.target_dir)
            .field("source_format", &self.source_format)
            .field("target_format", &self.target_format)
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("workers", &self.workers)
            .field("quality", &self.quality)
            .field("skip_existing", &self.skip_existing)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
