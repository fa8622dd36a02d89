//! Error types and handling for FastConvert

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::RunReport;

/// Result type alias for FastConvert operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Main error type for FastConvert operations
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Invalid options; aborts a run before any work starts
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Source directory holds no matching files
    #[error("No matching files found in source directory {dir:?}")]
    EmptyInput { dir: PathBuf },

    /// I/O related errors
    #[error("I/O error: {source} (file: {path:?})")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// Header bytes could not be classified
    #[error("Unknown image format: {detail} (file: {file:?})")]
    UnknownFormat {
        detail: String,
        file: Option<PathBuf>,
    },

    /// Format is recognised but cannot be converted
    #[error("Unsupported image format: {format} (file: {file:?})")]
    UnsupportedFormat {
        format: String,
        file: Option<PathBuf>,
    },

    /// Encoding or writing the converted image failed
    #[error("Failed to save image: {message} (file: {file:?})")]
    Encode {
        message: String,
        file: Option<PathBuf>,
    },

    /// Decoding errors reported by the image crate
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    SerdeError(String),

    /// Aggregate error for a run where at least one file failed
    #[error("Encountered {failed} errors during conversion: {first}")]
    BatchFailed {
        failed: usize,
        first: String,
        report: Box<RunReport>,
    },
}

impl ConvertError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error tied to a path
    pub fn io<P: Into<PathBuf>>(source: std::io::Error, path: P) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create a new unknown format error
    pub fn unknown_format<S: Into<String>>(detail: S, file: Option<PathBuf>) -> Self {
        Self::UnknownFormat {
            detail: detail.into(),
            file,
        }
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S, file: Option<PathBuf>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
            file,
        }
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(message: S, file: Option<PathBuf>) -> Self {
        Self::Encode {
            message: message.into(),
            file,
        }
    }

    /// Map an image crate error onto the taxonomy, keeping the path when the
    /// underlying failure was plain I/O.
    pub fn from_image(err: image::ImageError, path: &Path) -> Self {
        match err {
            image::ImageError::IoError(source) => Self::io(source, path),
            image::ImageError::Unsupported(e) => {
                Self::unsupported_format(e.to_string(), Some(path.to_path_buf()))
            }
            other => Self::Image(other),
        }
    }

    /// Whether another attempt at the same file could succeed.
    ///
    /// Format problems are permanent; I/O, decode and encode failures may be
    /// transient (disk pressure, files still being written).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::Encode { .. } | Self::Image(_) => true,

            Self::UnknownFormat { .. }
            | Self::UnsupportedFormat { .. }
            | Self::Config { .. }
            | Self::EmptyInput { .. }
            | Self::SerdeError(_)
            | Self::BatchFailed { .. } => false,
        }
    }

    /// Get the associated file path if available
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } => path.as_deref(),
            Self::UnknownFormat { file, .. }
            | Self::UnsupportedFormat { file, .. }
            | Self::Encode { file, .. } => file.as_deref(),
            Self::EmptyInput { dir } => Some(dir),
            _ => None,
        }
    }

    /// Report attached to an aggregate failure
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::BatchFailed { report, .. } => Some(report.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl From<toml::de::Error> for ConvertError {
    fn from(err: toml::de::Error) -> Self {
        Self::SerdeError(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_yaml::Error> for ConvertError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerdeError(format!("YAML parsing error: {}", err))
    }
}

/// Error context extension for adding file path information
pub trait ErrorContext<T> {
    /// Add file context to an error
    fn with_file_context(self, file: &Path) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<ConvertError>,
{
    fn with_file_context(self, file: &Path) -> Result<T> {
        self.map_err(|e| {
            let mut error = e.into();

            match &mut error {
                ConvertError::Io { path: f, .. }
                | ConvertError::UnknownFormat { file: f, .. }
                | ConvertError::UnsupportedFormat { file: f, .. }
                | ConvertError::Encode { file: f, .. } => {
                    if f.is_none() {
                        *f = Some(file.to_path_buf());
                    }
                }
                _ => {}
            }

            error
        })
    }
}
