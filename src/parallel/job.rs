//! Jobs and their terminal outcomes

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{ImageFormat, SourceFormat};
use crate::error::ConvertError;

/// One file's conversion request, pulled from the queue by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    source: PathBuf,
    resolved_format: Option<ImageFormat>,
}

impl ConversionJob {
    /// Jobs for an explicit source format start out resolved
    pub fn new(source: PathBuf, declared: SourceFormat) -> Self {
        let resolved_format = match declared {
            SourceFormat::Auto => None,
            SourceFormat::Explicit(format) => Some(format),
        };
        Self {
            source,
            resolved_format,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Declaration to hand to the format resolver
    pub fn declared_format(&self) -> SourceFormat {
        self.resolved_format
            .map_or(SourceFormat::Auto, SourceFormat::Explicit)
    }
}

/// Why a job produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Output file already present and skip-existing is on
    Exists,
    /// Source is already encoded in the target format
    AlreadyTargetFormat,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => f.write_str("exists"),
            Self::AlreadyTargetFormat => f.write_str("already-target-format"),
        }
    }
}

/// Terminal result of processing one job
#[derive(Debug)]
pub enum ConversionOutcome {
    Converted { output: PathBuf, attempts: u32 },
    Skipped(SkipReason),
    Failed { error: ConvertError, attempts: u32 },
    /// Abandoned because the run was cancelled
    Cancelled,
}

/// Coarse classification of an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Converted,
    Skipped,
    Failed,
    Cancelled,
}

impl ConversionOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Converted { .. } => OutcomeKind::Converted,
            Self::Skipped(_) => OutcomeKind::Skipped,
            Self::Failed { .. } => OutcomeKind::Failed,
            Self::Cancelled => OutcomeKind::Cancelled,
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// An outcome tagged with the file it belongs to
#[derive(Debug)]
pub struct JobOutcome {
    pub source: PathBuf,
    pub outcome: ConversionOutcome,
}
