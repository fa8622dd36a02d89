//! Format sniffing and source-format resolution

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::{ImageFormat, SourceFormat};
use crate::error::{ConvertError, ErrorContext, Result};

/// Number of header bytes handed to a sniffer
pub const HEADER_LEN: usize = 261;

/// Classifies a file from its leading bytes.
pub trait FormatSniffer: Send + Sync {
    /// Returns a format tag such as `"png"`, or `None` when unrecognised.
    ///
    /// The tag may name a non-image type; the resolver decides whether it is
    /// usable.
    fn classify(&self, header: &[u8]) -> Option<&'static str>;
}

/// Magic-byte sniffer backed by the `infer` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct InferSniffer;

impl FormatSniffer for InferSniffer {
    fn classify(&self, header: &[u8]) -> Option<&'static str> {
        infer::get(header).map(|kind| kind.extension())
    }
}

/// Decides the source format of a file.
#[derive(Clone)]
pub struct FormatResolver {
    sniffer: Arc<dyn FormatSniffer>,
}

impl FormatResolver {
    pub fn new(sniffer: Arc<dyn FormatSniffer>) -> Self {
        Self { sniffer }
    }

    /// Resolve `path`'s format.
    ///
    /// An explicit declaration is trusted as-is. With [`SourceFormat::Auto`]
    /// the first [`HEADER_LEN`] bytes are sniffed; an unrecognised header or
    /// a recognised but non-image type is an `UnknownFormat` error.
    pub async fn resolve(&self, path: &Path, declared: SourceFormat) -> Result<ImageFormat> {
        let SourceFormat::Explicit(format) = declared else {
            let header = read_header(path).await?;
            return self.classify(path, &header);
        };
        Ok(format)
    }

    fn classify(&self, path: &Path, header: &[u8]) -> Result<ImageFormat> {
        let tag = self.sniffer.classify(header).ok_or_else(|| {
            ConvertError::unknown_format("unrecognised file header", Some(path.to_path_buf()))
        })?;

        let format = ImageFormat::from_tag(tag).ok_or_else(|| {
            ConvertError::unknown_format(
                format!("unsupported detected type '{}'", tag),
                Some(path.to_path_buf()),
            )
        })?;

        debug!("Detected {} for {:?}", format, path);
        Ok(format)
    }
}

impl Default for FormatResolver {
    fn default() -> Self {
        Self::new(Arc::new(InferSniffer))
    }
}

/// Read up to [`HEADER_LEN`] leading bytes; shorter files yield what exists.
pub async fn read_header(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).await.with_file_context(path)?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .await
        .with_file_context(path)?;
    Ok(header)
}
