//! Image codec and the single-file conversion step

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageEncoder, ImageOutputFormat};
use tracing::debug;

use crate::config::{ConversionOptions, ImageFormat, DEFAULT_QUALITY};
use crate::error::{ConvertError, ErrorContext, Result};

pub mod formats;
pub mod resize;

pub use formats::*;
pub use resize::*;

/// Decode, resize and encode operations used by the pipeline.
///
/// Calls are blocking; the worker pool runs them on the blocking thread pool.
pub trait ImageCodec: Send + Sync {
    /// Decode the image at `path`
    fn open(&self, path: &Path) -> Result<DynamicImage>;

    /// Shrink to fit `max_width` x `max_height` (0 = unbounded side)
    fn resize(&self, image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage;

    /// Encode into `format`; `quality` only applies to lossy formats
    fn encode(&self, image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>>;
}

/// [`ImageCodec`] backed by the `image` crate
#[derive(Debug, Default, Clone)]
pub struct ImageCrateCodec {
    resizer: ImageResizer,
}

impl ImageCrateCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageCodec for ImageCrateCodec {
    fn open(&self, path: &Path) -> Result<DynamicImage> {
        debug!("Loading image: {:?}", path);

        // Content decides the decoder, not the extension
        let reader = image::io::Reader::open(path)
            .with_file_context(path)?
            .with_guessed_format()
            .with_file_context(path)?;

        reader
            .decode()
            .map_err(|e| ConvertError::from_image(e, path))
    }

    fn resize(&self, image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
        self.resizer.fit(image, max_width, max_height)
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());

        let written = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
                .write_to(&mut buffer, ImageOutputFormat::Jpeg(quality.clamp(1, 100))),
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut buffer,
                    CompressionType::Best,
                    PngFilter::Adaptive,
                );
                if image.color().has_alpha() {
                    let rgba = image.to_rgba8();
                    encoder.write_image(
                        rgba.as_raw(),
                        rgba.width(),
                        rgba.height(),
                        image::ColorType::Rgba8,
                    )
                } else {
                    let rgb = image.to_rgb8();
                    encoder.write_image(
                        rgb.as_raw(),
                        rgb.width(),
                        rgb.height(),
                        image::ColorType::Rgb8,
                    )
                }
            }
            ImageFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut buffer, ImageOutputFormat::Gif),
            ImageFormat::Bmp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut buffer, ImageOutputFormat::Bmp),
            other => return Err(ConvertError::unsupported_format(other.extension(), None)),
        };

        written.map_err(|e| ConvertError::encode(e.to_string(), None))?;
        Ok(buffer.into_inner())
    }
}

/// One conversion attempt: open, optionally resize, encode, write.
///
/// Unsupported targets are rejected before the codec is touched.
pub fn convert_file(
    codec: &dyn ImageCodec,
    source: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> Result<PathBuf> {
    let target = options.target_format;
    if !target.is_supported_target() {
        return Err(ConvertError::unsupported_format(
            target.extension(),
            Some(source.to_path_buf()),
        ));
    }

    let mut image = codec.open(source).with_file_context(source)?;

    if options.resizes() {
        image = codec.resize(
            image,
            u32::try_from(options.max_width).unwrap_or(0),
            u32::try_from(options.max_height).unwrap_or(0),
        );
    }

    let quality = u8::try_from(options.quality)
        .ok()
        .filter(|q| (1..=100).contains(q))
        .unwrap_or(DEFAULT_QUALITY as u8);

    let bytes = codec
        .encode(&image, target, quality)
        .with_file_context(output)?;

    std::fs::write(output, &bytes).with_file_context(output)?;

    debug!(
        "Saved {:?} ({}x{}, {} bytes)",
        output,
        image.width(),
        image.height(),
        bytes.len()
    );

    Ok(output.to_path_buf())
}
