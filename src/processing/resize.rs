//! Aspect-preserving downscaling

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Largest size for a `width` x `height` image that fits the bounding box.
///
/// A bound of 0 leaves that side unconstrained. Images already inside the box
/// keep their size; aspect ratio is always preserved and no side drops below
/// one pixel.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let scale_for = |bound: u32, side: u32| {
        if bound == 0 {
            f64::INFINITY
        } else {
            f64::from(bound) / f64::from(side)
        }
    };

    let scale = scale_for(max_width, width)
        .min(scale_for(max_height, height))
        .min(1.0);

    if scale >= 1.0 {
        return (width, height);
    }

    let new_width = (f64::from(width) * scale).round() as u32;
    let new_height = (f64::from(height) * scale).round() as u32;
    (new_width.max(1), new_height.max(1))
}

/// High-quality image resizer
#[derive(Debug, Clone, Copy)]
pub struct ImageResizer {
    filter: FilterType,
}

impl ImageResizer {
    /// Lanczos3 resampling
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }

    /// Shrink `image` to fit the bounding box, see [`fit_within`]
    pub fn fit(&self, image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
        let (target_width, target_height) =
            fit_within(image.width(), image.height(), max_width, max_height);

        if target_width == image.width() && target_height == image.height() {
            return image;
        }

        debug!(
            "Resizing {}x{} -> {}x{} using {:?}",
            image.width(),
            image.height(),
            target_width,
            target_height,
            self.filter
        );

        image.resize_exact(target_width, target_height, self.filter)
    }
}

impl Default for ImageResizer {
    fn default() -> Self {
        Self::new()
    }
}
