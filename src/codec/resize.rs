//! Resize engines: one interface, two implementations of differing
//! quality/cost, selected once at initialization and transparent to
//! callers.

use image::DynamicImage;
use image::imageops::FilterType;

pub trait ResizeEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Shrink `image` to fit within `width` x `height`, preserving aspect
    /// ratio. Callers guarantee the source is strictly larger than the
    /// bounds.
    fn shrink(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;
}

/// Sampling-based fast path for constrained machines.
pub struct FastResize;

impl ResizeEngine for FastResize {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn shrink(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.thumbnail(width, height)
    }
}

/// Lanczos3 quality path, the default.
pub struct QualityResize;

impl ResizeEngine for QualityResize {
    fn name(&self) -> &'static str {
        "quality"
    }

    fn shrink(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize(width, height, FilterType::Lanczos3)
    }
}

pub fn build_resize_engine(fast: bool) -> Box<dyn ResizeEngine> {
    if fast {
        Box::new(FastResize)
    } else {
        Box::new(QualityResize)
    }
}
