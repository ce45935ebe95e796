//! # Image Codec
//!
//! Decodes raw entry bytes into raster pixels, corrects embedded
//! orientation before any resizing, and produces aspect-preserving
//! thumbnails through a resize engine selected once at startup.

pub mod resize;
pub mod signature;

use std::io::Cursor;

use image::{DynamicImage, ImageDecoder, ImageReader, metadata::Orientation};

use crate::error::CoreError;

pub use resize::{ResizeEngine, build_resize_engine};

// Accounting overhead added to the pixel estimate for each decoded buffer.
const RASTER_OVERHEAD_BYTES: usize = 1024;

/// A decoded, orientation-corrected raster plus the source dimensions it
/// was decoded from (before any thumbnail fit).
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub pixels: DynamicImage,
    pub source_width: u32,
    pub source_height: u32,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Byte estimate used for cache accounting.
    pub fn weight(&self) -> usize {
        let channels = self.pixels.color().channel_count() as usize;
        let bytes_per_channel = self.pixels.color().bytes_per_pixel() as usize / channels.max(1);
        self.width() as usize * self.height() as usize * channels * bytes_per_channel
            + RASTER_OVERHEAD_BYTES
    }
}

pub struct ImageCodec {
    resize: Box<dyn ResizeEngine>,
}

impl ImageCodec {
    pub fn new(resize: Box<dyn ResizeEngine>) -> Self {
        Self { resize }
    }

    pub fn engine_name(&self) -> &'static str {
        self.resize.name()
    }

    /// Decode raw bytes into an orientation-corrected raster.
    ///
    /// Truncated or corrupt streams come back as `CorruptEntry`; nothing
    /// in this path panics on untrusted input.
    pub fn decode(&self, bytes: &[u8]) -> Result<RasterImage, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::CorruptEntry("empty image data".to_string()));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CoreError::CorruptEntry(e.to_string()))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| CoreError::CorruptEntry(e.to_string()))?;
        let orientation = decoder
            .orientation()
            .unwrap_or(Orientation::NoTransforms);
        let mut pixels = DynamicImage::from_decoder(decoder)
            .map_err(|e| CoreError::CorruptEntry(e.to_string()))?;
        pixels.apply_orientation(orientation);

        let (source_width, source_height) = (pixels.width(), pixels.height());
        Ok(RasterImage {
            pixels,
            source_width,
            source_height,
        })
    }

    /// Fit a raster within `target` bounds, preserving aspect ratio and
    /// never upscaling. Orientation was already applied during decode.
    pub fn thumbnail(&self, raster: &RasterImage, target: (u32, u32)) -> RasterImage {
        let (max_w, max_h) = (target.0.max(1), target.1.max(1));
        if raster.width() <= max_w && raster.height() <= max_h {
            return raster.clone();
        }
        let pixels = self.resize.shrink(&raster.pixels, max_w, max_h);
        RasterImage {
            pixels,
            source_width: raster.source_width,
            source_height: raster.source_height,
        }
    }

    /// Cheap signature check: does this byte stream start like a raster
    /// format we can decode?
    pub fn validate(bytes: &[u8]) -> bool {
        image::guess_format(bytes).is_ok()
    }
}
