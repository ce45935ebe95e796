//! Shared fixtures for integration tests: tiny encoded rasters and
//! throwaway ZIP archives built with the same crates the library reads
//! them with.

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use peekarc::archive::ArchiveHandlePool;
use peekarc::cache::CacheTiers;
use peekarc::codec::{ImageCodec, build_resize_engine};
use peekarc::config::CacheConfig;

/// Encode a solid-color PNG of the given dimensions.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([120, 40, 200, 255]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

/// Write a ZIP archive with the given entries, stored uncompressed.
pub fn write_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    let opts =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        writer.start_file(*name, opts).expect("start entry");
        writer.write_all(data).expect("write entry");
    }
    writer.finish().expect("finish zip");
}

/// Write an archive whose entries are small valid PNGs.
pub fn write_image_archive(path: &Path, names: &[&str]) {
    let png = png_bytes(4, 4);
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, png.as_slice())).collect();
    write_archive(path, &entries);
}

pub fn small_pool() -> Arc<ArchiveHandlePool> {
    Arc::new(ArchiveHandlePool::with_capacity(
        4,
        Duration::from_millis(500),
    ))
}

pub fn small_tiers() -> Arc<CacheTiers> {
    Arc::new(CacheTiers::new(&CacheConfig {
        image_capacity: 8,
        thumbnail_capacity: 16,
        metadata_capacity: 32,
    }))
}

pub fn quality_codec() -> Arc<ImageCodec> {
    Arc::new(ImageCodec::new(build_resize_engine(false)))
}
