//! Analyzer edge cases that need richer archive fixtures than the unit
//! tests build.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use peekarc::archive::{AnalysisLimits, ArchiveAnalyzer, ArchiveHandlePool};
use peekarc::error::ErrorKind;

fn analyzer() -> ArchiveAnalyzer {
    let pool = Arc::new(ArchiveHandlePool::with_capacity(
        4,
        Duration::from_millis(500),
    ));
    ArchiveAnalyzer::new(pool, AnalysisLimits::default())
}

#[test]
fn directory_entry_invalidates_archive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dirs.zip");

    let file = std::fs::File::create(&path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    let opts =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.add_directory("chapter1/", opts).expect("dir entry");
    writer.start_file("chapter1/img1.png", opts).expect("entry");
    writer
        .write_all(common::png_bytes(4, 4).as_slice())
        .expect("write");
    writer.finish().expect("finish");

    let err = analyzer().analyze(&path).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidArchive);
    assert!(err.to_string().contains("directory"));
}

#[test]
fn subdirectory_image_paths_are_fine_without_dir_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("flat.zip");
    common::write_image_archive(&path, &["vol1/img2.png", "vol1/img10.png", "vol1/img1.png"]);

    let info = analyzer().analyze(&path).expect("valid");
    assert_eq!(
        info.entries,
        vec!["vol1/img1.png", "vol1/img2.png", "vol1/img10.png"]
    );
}

#[test]
fn reanalysis_supersedes_with_fresh_timestamp() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("a.zip");
    common::write_image_archive(&path, &["img1.png"]);

    let analyzer = analyzer();
    let first = analyzer.analyze(&path).expect("first");
    let second = analyzer.analyze(&path).expect("second");
    assert!(second.analyzed_at >= first.analyzed_at);
    assert_eq!(first.entries, second.entries);
}
