//! End-to-end scan pipeline tests over real temporary archives.

mod common;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use peekarc::archive::AnalysisLimits;
use peekarc::error::ErrorKind;
use peekarc::scan::events::{ScanEvent, ScanOutcome, ScanSummary};
use peekarc::scan::{ScanCoordinator, ScanOptions, ScanState};

fn test_options() -> ScanOptions {
    ScanOptions {
        workers: 2,
        batch_size: 2,
        flush_interval: Duration::from_millis(50),
        progress_every: 1,
        archive_extensions: vec!["zip".to_string(), "cbz".to_string()],
    }
}

struct CollectedScan {
    archives: Vec<std::path::PathBuf>,
    failures: Vec<(std::path::PathBuf, ErrorKind)>,
    batches_after_finish: usize,
    summary: ScanSummary,
}

fn run_to_completion(coordinator: &ScanCoordinator, root: &Path) -> CollectedScan {
    let (handle, events) = coordinator.start(root);
    collect_events(handle, events)
}

fn collect_events(
    handle: peekarc::scan::ScanHandle,
    events: crossbeam_channel::Receiver<ScanEvent>,
) -> CollectedScan {
    let mut archives = Vec::new();
    let mut failures = Vec::new();
    let mut summary = None;
    let mut batches_after_finish = 0usize;

    for event in events.iter() {
        match event {
            ScanEvent::Batch(batch) => {
                if summary.is_some() {
                    batches_after_finish += 1;
                }
                archives.extend(batch.archives.into_iter().map(|a| a.path));
                failures.extend(batch.failures.into_iter().map(|f| (f.path, f.kind)));
            }
            ScanEvent::Progress(_) => {}
            ScanEvent::Finished(s) => {
                summary = Some(s);
            }
        }
    }
    handle.wait();

    CollectedScan {
        archives,
        failures,
        batches_after_finish,
        summary: summary.expect("terminal summary"),
    }
}

#[test]
fn mixed_directory_scan_reports_validity_split() {
    let dir = tempfile::tempdir().expect("tempdir");
    for i in 0..3 {
        common::write_image_archive(
            &dir.path().join(format!("valid{i}.zip")),
            &["img1.png", "img2.png"],
        );
    }
    let png = common::png_bytes(4, 4);
    common::write_archive(
        &dir.path().join("mixed0.zip"),
        &[("a.png", png.as_slice()), ("notes.txt", b"hello")],
    );
    common::write_archive(
        &dir.path().join("mixed1.zip"),
        &[("readme.md", b"# nope")],
    );

    let tiers = common::small_tiers();
    let coordinator = ScanCoordinator::new(
        common::small_pool(),
        tiers.clone(),
        AnalysisLimits::default(),
        test_options(),
    );
    let scan = run_to_completion(&coordinator, dir.path());

    assert_eq!(scan.summary.outcome, ScanOutcome::Completed);
    assert_eq!(scan.summary.processed, 5);
    assert_eq!(scan.summary.total, 5);
    assert_eq!(scan.summary.valid, 3);
    assert_eq!(scan.summary.failed, 2);

    assert_eq!(scan.failures.len(), 2);
    assert!(
        scan.failures
            .iter()
            .all(|(_, kind)| *kind == ErrorKind::InvalidArchive)
    );

    // Every dispatched archive appears exactly once across all batches.
    let seen: HashSet<_> = scan
        .archives
        .iter()
        .chain(scan.failures.iter().map(|(p, _)| p))
        .collect();
    assert_eq!(seen.len(), 5);
    assert_eq!(scan.archives.len() + scan.failures.len(), 5);

    // Valid metadata was warmed into the metadata tier.
    assert_eq!(tiers.metadata.len(), 3);
}

#[test]
fn cancellation_before_dispatch_yields_canceled_terminal() {
    let dir = tempfile::tempdir().expect("tempdir");
    for i in 0..10 {
        common::write_image_archive(&dir.path().join(format!("a{i}.zip")), &["x.png"]);
    }

    let coordinator = ScanCoordinator::new(
        common::small_pool(),
        common::small_tiers(),
        AnalysisLimits::default(),
        test_options(),
    );

    let cancel = Arc::new(AtomicBool::new(true));
    let (handle, events) = coordinator.start_with_cancel(dir.path(), cancel);
    let scan = collect_events(handle, events);

    assert_eq!(scan.summary.outcome, ScanOutcome::Canceled);
    assert_eq!(scan.summary.processed, 0);
    assert!(scan.archives.is_empty());
    assert!(scan.failures.is_empty());
    assert_eq!(scan.batches_after_finish, 0);
}

#[test]
fn cancel_mid_scan_stops_further_batches() {
    let dir = tempfile::tempdir().expect("tempdir");
    let names: Vec<String> = (0..6).map(|i| format!("img{i}.png")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    for i in 0..200 {
        common::write_image_archive(&dir.path().join(format!("a{i:03}.zip")), &name_refs);
    }

    let coordinator = ScanCoordinator::new(
        common::small_pool(),
        common::small_tiers(),
        AnalysisLimits::default(),
        test_options(),
    );

    let (handle, events) = coordinator.start(dir.path());
    let mut summary = None;
    let mut saw_batch_after_finish = false;
    let mut canceled = false;
    for event in events.iter() {
        match event {
            ScanEvent::Batch(_) | ScanEvent::Progress(_) => {
                if summary.is_some() {
                    saw_batch_after_finish = true;
                }
                if !canceled {
                    handle.cancel();
                    canceled = true;
                }
            }
            ScanEvent::Finished(s) => summary = Some(s),
        }
    }
    handle.wait();

    let summary = summary.expect("terminal summary");
    assert_eq!(summary.outcome, ScanOutcome::Canceled);
    assert!(!saw_batch_after_finish);
    assert!(summary.processed <= 200);
}

#[test]
fn unreadable_root_fails_the_scan() {
    let coordinator = ScanCoordinator::new(
        common::small_pool(),
        common::small_tiers(),
        AnalysisLimits::default(),
        test_options(),
    );
    let (handle, events) = coordinator.start(Path::new("/definitely/not/here"));
    let scan = collect_events(handle, events);

    assert_eq!(scan.summary.outcome, ScanOutcome::Failed);
    assert!(scan.summary.error.is_some());
}

#[test]
fn empty_root_completes_with_zero_totals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let coordinator = ScanCoordinator::new(
        common::small_pool(),
        common::small_tiers(),
        AnalysisLimits::default(),
        test_options(),
    );
    let scan = run_to_completion(&coordinator, dir.path());

    assert_eq!(scan.summary.outcome, ScanOutcome::Completed);
    assert_eq!(scan.summary.total, 0);
    assert_eq!(scan.summary.processed, 0);
}

#[test]
fn handle_state_reaches_terminal() {
    let dir = tempfile::tempdir().expect("tempdir");
    common::write_image_archive(&dir.path().join("one.zip"), &["x.png"]);

    let coordinator = ScanCoordinator::new(
        common::small_pool(),
        common::small_tiers(),
        AnalysisLimits::default(),
        test_options(),
    );
    let (handle, events) = coordinator.start(dir.path());
    for event in events.iter() {
        if matches!(event, ScanEvent::Finished(_)) {
            break;
        }
    }
    // Receiver still open; coordinator already sent the terminal event.
    while handle.state() == ScanState::Scanning {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(handle.state(), ScanState::Completed);
    handle.wait();
}
