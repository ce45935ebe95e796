//! Analysis worker threads for the scan pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::archive::{ArchiveAnalyzer, ArchiveInfo};
use crate::error::CoreError;

/// One archive dispatched for analysis.
pub struct AnalysisJob {
    pub path: PathBuf,
}

/// Result of analyzing one dispatched archive.
pub struct AnalysisOutcome {
    pub path: PathBuf,
    pub result: Result<ArchiveInfo, CoreError>,
}

/// Spawn the bounded analysis worker pool.
///
/// Workers observe the cancel flag before picking up each job; an analysis
/// already in flight finishes (or observes the flag at its own iteration
/// boundary) rather than being interrupted mid-entry.
pub fn spawn_analysis_workers(
    count: usize,
    analyzer: Arc<ArchiveAnalyzer>,
    rx: Receiver<AnalysisJob>,
    tx: Sender<AnalysisOutcome>,
    cancel: Arc<AtomicBool>,
) -> Vec<thread::JoinHandle<()>> {
    let mut handles = Vec::new();
    let worker_count = count.max(1);

    for _ in 0..worker_count {
        let analyzer = analyzer.clone();
        let rx = rx.clone();
        let tx = tx.clone();
        let cancel = cancel.clone();

        handles.push(thread::spawn(move || {
            for job in rx {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let result = analyzer.analyze_with_cancel(&job.path, Some(&cancel));
                let outcome = AnalysisOutcome {
                    path: job.path,
                    result,
                };
                if tx.send(outcome).is_err() {
                    break;
                }
            }
        }));
    }

    handles
}
