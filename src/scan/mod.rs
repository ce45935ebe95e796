//! # Scan Module
//!
//! Orchestrates directory scanning: enumerate archive files under a root,
//! dispatch analysis across a bounded worker pool, and deliver batched
//! results, rate-limited progress, and a terminal summary to the consumer
//! over a channel. The consumer thread is never blocked by scan work.

pub mod events;
pub mod workers;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::archive::{AnalysisLimits, ArchiveAnalyzer, ArchiveHandlePool};
use crate::cache::CacheTiers;
use crate::config::Config;
use crate::error::CoreError;

use events::{ArchiveFailure, ScanBatch, ScanEvent, ScanOutcome, ScanProgress, ScanSummary};
use workers::{AnalysisJob, AnalysisOutcome, spawn_analysis_workers};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Scan lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Completed,
    Canceled,
    Failed,
}

/// Tuning for one coordinator instance.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub workers: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub progress_every: usize,
    pub archive_extensions: Vec<String>,
}

impl ScanOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            workers: cfg.worker_count(),
            batch_size: cfg.scan.batch_size.max(1),
            flush_interval: cfg.flush_interval(),
            progress_every: cfg.scan.progress_every.max(1),
            archive_extensions: cfg.archive_extensions.clone(),
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: crate::util::default_worker_count(),
            batch_size: 50,
            flush_interval: Duration::from_millis(200),
            progress_every: 20,
            archive_extensions: vec!["zip".to_string(), "cbz".to_string()],
        }
    }
}

/// Handle to a running scan: cooperative cancellation plus state queries.
pub struct ScanHandle {
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<ScanState>>,
    join: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request cancellation. In-flight analyses observe the flag at their
    /// next iteration boundary; no new archives are dispatched.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the coordinator thread finishes.
    pub fn wait(mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Drives many per-archive analyses in parallel and reports to a consumer
/// channel without ever blocking it.
pub struct ScanCoordinator {
    pool: Arc<ArchiveHandlePool>,
    tiers: Arc<CacheTiers>,
    limits: AnalysisLimits,
    options: ScanOptions,
}

impl ScanCoordinator {
    pub fn new(
        pool: Arc<ArchiveHandlePool>,
        tiers: Arc<CacheTiers>,
        limits: AnalysisLimits,
        options: ScanOptions,
    ) -> Self {
        Self {
            pool,
            tiers,
            limits,
            options,
        }
    }

    /// Start a scan with an internally owned cancel flag.
    pub fn start(&self, root: &Path) -> (ScanHandle, Receiver<ScanEvent>) {
        self.start_with_cancel(root, Arc::new(AtomicBool::new(false)))
    }

    /// Start a scan with an externally shared cancel flag (e.g. wired to a
    /// Ctrl+C handler).
    pub fn start_with_cancel(
        &self,
        root: &Path,
        cancel: Arc<AtomicBool>,
    ) -> (ScanHandle, Receiver<ScanEvent>) {
        let (event_tx, event_rx) = bounded::<ScanEvent>(EVENT_CHANNEL_CAPACITY);
        let state = Arc::new(Mutex::new(ScanState::Scanning));

        let runner = ScanRunner {
            root: root.to_path_buf(),
            analyzer: Arc::new(ArchiveAnalyzer::new(self.pool.clone(), self.limits)),
            tiers: self.tiers.clone(),
            options: self.options.clone(),
            cancel: cancel.clone(),
            state: state.clone(),
            event_tx,
        };
        let join = thread::spawn(move || runner.run());

        (
            ScanHandle {
                cancel,
                state,
                join: Some(join),
            },
            event_rx,
        )
    }
}

struct ScanRunner {
    root: PathBuf,
    analyzer: Arc<ArchiveAnalyzer>,
    tiers: Arc<CacheTiers>,
    options: ScanOptions,
    cancel: Arc<AtomicBool>,
    state: Arc<Mutex<ScanState>>,
    event_tx: Sender<ScanEvent>,
}

struct ScanTally {
    processed: usize,
    valid: usize,
    failed: usize,
}

impl ScanRunner {
    fn run(self) {
        let started = Instant::now();

        let paths = match enumerate_archives(&self.root, &self.options.archive_extensions) {
            Ok(paths) => paths,
            Err(err) => {
                warn!("scan root unreadable: {err}");
                self.finish(
                    ScanState::Failed,
                    ScanSummary {
                        outcome: ScanOutcome::Failed,
                        processed: 0,
                        total: 0,
                        valid: 0,
                        failed: 0,
                        elapsed: started.elapsed(),
                        error: Some(err.to_string()),
                    },
                );
                return;
            }
        };

        let total = paths.len();
        info!(
            "scanning {} archives under {} with {} workers",
            total,
            self.root.display(),
            self.options.workers
        );
        let _ = self.event_tx.send(ScanEvent::Progress(ScanProgress {
            processed: 0,
            total,
            valid: 0,
        }));

        let (job_tx, job_rx) = bounded::<AnalysisJob>(self.options.workers * 2);
        let (result_tx, result_rx) = bounded::<AnalysisOutcome>(self.options.workers * 4);

        let worker_handles = spawn_analysis_workers(
            self.options.workers,
            self.analyzer.clone(),
            job_rx,
            result_tx,
            self.cancel.clone(),
        );

        let dispatcher = {
            let cancel = self.cancel.clone();
            thread::spawn(move || {
                for path in paths {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    if job_tx.send(AnalysisJob { path }).is_err() {
                        break;
                    }
                }
                // Dropping job_tx lets idle workers drain and exit.
            })
        };

        let tally = self.collect(total, result_rx);

        let _ = dispatcher.join();
        for handle in worker_handles {
            let _ = handle.join();
        }

        let canceled = self.cancel.load(Ordering::Relaxed);
        let (state, outcome) = if canceled {
            (ScanState::Canceled, ScanOutcome::Canceled)
        } else {
            (ScanState::Completed, ScanOutcome::Completed)
        };
        self.finish(
            state,
            ScanSummary {
                outcome,
                processed: tally.processed,
                total,
                valid: tally.valid,
                failed: tally.failed,
                elapsed: started.elapsed(),
                error: None,
            },
        );
    }

    fn collect(&self, total: usize, result_rx: Receiver<AnalysisOutcome>) -> ScanTally {
        let mut batch = ScanBatch::default();
        let mut tally = ScanTally {
            processed: 0,
            valid: 0,
            failed: 0,
        };
        let mut last_flush = Instant::now();
        let mut last_progress = 0usize;

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                // Drain without recording; the terminal event is the last
                // thing the consumer hears from this scan.
                for _ in result_rx.iter() {}
                break;
            }

            let wait = self
                .options
                .flush_interval
                .saturating_sub(last_flush.elapsed())
                .max(Duration::from_millis(1));

            match result_rx.recv_timeout(wait) {
                Ok(outcome) => {
                    match outcome.result {
                        Ok(info) => {
                            tally.processed += 1;
                            tally.valid += 1;
                            self.tiers
                                .metadata
                                .put(info.path.clone(), Arc::new(info.clone()));
                            batch.archives.push(info);
                        }
                        Err(CoreError::Canceled) => {
                            // Observed mid-analysis; not a recordable failure.
                        }
                        Err(err) => {
                            tally.processed += 1;
                            tally.failed += 1;
                            warn!("analysis failed for {}: {err}", outcome.path.display());
                            batch.failures.push(ArchiveFailure {
                                path: outcome.path,
                                kind: err.kind(),
                                message: err.to_string(),
                            });
                        }
                    }

                    if batch.len() >= self.options.batch_size {
                        if !self.flush(&mut batch, &mut last_flush) {
                            break;
                        }
                    }
                    if tally.processed - last_progress >= self.options.progress_every
                        || tally.processed == total
                    {
                        last_progress = tally.processed;
                        let progress = ScanProgress {
                            processed: tally.processed,
                            total,
                            valid: tally.valid,
                        };
                        if self.event_tx.send(ScanEvent::Progress(progress)).is_err() {
                            self.cancel.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !batch.is_empty() {
                        if !self.flush(&mut batch, &mut last_flush) {
                            break;
                        }
                    } else {
                        last_flush = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if !batch.is_empty() && !self.cancel.load(Ordering::Relaxed) {
            let mut unused = Instant::now();
            let _ = self.flush(&mut batch, &mut unused);
        }

        tally
    }

    fn flush(&self, batch: &mut ScanBatch, last_flush: &mut Instant) -> bool {
        let outgoing = std::mem::take(batch);
        *last_flush = Instant::now();
        if self.event_tx.send(ScanEvent::Batch(outgoing)).is_err() {
            // Consumer went away; stop producing.
            self.cancel.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }

    fn finish(&self, state: ScanState, summary: ScanSummary) {
        info!(
            "scan finished outcome={:?} processed={} valid={} failed={} elapsed_ms={}",
            summary.outcome,
            summary.processed,
            summary.valid,
            summary.failed,
            summary.elapsed.as_millis()
        );
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        let _ = self.event_tx.send(ScanEvent::Finished(summary));
    }
}

fn enumerate_archives(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, CoreError> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("scan root is not a directory: {}", root.display()),
        )));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // Only a failure on the root itself is fatal; unreadable
                // subtrees are skipped and logged.
                if err.path() == Some(root) {
                    return Err(CoreError::Io(err.into()));
                }
                warn!("skipping unreadable path during enumeration: {err}");
                continue;
            }
        };
        if entry.file_type().is_file() && has_archive_extension(entry.path(), extensions) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

fn has_archive_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}
