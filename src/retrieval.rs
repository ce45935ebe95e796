//! # Retrieval Service
//!
//! Public façade for on-demand image loads. A request is dispatched to a
//! small worker pool and resolves to exactly one [`LoadResult`] on the
//! delivery channel — success with a decoded raster, or a specific error
//! kind. The caller's thread is never blocked by decode work.
//!
//! Lookup order: matching cache tier first (thumbnail tier when a target
//! size is given, full-image tier otherwise), then handle pool → entry
//! extraction → decode → resize → cache fill.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;
use tracing::debug;

use crate::archive::ArchiveHandlePool;
use crate::cache::{CacheKey, CacheTiers};
use crate::codec::{ImageCodec, RasterImage};
use crate::config::RetrievalConfig;
use crate::error::{CoreError, ErrorKind};
use crate::util::format_size;

const MIB: u64 = 1024 * 1024;
const JOB_CHANNEL_CAPACITY: usize = 128;

/// Identifier correlating a request with its delivered result.
pub type RequestId = u64;

/// Failure payload crossing the worker/consumer boundary as data.
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one retrieval request, produced exactly once.
#[derive(Debug)]
pub struct LoadResult {
    pub request_id: RequestId,
    pub key: CacheKey,
    pub outcome: Result<Arc<RasterImage>, LoadFailure>,
}

/// Tuning for the retrieval workers and per-entry guards.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub workers: usize,
    pub max_image_bytes: u64,
    pub max_thumb_source_bytes: u64,
    pub acquire_retries: u32,
    pub retry_backoff: Duration,
}

impl RetrievalOptions {
    pub fn from_config(cfg: &RetrievalConfig) -> Self {
        Self {
            workers: cfg.workers.max(1),
            max_image_bytes: cfg.max_image_mib * MIB,
            max_thumb_source_bytes: cfg.max_thumb_source_mib * MIB,
            acquire_retries: cfg.acquire_retries,
            retry_backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            max_image_bytes: 100 * MIB,
            max_thumb_source_bytes: 10 * MIB,
            acquire_retries: 2,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

struct LoadJob {
    id: RequestId,
    archive: PathBuf,
    entry: String,
    target: Option<(u32, u32)>,
}

struct RetrievalInner {
    pool: Arc<ArchiveHandlePool>,
    tiers: Arc<CacheTiers>,
    codec: Arc<ImageCodec>,
    options: RetrievalOptions,
}

/// On-demand image retrieval with asynchronous delivery.
pub struct RetrievalService {
    inner: Arc<RetrievalInner>,
    job_tx: Option<Sender<LoadJob>>,
    workers: Vec<thread::JoinHandle<()>>,
    next_id: AtomicU64,
}

impl RetrievalService {
    /// Build the service and its delivery channel. Results for every
    /// `request` call arrive on the returned receiver.
    pub fn new(
        pool: Arc<ArchiveHandlePool>,
        tiers: Arc<CacheTiers>,
        codec: Arc<ImageCodec>,
        options: RetrievalOptions,
    ) -> (Self, Receiver<LoadResult>) {
        let inner = Arc::new(RetrievalInner {
            pool,
            tiers,
            codec,
            options,
        });

        let (job_tx, job_rx) = bounded::<LoadJob>(JOB_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = bounded::<LoadResult>(JOB_CHANNEL_CAPACITY);

        let mut workers = Vec::new();
        for _ in 0..inner.options.workers {
            let inner = inner.clone();
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            workers.push(thread::spawn(move || {
                for job in job_rx {
                    let key = CacheKey::new(&job.archive, &job.entry, job.target);
                    let outcome = inner
                        .load(&job.archive, &job.entry, job.target)
                        .map_err(|err| LoadFailure {
                            kind: err.kind(),
                            message: err.to_string(),
                        });
                    let result = LoadResult {
                        request_id: job.id,
                        key,
                        outcome,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            }));
        }

        (
            Self {
                inner,
                job_tx: Some(job_tx),
                workers,
                next_id: AtomicU64::new(1),
            },
            result_rx,
        )
    }

    /// Enqueue a load. The result is delivered asynchronously, keyed by the
    /// returned request id.
    pub fn request(
        &self,
        archive: &Path,
        entry: &str,
        target: Option<(u32, u32)>,
    ) -> RequestId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = LoadJob {
            id,
            archive: archive.to_path_buf(),
            entry: entry.to_string(),
            target,
        };
        if let Some(tx) = &self.job_tx {
            // A send failure means shutdown already began; the id simply
            // never resolves, which callers only hit mid-teardown.
            let _ = tx.send(job);
        }
        id
    }

    /// Synchronous load path, also used by the workers. Exposed for
    /// consumers that already run on their own worker thread.
    pub fn load(
        &self,
        archive: &Path,
        entry: &str,
        target: Option<(u32, u32)>,
    ) -> Result<Arc<RasterImage>, CoreError> {
        self.inner.load(archive, entry, target)
    }

    /// Drain outstanding jobs and stop the workers.
    pub fn shutdown(mut self) {
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for RetrievalService {
    fn drop(&mut self) {
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl RetrievalInner {
    fn load(
        &self,
        archive: &Path,
        entry: &str,
        target: Option<(u32, u32)>,
    ) -> Result<Arc<RasterImage>, CoreError> {
        let key = CacheKey::new(archive, entry, target);
        let tier = match target {
            Some(_) => &self.tiers.thumbnails,
            None => &self.tiers.images,
        };

        if let Some(hit) = tier.get(&key) {
            return Ok(hit);
        }

        let max_bytes = match target {
            Some(_) => self.options.max_thumb_source_bytes,
            None => self.options.max_image_bytes,
        };
        let bytes = self.extract_entry(archive, entry, max_bytes)?;
        let raster = self.codec.decode(&bytes)?;
        let raster = match target {
            Some(bounds) => self.codec.thumbnail(&raster, bounds),
            None => raster,
        };

        debug!(
            "decoded {}:{} ({}x{}, {})",
            archive.display(),
            entry,
            raster.width(),
            raster.height(),
            format_size(raster.weight() as u64)
        );

        let value = Arc::new(raster);
        tier.put(key, value.clone());
        Ok(value)
    }

    /// Read one entry's raw bytes, retrying pool acquisition with bounded
    /// backoff before surfacing `PoolExhausted`.
    fn extract_entry(
        &self,
        archive: &Path,
        entry: &str,
        max_bytes: u64,
    ) -> Result<Vec<u8>, CoreError> {
        let mut attempt: u32 = 0;
        let mut handle = loop {
            match self.pool.acquire(archive) {
                Ok(handle) => break handle,
                Err(err @ CoreError::PoolExhausted { .. }) => {
                    if attempt >= self.options.acquire_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    thread::sleep(self.options.retry_backoff * attempt);
                }
                Err(err) => return Err(err),
            }
        };

        let mut structural_failure = false;
        let read_result = (|| {
            let mut entry_file = handle.by_name(entry).map_err(|err| match err {
                zip::result::ZipError::FileNotFound => CoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("entry '{entry}' not found in {}", archive.display()),
                )),
                zip::result::ZipError::Io(io) => CoreError::Io(io),
                other => {
                    structural_failure = true;
                    CoreError::InvalidArchive(other.to_string())
                }
            })?;

            let size = entry_file.size();
            if size == 0 {
                return Err(CoreError::CorruptEntry(format!("entry '{entry}' is empty")));
            }
            if size > max_bytes {
                return Err(CoreError::SizeLimitExceeded {
                    actual: size,
                    limit: max_bytes,
                });
            }

            let mut data = Vec::with_capacity(size as usize);
            entry_file.read_to_end(&mut data)?;
            Ok(data)
        })();

        if structural_failure {
            // The reader may be in a bad state; close it rather than
            // returning it for reuse.
            handle.discard();
        }
        read_result
    }
}
