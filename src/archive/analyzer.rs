//! Archive content analysis.
//!
//! Walks the central directory of one archive and decides whether it is a
//! browsable image-only container, under three hard limits: total
//! uncompressed size, entry count, and wall-clock budget. The first
//! non-image entry, directory entry, or nested archive invalidates the
//! container immediately.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::archive::{ArchiveHandlePool, ArchiveInfo};
use crate::codec::signature::{EntryKind, classify_entry};
use crate::config::AnalysisConfig;
use crate::error::CoreError;
use crate::util::natural_cmp;

const MIB: u64 = 1024 * 1024;

/// Hard limits for one analysis pass.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisLimits {
    pub max_total_bytes: u64,
    pub max_entries: usize,
    pub timeout: Duration,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 500 * MIB,
            max_entries: 10_000,
            timeout: Duration::from_secs(15),
        }
    }
}

impl From<&AnalysisConfig> for AnalysisLimits {
    fn from(cfg: &AnalysisConfig) -> Self {
        Self {
            max_total_bytes: cfg.max_total_mib * MIB,
            max_entries: cfg.max_entries,
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }
}

pub struct ArchiveAnalyzer {
    pool: Arc<ArchiveHandlePool>,
    limits: AnalysisLimits,
}

impl ArchiveAnalyzer {
    pub fn new(pool: Arc<ArchiveHandlePool>, limits: AnalysisLimits) -> Self {
        Self { pool, limits }
    }

    pub fn limits(&self) -> AnalysisLimits {
        self.limits
    }

    pub fn analyze(&self, path: &Path) -> Result<ArchiveInfo, CoreError> {
        self.analyze_with_cancel(path, None)
    }

    /// Analyze one archive, checking `cancel` at entry-iteration
    /// boundaries. Exceeding the wall-clock budget abandons the pass and
    /// discards partial results.
    pub fn analyze_with_cancel(
        &self,
        path: &Path,
        cancel: Option<&AtomicBool>,
    ) -> Result<ArchiveInfo, CoreError> {
        let started = Instant::now();
        let mut handle = self.pool.acquire(path)?;

        let entry_count = handle.len();
        if entry_count == 0 {
            return Err(CoreError::InvalidArchive(
                "archive contains no entries".to_string(),
            ));
        }
        if entry_count > self.limits.max_entries {
            return Err(CoreError::EntryCountExceeded {
                actual: entry_count,
                limit: self.limits.max_entries,
            });
        }

        let mut entries = Vec::with_capacity(entry_count);
        let mut total_uncompressed: u64 = 0;

        for index in 0..entry_count {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(CoreError::Canceled);
                }
            }
            if started.elapsed() > self.limits.timeout {
                debug!("analysis of {} exceeded time budget", path.display());
                return Err(CoreError::Timeout {
                    budget: self.limits.timeout,
                });
            }

            let entry = handle.by_index(index).map_err(|err| match err {
                zip::result::ZipError::Io(io) => CoreError::Io(io),
                other => CoreError::InvalidArchive(other.to_string()),
            })?;

            if entry.is_dir() {
                return Err(CoreError::InvalidArchive(format!(
                    "directory entry '{}'",
                    entry.name()
                )));
            }

            let name = entry.name().to_string();
            match classify_entry(&name) {
                EntryKind::Image => {}
                EntryKind::NestedArchive => {
                    return Err(CoreError::InvalidArchive(format!(
                        "nested archive entry '{name}'"
                    )));
                }
                EntryKind::Other => {
                    return Err(CoreError::InvalidArchive(format!(
                        "non-image entry '{name}'"
                    )));
                }
            }

            total_uncompressed = total_uncompressed.saturating_add(entry.size());
            if total_uncompressed > self.limits.max_total_bytes {
                return Err(CoreError::SizeLimitExceeded {
                    actual: total_uncompressed,
                    limit: self.limits.max_total_bytes,
                });
            }

            entries.push(name);
        }

        entries.sort_by(|a, b| natural_cmp(a, b));

        Ok(ArchiveInfo {
            path: path.to_path_buf(),
            entry_count: entries.len(),
            entries,
            total_uncompressed,
            is_valid: true,
            analyzed_at: Utc::now(),
        })
    }
}
