//! Events delivered to the scan consumer.
//!
//! Everything the consumer learns about a scan arrives as an owned message
//! on a channel; no shared mutable state crosses the worker/consumer
//! boundary.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::archive::ArchiveInfo;
use crate::error::ErrorKind;

/// A per-archive failure, recorded without aborting the scan.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveFailure {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

/// A flushed group of scan results. Batches arrive in flush order; archive
/// order within a scan is not guaranteed across batches.
#[derive(Debug, Default)]
pub struct ScanBatch {
    pub archives: Vec<ArchiveInfo>,
    pub failures: Vec<ArchiveFailure>,
}

impl ScanBatch {
    pub fn len(&self) -> usize {
        self.archives.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty() && self.failures.is_empty()
    }
}

/// Rate-limited progress snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub valid: usize,
}

/// Terminal outcome of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed,
    Canceled,
    Failed,
}

/// Final summary, emitted exactly once per scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub outcome: ScanOutcome,
    pub processed: usize,
    pub total: usize,
    pub valid: usize,
    pub failed: usize,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// Present only for `Failed` outcomes.
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum ScanEvent {
    Batch(ScanBatch),
    Progress(ScanProgress),
    Finished(ScanSummary),
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
