//! # Archive Module
//!
//! Bounded pooling of open archive readers and validation of image-only
//! containers.

pub mod analyzer;
pub mod pool;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use analyzer::{AnalysisLimits, ArchiveAnalyzer};
pub use pool::{ArchiveHandlePool, PooledHandle};

/// Result of analyzing one archive. Immutable once produced; a fresh
/// analysis supersedes (never mutates) an earlier record for the same path.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    /// Image entry names in natural display order.
    pub entries: Vec<String>,
    pub total_uncompressed: u64,
    pub entry_count: usize,
    pub is_valid: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl ArchiveInfo {
    /// First entry in display order, used for cover previews.
    pub fn cover_entry(&self) -> Option<&str> {
        self.entries.first().map(String::as_str)
    }
}
