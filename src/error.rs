use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::format_size;

/// Errors produced by the analysis and retrieval pipeline.
///
/// Per-archive and per-image errors cross the worker/consumer boundary as
/// data (an [`ErrorKind`] plus message), never as a panic or a raw `Err`
/// thrown across threads.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not an image-only archive: {0}")]
    InvalidArchive(String),

    #[error("uncompressed size {} exceeds limit {}", format_size(*.actual), format_size(*.limit))]
    SizeLimitExceeded { actual: u64, limit: u64 },

    #[error("entry count {actual} exceeds limit {limit}")]
    EntryCountExceeded { actual: usize, limit: usize },

    #[error("analysis abandoned after {}ms", .budget.as_millis())]
    Timeout { budget: Duration },

    #[error("corrupt image data: {0}")]
    CorruptEntry(String),

    #[error("no archive handle available within {}ms", .waited.as_millis())]
    PoolExhausted { waited: Duration },

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation canceled")]
    Canceled,
}

/// Stable discriminant for [`CoreError`], safe to serialize and match on
/// from the consumer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArchive,
    SizeLimitExceeded,
    EntryCountExceeded,
    Timeout,
    CorruptEntry,
    PoolExhausted,
    IoFailure,
    Canceled,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidArchive(_) => ErrorKind::InvalidArchive,
            CoreError::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
            CoreError::EntryCountExceeded { .. } => ErrorKind::EntryCountExceeded,
            CoreError::Timeout { .. } => ErrorKind::Timeout,
            CoreError::CorruptEntry(_) => ErrorKind::CorruptEntry,
            CoreError::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            CoreError::Io(_) => ErrorKind::IoFailure,
            CoreError::Canceled => ErrorKind::Canceled,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::InvalidArchive => "invalid_archive",
            ErrorKind::SizeLimitExceeded => "size_limit_exceeded",
            ErrorKind::EntryCountExceeded => "entry_count_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CorruptEntry => "corrupt_entry",
            ErrorKind::PoolExhausted => "pool_exhausted",
            ErrorKind::IoFailure => "io_failure",
            ErrorKind::Canceled => "canceled",
        };
        f.write_str(label)
    }
}
