use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::util::default_worker_count;

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub capacity: usize,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    pub max_total_mib: u64,
    pub max_entries: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub image_capacity: usize,
    pub thumbnail_capacity: usize,
    pub metadata_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub progress_every: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    pub workers: usize,
    pub max_image_mib: u64,
    pub max_thumb_source_mib: u64,
    pub acquire_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_id: String,
    pub workers: usize,
    pub fast_resize: bool,
    pub archive_extensions: Vec<String>,
    pub pool: PoolConfig,
    pub analysis: AnalysisConfig,
    pub cache: CacheConfig,
    pub scan: ScanConfig,
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Effective scan worker count; `0` in the file means "derive".
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            default_worker_count()
        } else {
            self.workers
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pool.acquire_timeout_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis.timeout_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.scan.flush_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retrieval.retry_backoff_ms)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let mut config: Config = serde_yaml::from_slice(&bytes)?;
    if config.run_id.trim().is_empty() {
        config.run_id = generate_run_id();
    }

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig {
        config,
        config_hash,
    })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn generate_run_id() -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), rand_suffix())
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{:08x}", nanos)
}
