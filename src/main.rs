use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use tracing::{info, warn};

use peekarc::archive::{AnalysisLimits, ArchiveHandlePool, ArchiveInfo};
use peekarc::cache::CacheTiers;
use peekarc::cli;
use peekarc::codec::{ImageCodec, build_resize_engine};
use peekarc::config;
use peekarc::logging;
use peekarc::retrieval::{RetrievalOptions, RetrievalService};
use peekarc::scan::events::ScanEvent;
use peekarc::scan::{ScanCoordinator, ScanOptions};
use peekarc::util;

fn main() -> Result<()> {
    logging::init_logging();

    let cli_opts = cli::parse();
    let loaded = config::load_config(cli_opts.config_path.as_deref())?;
    let mut cfg = loaded.config;
    if let Some(workers) = cli_opts.workers {
        cfg.workers = workers;
    }
    if cli_opts.fast_resize {
        cfg.fast_resize = true;
    }

    util::apply_open_file_limit(cli_opts.max_open_files)?;

    info!(
        "starting run_id={} root={} workers={} config_hash={}",
        cfg.run_id,
        cli_opts.root.display(),
        cfg.worker_count(),
        &loaded.config_hash[..12]
    );

    let pool = Arc::new(ArchiveHandlePool::new(&cfg.pool));
    let tiers = Arc::new(CacheTiers::new(&cfg.cache));
    let codec = Arc::new(ImageCodec::new(build_resize_engine(cfg.fast_resize)));

    let coordinator = ScanCoordinator::new(
        pool.clone(),
        tiers.clone(),
        AnalysisLimits::from(&cfg.analysis),
        ScanOptions::from_config(&cfg),
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("interrupt received; canceling scan");
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        })
        .context("installing interrupt handler")?;
    }

    let (handle, events) = coordinator.start_with_cancel(&cli_opts.root, cancel);

    let mut valid_archives: Vec<ArchiveInfo> = Vec::new();
    let mut summary = None;
    for event in events {
        match event {
            ScanEvent::Batch(batch) => {
                for failure in &batch.failures {
                    warn!(
                        "{}: {} ({})",
                        failure.path.display(),
                        failure.message,
                        failure.kind
                    );
                }
                valid_archives.extend(batch.archives);
            }
            ScanEvent::Progress(progress) => {
                info!(
                    "progress {}/{} valid={}",
                    progress.processed, progress.total, progress.valid
                );
            }
            ScanEvent::Finished(s) => {
                summary = Some(s);
                break;
            }
        }
    }
    handle.wait();

    let summary = summary.context("scan ended without a terminal summary")?;
    info!(
        "scan {:?}: processed={} valid={} failed={} elapsed_ms={}",
        summary.outcome,
        summary.processed,
        summary.valid,
        summary.failed,
        summary.elapsed.as_millis()
    );

    for info in &valid_archives {
        println!(
            "{}  {} entries  {}",
            info.path.display(),
            info.entry_count,
            util::format_size(info.total_uncompressed)
        );
    }

    if cli_opts.covers && !valid_archives.is_empty() {
        load_covers(
            &cfg,
            pool.clone(),
            tiers.clone(),
            codec,
            &valid_archives,
            cli_opts.cover_size,
        );
    }

    if cli_opts.stats {
        let stats = tiers.stats();
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    tiers.clear_all();
    pool.close_all();

    if summary.outcome == peekarc::scan::events::ScanOutcome::Failed {
        anyhow::bail!(
            "scan failed: {}",
            summary.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

/// Request a cover preview for every valid archive and wait for the
/// asynchronous deliveries.
fn load_covers(
    cfg: &config::Config,
    pool: Arc<ArchiveHandlePool>,
    tiers: Arc<CacheTiers>,
    codec: Arc<ImageCodec>,
    archives: &[ArchiveInfo],
    cover_size: (u32, u32),
) {
    let (service, results) = RetrievalService::new(
        pool,
        tiers,
        codec,
        RetrievalOptions::from_config(&cfg.retrieval),
    );

    let mut pending: HashMap<u64, &ArchiveInfo> = HashMap::new();
    for info in archives {
        if let Some(cover) = info.cover_entry() {
            let id = service.request(&info.path, cover, Some(cover_size));
            pending.insert(id, info);
        }
    }

    let mut received = 0usize;
    while received < pending.len() {
        let Ok(result) = results.recv() else {
            break;
        };
        received += 1;
        let Some(info) = pending.get(&result.request_id) else {
            continue;
        };
        match result.outcome {
            Ok(raster) => info!(
                "cover {}: {}x{}",
                info.path.display(),
                raster.width(),
                raster.height()
            ),
            Err(failure) => warn!(
                "cover {}: {} ({})",
                info.path.display(),
                failure.message,
                failure.kind
            ),
        }
    }

    service.shutdown();
}
