//! # Utility Module
//!
//! Shared helpers: natural filename ordering, size formatting, and process
//! resource limits.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use anyhow::Result;
#[cfg(unix)]
use anyhow::anyhow;
#[cfg(not(unix))]
use tracing::warn;

/// Compare two entry names in natural order: case-insensitive, with digit
/// runs compared numerically so `img2` sorts before `img10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars().peekable();
    let mut cb = b.chars().peekable();

    loop {
        match (ca.peek().copied(), cb.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x.is_ascii_digit() && y.is_ascii_digit() {
                    let (na, la) = take_number(&mut ca);
                    let (nb, lb) = take_number(&mut cb);
                    match na.cmp(&nb) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                    // Same value, different zero-padding: shorter run first.
                    match la.cmp(&lb) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    let xl = x.to_ascii_lowercase();
                    let yl = y.to_ascii_lowercase();
                    match xl.cmp(&yl) {
                        Ordering::Equal => {
                            ca.next();
                            cb.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_number(it: &mut Peekable<Chars>) -> (u128, usize) {
    let mut value: u128 = 0;
    let mut digits = 0usize;
    while let Some(ch) = it.peek().copied() {
        if !ch.is_ascii_digit() {
            break;
        }
        value = value
            .saturating_mul(10)
            .saturating_add((ch as u8 - b'0') as u128);
        digits += 1;
        it.next();
    }
    (value, digits)
}

/// Format a byte count as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    match bytes {
        n if n < 1024 => format!("{} B", n),
        n if n < 1024 * 1024 => format!("{:.1} KB", n as f64 / KB),
        n if n < 1024 * 1024 * 1024 => format!("{:.1} MB", n as f64 / MB),
        n => format!("{:.1} GB", n as f64 / GB),
    }
}

/// Default worker count from available parallelism, capped so a large host
/// does not oversubscribe archive I/O.
pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(2, 8)
}

/// Raise the soft open-file-descriptor limit for this process.
///
/// The handle pool bounds its own descriptors, but a generous scan plus
/// retrieval load can still brush against a conservative shell default.
pub fn apply_open_file_limit(max_open_files: Option<u64>) -> Result<()> {
    #[cfg(unix)]
    {
        let Some(requested) = max_open_files else {
            return Ok(());
        };
        unsafe {
            let mut limit = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            if libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) != 0 {
                return Err(anyhow!(
                    "getrlimit failed for open file descriptors: {}",
                    std::io::Error::last_os_error()
                ));
            }

            let requested = requested as libc::rlim_t;
            let new_cur = if requested > limit.rlim_max {
                tracing::warn!(
                    "requested open-file limit {} exceeds hard limit {}; using {}",
                    requested,
                    limit.rlim_max,
                    limit.rlim_max
                );
                limit.rlim_max
            } else {
                requested
            };

            let new_limit = libc::rlimit {
                rlim_cur: new_cur,
                rlim_max: limit.rlim_max,
            };
            if libc::setrlimit(libc::RLIMIT_NOFILE, &new_limit) != 0 {
                return Err(anyhow!(
                    "setrlimit failed for open file descriptors: {}",
                    std::io::Error::last_os_error()
                ));
            }
            tracing::info!("set open-file limit to {}", new_cur);
        }
    }
    #[cfg(not(unix))]
    {
        if max_open_files.is_some() {
            warn!("open-file limits are only supported on Unix platforms");
        }
    }
    Ok(())
}
