//! Bounded pool of open archive readers.
//!
//! Opening a ZIP central directory is the expensive part of every archive
//! touch, so readers are kept open and reused across requests. The pool
//! holds at most `capacity` readers; when full, the least-recently-used
//! idle reader is closed to make room. A reader in active use is never
//! closed.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::PoolConfig;
use crate::error::CoreError;

pub type ZipReader = zip::ZipArchive<BufReader<File>>;

enum SlotState {
    Idle(Box<ZipReader>),
    Busy,
}

struct Slot {
    state: SlotState,
    last_used: u64,
}

struct PoolInner {
    slots: HashMap<PathBuf, Slot>,
    // Monotonic counter backing LRU recency.
    tick: u64,
}

/// Bounded, LRU-evicting pool of open archive readers.
///
/// All slot mutation happens under one mutex; reads against an acquired
/// handle proceed without it. Callers that find every slot busy block on a
/// condvar for at most the configured acquire timeout before receiving
/// `PoolExhausted`.
pub struct ArchiveHandlePool {
    inner: Mutex<PoolInner>,
    released: Condvar,
    capacity: usize,
    acquire_timeout: Duration,
}

impl ArchiveHandlePool {
    pub fn new(cfg: &PoolConfig) -> Self {
        Self::with_capacity(cfg.capacity, Duration::from_millis(cfg.acquire_timeout_ms))
    }

    pub fn with_capacity(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                slots: HashMap::new(),
                tick: 0,
            }),
            released: Condvar::new(),
            capacity: capacity.max(1),
            acquire_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently open handles (idle and in use).
    pub fn open_handles(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .slots
            .len()
    }

    /// Acquire a reader for `path`, reusing an idle one when available.
    ///
    /// Blocks for at most the acquire timeout when the path's reader is in
    /// use or the pool is at capacity with nothing idle to evict.
    pub fn acquire(&self, path: &Path) -> Result<PooledHandle<'_>, CoreError> {
        let key = path.to_path_buf();
        let deadline = Instant::now() + self.acquire_timeout;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            inner.tick += 1;
            let tick = inner.tick;

            if let Some(slot) = inner.slots.get_mut(&key) {
                match mem::replace(&mut slot.state, SlotState::Busy) {
                    SlotState::Idle(reader) => {
                        slot.last_used = tick;
                        return Ok(PooledHandle {
                            pool: self,
                            path: key,
                            reader: Some(reader),
                            discard: false,
                        });
                    }
                    // Someone else holds this path's reader; wait below.
                    SlotState::Busy => {}
                }
            } else if inner.slots.len() < self.capacity || evict_lru_idle(&mut inner) {
                let reader = open_reader(&key)?;
                inner.slots.insert(
                    key.clone(),
                    Slot {
                        state: SlotState::Busy,
                        last_used: tick,
                    },
                );
                return Ok(PooledHandle {
                    pool: self,
                    path: key,
                    reader: Some(Box::new(reader)),
                    discard: false,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CoreError::PoolExhausted {
                    waited: self.acquire_timeout,
                });
            }
            let (guard, wait) = self
                .released
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if wait.timed_out() && Instant::now() >= deadline {
                return Err(CoreError::PoolExhausted {
                    waited: self.acquire_timeout,
                });
            }
        }
    }

    /// Close the cached reader for `path` if it is idle. Used when an
    /// archive is known to have changed on disk.
    pub fn close(&self, path: &Path) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let is_idle = matches!(
            inner.slots.get(path),
            Some(Slot {
                state: SlotState::Idle(_),
                ..
            })
        );
        if is_idle {
            inner.slots.remove(path);
            self.released.notify_all();
        }
    }

    /// Teardown: close every pooled reader. Handles still in active use
    /// are closed when their guard drops.
    pub fn close_all(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.slots.clear();
        self.released.notify_all();
    }

    fn release(&self, path: &Path, reader: Box<ZipReader>, discard: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tick += 1;
        let tick = inner.tick;
        if discard {
            inner.slots.remove(path);
        } else if let Some(slot) = inner.slots.get_mut(path) {
            slot.state = SlotState::Idle(reader);
            slot.last_used = tick;
        }
        // A slot missing here means close_all ran while the handle was out;
        // dropping the reader closes the file.
        drop(inner);
        self.released.notify_all();
    }
}

fn evict_lru_idle(inner: &mut PoolInner) -> bool {
    let victim = inner
        .slots
        .iter()
        .filter(|(_, slot)| matches!(slot.state, SlotState::Idle(_)))
        .min_by_key(|(_, slot)| slot.last_used)
        .map(|(path, _)| path.clone());
    match victim {
        Some(path) => {
            debug!("evicting idle archive handle for {}", path.display());
            inner.slots.remove(&path);
            true
        }
        None => false,
    }
}

fn open_reader(path: &Path) -> Result<ZipReader, CoreError> {
    let file = File::open(path)?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(|err| match err {
        zip::result::ZipError::Io(io) => CoreError::Io(io),
        other => CoreError::InvalidArchive(other.to_string()),
    })
}

/// RAII guard over a pooled reader. Dropping the guard returns the reader
/// to the pool without closing it; [`PooledHandle::discard`] closes it
/// instead (used after structural read errors).
pub struct PooledHandle<'a> {
    pool: &'a ArchiveHandlePool,
    path: PathBuf,
    reader: Option<Box<ZipReader>>,
    discard: bool,
}

impl std::fmt::Debug for PooledHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledHandle")
            .field("path", &self.path)
            .field("discard", &self.discard)
            .finish_non_exhaustive()
    }
}

impl PooledHandle<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop the underlying reader instead of returning it for reuse.
    pub fn discard(mut self) {
        self.discard = true;
    }
}

impl Deref for PooledHandle<'_> {
    type Target = ZipReader;

    fn deref(&self) -> &Self::Target {
        self.reader.as_ref().expect("reader present until drop")
    }
}

impl DerefMut for PooledHandle<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.reader.as_mut().expect("reader present until drop")
    }
}

impl Drop for PooledHandle<'_> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.pool.release(&self.path, reader, self.discard);
        }
    }
}
