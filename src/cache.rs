//! # Tiered Cache
//!
//! One generic bounded LRU tier, instantiated three times with independent
//! capacities: full-size images, thumbnails, and archive metadata. Capacity
//! is measured in entry count for deterministic eviction.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::archive::ArchiveInfo;
use crate::codec::RasterImage;
use crate::config::CacheConfig;

/// Size variant component of a [`CacheKey`]. Requests for different target
/// sizes of the same entry never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeVariant {
    Original,
    Fit { width: u32, height: u32 },
}

/// Composite key for one decoded image: archive path, entry name, and the
/// requested size variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub archive: PathBuf,
    pub entry: String,
    pub variant: SizeVariant,
}

impl CacheKey {
    pub fn new(archive: &std::path::Path, entry: &str, target: Option<(u32, u32)>) -> Self {
        let variant = match target {
            Some((width, height)) => SizeVariant::Fit { width, height },
            None => SizeVariant::Original,
        };
        Self {
            archive: archive.to_path_buf(),
            entry: entry.to_string(),
            variant,
        }
    }
}

/// Counters reported by [`LruTier::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
}

/// Hook invoked exactly once for every value that leaves the tier, whether
/// by eviction, replacement, `clear`, `resize`, or tier drop. Runs outside
/// the tier lock; it must not call back into the tier it was registered on.
pub type ReleaseHook<K, V> = Box<dyn Fn(&K, V) + Send + Sync>;

struct TierInner<K, V> {
    map: HashMap<K, V>,
    // Access order, least recently used at the front.
    order: VecDeque<K>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// One bounded LRU cache tier.
///
/// All operations synchronize on a single per-tier mutex, so concurrent
/// workers may call into the same tier freely. `get` refreshes recency;
/// `put` evicts the oldest entries until the tier is back under capacity.
pub struct LruTier<K, V> {
    name: &'static str,
    inner: Mutex<TierInner<K, V>>,
    on_release: Option<ReleaseHook<K, V>>,
}

impl<K, V> LruTier<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self::with_release_hook(name, capacity, None)
    }

    pub fn with_release_hook(
        name: &'static str,
        capacity: usize,
        on_release: Option<ReleaseHook<K, V>>,
    ) -> Self {
        Self {
            name,
            inner: Mutex::new(TierInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            on_release,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up a key; a hit moves it to the most-recently-used position.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.map.get(key).cloned() {
            Some(value) => {
                inner.hits += 1;
                refresh_recency(&mut inner.order, key);
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert a value, evicting least-recently-used entries as needed.
    ///
    /// Displaced values (the previous value for `key`, plus any evictions)
    /// have their release hook run before `put` returns.
    pub fn put(&self, key: K, value: V) {
        let mut released: Vec<(K, V)> = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(old) = inner.map.insert(key.clone(), value) {
                released.push((key.clone(), old));
            }
            refresh_recency(&mut inner.order, &key);

            while inner.map.len() > inner.capacity {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                if let Some(evicted) = inner.map.remove(&oldest) {
                    inner.evictions += 1;
                    released.push((oldest, evicted));
                }
            }
        }
        self.release_all(released);
    }

    /// Remove a single key, releasing its value if present.
    pub fn remove(&self, key: &K) -> bool {
        let removed = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let removed = inner.map.remove(key);
            if removed.is_some() {
                inner.order.retain(|k| k != key);
            }
            removed.map(|v| (key.clone(), v))
        };
        match removed {
            Some(pair) => {
                self.release_all(vec![pair]);
                true
            }
            None => false,
        }
    }

    /// Drop every entry, running each release hook exactly once.
    pub fn clear(&self) {
        let released = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.order.clear();
            inner.map.drain().collect::<Vec<_>>()
        };
        self.release_all(released);
    }

    /// Change the capacity, evicting oldest entries if the tier shrank.
    pub fn resize(&self, capacity: usize) {
        let mut released: Vec<(K, V)> = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.capacity = capacity.max(1);
            while inner.map.len() > inner.capacity {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                if let Some(evicted) = inner.map.remove(&oldest) {
                    inner.evictions += 1;
                    released.push((oldest, evicted));
                }
            }
        }
        self.release_all(released);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.map.len(),
            capacity: inner.capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .contains_key(key)
    }

    fn release_all(&self, released: Vec<(K, V)>) {
        if let Some(hook) = &self.on_release {
            for (key, value) in released {
                hook(&key, value);
            }
        }
    }
}

impl<K, V> Drop for LruTier<K, V> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(hook) = &self.on_release {
            for (key, value) in inner.map.drain() {
                hook(&key, value);
            }
        }
        inner.order.clear();
    }
}

fn refresh_recency<K: PartialEq + Clone>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
    order.push_back(key.clone());
}

/// Which tier an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    Image,
    Thumbnail,
    Metadata,
}

/// Per-tier statistics snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TiersStats {
    pub images: CacheStats,
    pub thumbnails: CacheStats,
    pub metadata: CacheStats,
}

/// The three cache tiers, constructed once at startup and injected into
/// every component that needs them.
pub struct CacheTiers {
    pub images: LruTier<CacheKey, Arc<RasterImage>>,
    pub thumbnails: LruTier<CacheKey, Arc<RasterImage>>,
    pub metadata: LruTier<PathBuf, Arc<ArchiveInfo>>,
}

impl CacheTiers {
    pub fn new(cfg: &CacheConfig) -> Self {
        Self {
            images: LruTier::with_release_hook(
                "images",
                cfg.image_capacity,
                Some(Box::new(raster_release_hook("images"))),
            ),
            thumbnails: LruTier::with_release_hook(
                "thumbnails",
                cfg.thumbnail_capacity,
                Some(Box::new(raster_release_hook("thumbnails"))),
            ),
            metadata: LruTier::new("metadata", cfg.metadata_capacity),
        }
    }

    pub fn stats(&self) -> TiersStats {
        TiersStats {
            images: self.images.stats(),
            thumbnails: self.thumbnails.stats(),
            metadata: self.metadata.stats(),
        }
    }

    pub fn resize(&self, tier: TierKind, capacity: usize) {
        match tier {
            TierKind::Image => self.images.resize(capacity),
            TierKind::Thumbnail => self.thumbnails.resize(capacity),
            TierKind::Metadata => self.metadata.resize(capacity),
        }
    }

    /// Explicit teardown for shutdown paths.
    pub fn clear_all(&self) {
        self.images.clear();
        self.thumbnails.clear();
        self.metadata.clear();
    }
}

fn raster_release_hook(tier: &'static str) -> impl Fn(&CacheKey, Arc<RasterImage>) + Send + Sync {
    move |key, value| {
        tracing::debug!(
            "released {} from {} tier ({} bytes)",
            key.entry,
            tier,
            value.weight()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_tier(
        capacity: usize,
        released: Arc<AtomicUsize>,
    ) -> LruTier<u32, Arc<Vec<u8>>> {
        LruTier::with_release_hook(
            "test",
            capacity,
            Some(Box::new(move |_key, _value| {
                released.fetch_add(1, Ordering::SeqCst);
            })),
        )
    }

    #[test]
    fn round_trips_until_evicted() {
        let tier: LruTier<u32, Arc<Vec<u8>>> = LruTier::new("test", 2);
        tier.put(1, Arc::new(vec![1]));
        assert_eq!(tier.get(&1).expect("hit").as_slice(), &[1]);
        tier.put(2, Arc::new(vec![2]));
        tier.put(3, Arc::new(vec![3]));
        assert!(tier.get(&1).is_none());
        assert!(tier.get(&2).is_some());
        assert!(tier.get(&3).is_some());
    }

    #[test]
    fn evicts_least_recently_used() {
        let tier: LruTier<u32, Arc<Vec<u8>>> = LruTier::new("test", 3);
        tier.put(1, Arc::new(vec![]));
        tier.put(2, Arc::new(vec![]));
        tier.put(3, Arc::new(vec![]));
        // Touching key 1 protects it from the next eviction.
        assert!(tier.get(&1).is_some());
        tier.put(4, Arc::new(vec![]));
        assert!(tier.contains(&1));
        assert!(!tier.contains(&2));
        assert_eq!(tier.len(), 3);
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let tier: LruTier<u32, Arc<Vec<u8>>> = LruTier::new("test", 4);
        for i in 0..100 {
            tier.put(i, Arc::new(vec![]));
            assert!(tier.len() <= 4);
        }
    }

    #[test]
    fn release_hook_runs_exactly_once_per_value() {
        let released = Arc::new(AtomicUsize::new(0));
        let tier = counting_tier(4, released.clone());
        for i in 0..10 {
            tier.put(i, Arc::new(vec![]));
        }
        // 6 evicted so far, 4 still resident.
        assert_eq!(released.load(Ordering::SeqCst), 6);
        tier.clear();
        assert_eq!(released.load(Ordering::SeqCst), 10);
        // A cleared tier has nothing left to release on drop.
        drop(tier);
        assert_eq!(released.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn replacement_releases_old_value() {
        let released = Arc::new(AtomicUsize::new(0));
        let tier = counting_tier(4, released.clone());
        tier.put(7, Arc::new(vec![1]));
        tier.put(7, Arc::new(vec![2]));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn drop_releases_residents() {
        let released = Arc::new(AtomicUsize::new(0));
        let tier = counting_tier(8, released.clone());
        for i in 0..5 {
            tier.put(i, Arc::new(vec![]));
        }
        drop(tier);
        assert_eq!(released.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn remove_releases_and_reports_presence() {
        let released = Arc::new(AtomicUsize::new(0));
        let tier = counting_tier(4, released.clone());
        tier.put(1, Arc::new(vec![]));
        assert!(tier.remove(&1));
        assert!(!tier.remove(&1));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(tier.is_empty());
    }

    #[test]
    fn resize_shrinks_and_evicts_oldest() {
        let tier: LruTier<u32, Arc<Vec<u8>>> = LruTier::new("test", 4);
        for i in 0..4 {
            tier.put(i, Arc::new(vec![]));
        }
        tier.resize(2);
        assert_eq!(tier.len(), 2);
        assert!(tier.contains(&2));
        assert!(tier.contains(&3));
    }

    #[test]
    fn release_once_under_concurrent_churn() {
        let released = Arc::new(AtomicUsize::new(0));
        let tier = Arc::new(counting_tier(8, released.clone()));
        let inserted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for t in 0..4u32 {
            let tier = tier.clone();
            let inserted = inserted.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200u32 {
                    tier.put(t * 1000 + i, Arc::new(vec![]));
                    inserted.fetch_add(1, Ordering::SeqCst);
                    let _ = tier.get(&(t * 1000));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker");
        }

        tier.clear();
        assert_eq!(released.load(Ordering::SeqCst), inserted.load(Ordering::SeqCst));
    }

    #[test]
    fn tiers_have_independent_capacities() {
        let tiers = CacheTiers::new(&crate::config::CacheConfig {
            image_capacity: 2,
            thumbnail_capacity: 4,
            metadata_capacity: 8,
        });
        let stats = tiers.stats();
        assert_eq!(stats.images.capacity, 2);
        assert_eq!(stats.thumbnails.capacity, 4);
        assert_eq!(stats.metadata.capacity, 8);

        tiers.resize(TierKind::Thumbnail, 16);
        assert_eq!(tiers.stats().thumbnails.capacity, 16);
        assert_eq!(tiers.stats().images.capacity, 2);
    }

    #[test]
    fn distinct_size_variants_do_not_collide() {
        let a = CacheKey::new(std::path::Path::new("/a.zip"), "img1.png", None);
        let b = CacheKey::new(std::path::Path::new("/a.zip"), "img1.png", Some((280, 280)));
        let c = CacheKey::new(std::path::Path::new("/a.zip"), "img1.png", Some((180, 180)));
        assert_ne!(a, b);
        assert_ne!(b, c);
    }
}
