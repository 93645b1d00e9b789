//! Bounded in-memory cache with LRU eviction and TTL expiry
//!
//! Every operation, including the background sweep, goes through a single
//! mutex around the LRU list. Entries expire either `ttl` after creation or
//! `access_ttl` after their last read, whichever comes first.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::policy::{CachePolicy, EntityKind};
use crate::size::{SizeEstimate, estimate_size};

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// How long `shutdown` waits for the sweep thread before detaching it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCacheConfig {
    pub max_size_bytes: usize,
    /// Sweep period. Zero disables the background thread.
    pub cleanup_interval: Duration,
    pub access_ttl: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        MemoryCacheConfig {
            max_size_bytes: 100 * 1024 * 1024,
            cleanup_interval: Duration::from_secs(300),
            access_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

struct CacheEntry<V> {
    value: Arc<V>,
    size: usize,
    created_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
    access_count: u64,
    kind: EntityKind,
}

impl<V> CacheEntry<V> {
    /// A deadline past the representable range never expires.
    fn is_live(&self, now: Instant, access_ttl: Duration) -> bool {
        let within = |start: Instant, ttl: Duration| start.checked_add(ttl).is_none_or(|deadline| now <= deadline);
        within(self.created_at, self.ttl) && within(self.last_accessed, access_ttl)
    }
}

struct Inner<V> {
    entries: LruCache<String, CacheEntry<V>>,
    total_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Inner {
            entries: LruCache::unbounded(),
            total_size: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.total_size -= entry.size;
                true
            }
            None => false,
        }
    }

    /// Drop every expired or stale entry. Returns how many were removed.
    fn sweep(&mut self, access_ttl: Duration) -> usize {
        let now = Instant::now();
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now, access_ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            self.remove_entry(key);
        }
        self.expirations += dead.len() as u64;
        dead.len()
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub size_mb: f64,
    pub max_size_mb: f64,
    pub entry_count: usize,
    pub entries_by_type: BTreeMap<EntityKind, usize>,
}

struct Sweeper {
    stop: Sender<()>,
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

pub struct MemoryCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    policy: CachePolicy,
    max_size: usize,
    access_ttl: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<V: Send + Sync + 'static> MemoryCache<V> {
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self::with_policy(config, CachePolicy::default())
    }

    pub fn with_policy(config: MemoryCacheConfig, policy: CachePolicy) -> Self {
        let inner = Arc::new(Mutex::new(Inner::new()));
        let sweeper = if config.cleanup_interval.is_zero() {
            None
        } else {
            spawn_sweeper(inner.clone(), config.cleanup_interval, config.access_ttl)
        };

        MemoryCache {
            inner,
            policy,
            max_size: config.max_size_bytes,
            access_ttl: config.access_ttl,
            sweeper: Mutex::new(sweeper),
        }
    }
}

fn spawn_sweeper<V: Send + Sync + 'static>(
    inner: Arc<Mutex<Inner<V>>>,
    interval: Duration,
    access_ttl: Duration,
) -> Option<Sweeper> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let spawned = std::thread::Builder::new()
        .name("sapling-cache-sweep".to_string())
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let removed = inner.lock().sweep(access_ttl);
                        if removed > 0 {
                            debug!("Cache sweep removed {} expired entries", removed);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let _ = done_tx.send(());
        });

    match spawned {
        Ok(handle) => Some(Sweeper {
            stop: stop_tx,
            done: done_rx,
            handle,
        }),
        Err(e) => {
            warn!("Failed to start cache sweep thread, expiry will be lazy only: {}", e);
            None
        }
    }
}

impl<V: SizeEstimate> MemoryCache<V> {
    /// Insert a value. `ttl` defaults to the policy TTL for `kind`.
    /// Returns false if the value alone exceeds the cache capacity.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Option<Duration>, kind: EntityKind) -> bool {
        self.put_shared(key, Arc::new(value), ttl, kind)
    }

    pub fn put_shared(&self, key: impl Into<String>, value: Arc<V>, ttl: Option<Duration>, kind: EntityKind) -> bool {
        let key = key.into();
        let size = key.len() + estimate_size(value.as_ref());
        if size > self.max_size {
            debug!("Rejecting {} ({} bytes): larger than cache capacity", key, size);
            return false;
        }

        let now = Instant::now();
        let ttl = ttl.unwrap_or_else(|| self.policy.get_ttl(kind));
        let mut inner = self.inner.lock();
        inner.remove_entry(&key);

        while inner.total_size + size > self.max_size {
            match inner.entries.pop_lru() {
                Some((evicted, entry)) => {
                    inner.total_size -= entry.size;
                    inner.evictions += 1;
                    debug!("Evicted {} ({} bytes)", evicted, entry.size);
                }
                None => break,
            }
        }

        inner.total_size += size;
        inner.entries.put(
            key,
            CacheEntry {
                value,
                size,
                created_at: now,
                last_accessed: now,
                ttl,
                access_count: 0,
                kind,
            },
        );
        true
    }
}

impl<V> MemoryCache<V> {
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let live = inner.entries.peek(key).map(|entry| entry.is_live(now, self.access_ttl));

        match live {
            None => {
                inner.misses += 1;
                None
            }
            Some(false) => {
                inner.remove_entry(key);
                inner.misses += 1;
                inner.expirations += 1;
                None
            }
            Some(true) => {
                let value = {
                    let entry = inner.entries.get_mut(key)?;
                    entry.last_accessed = now;
                    entry.access_count += 1;
                    entry.value.clone()
                };
                inner.hits += 1;
                Some(value)
            }
        }
    }

    /// Presence check that neither promotes the entry nor touches counters.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .peek(key)
            .is_some_and(|entry| entry.is_live(now, self.access_ttl))
    }

    /// Number of reads served for `key` since it was inserted.
    pub fn access_count(&self, key: &str) -> Option<u64> {
        self.inner.lock().entries.peek(key).map(|entry| entry.access_count)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().remove_entry(key)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_size = 0;
    }

    /// Remove expired and stale entries now.
    pub fn sweep(&self) -> usize {
        self.inner.lock().sweep(self.access_ttl)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        let mut entries_by_type = BTreeMap::new();
        for (_, entry) in inner.entries.iter() {
            *entries_by_type.entry(entry.kind).or_insert(0) += 1;
        }
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
            evictions: inner.evictions,
            expirations: inner.expirations,
            size_mb: inner.total_size as f64 / BYTES_PER_MB,
            max_size_mb: self.max_size as f64 / BYTES_PER_MB,
            entry_count: inner.entries.len(),
            entries_by_type,
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Stop the sweep thread and drop every entry. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.send(());
            match sweeper.done.recv_timeout(SHUTDOWN_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if sweeper.handle.join().is_err() {
                        warn!("Cache sweep thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Cache sweep thread did not stop within {:?}; detaching", SHUTDOWN_TIMEOUT);
                }
            }
        }
        self.clear();
    }
}

impl<V> Drop for MemoryCache<V> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn config(max_size_bytes: usize) -> MemoryCacheConfig {
        MemoryCacheConfig {
            max_size_bytes,
            cleanup_interval: Duration::ZERO,
            ..MemoryCacheConfig::default()
        }
    }

    #[test]
    fn test_put_and_get() {
        let cache: MemoryCache<String> = MemoryCache::new(config(1024));
        assert!(cache.put("a", "alpha".to_string(), None, EntityKind::Node));
        assert_eq!(cache.get("a").as_deref().map(String::as_str), Some("alpha"));
        assert!(cache.get("b").is_none());

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.entries_by_type.get(&EntityKind::Node), Some(&1));
    }

    #[test]
    fn test_rejects_value_larger_than_capacity() {
        let cache: MemoryCache<Vec<u8>> = MemoryCache::new(config(100));
        assert!(!cache.put("big", vec![0; 200], None, EntityKind::File));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replacing_key_keeps_size_accounting() {
        let cache: MemoryCache<Vec<u8>> = MemoryCache::new(config(10_000));
        cache.put("k", vec![0; 1000], None, EntityKind::File);
        cache.put("k", vec![0; 10], None, EntityKind::File);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_stats().size_mb < 1000.0 / BYTES_PER_MB);
    }

    #[test]
    fn test_recently_read_entry_survives_eviction() {
        let cache: MemoryCache<Vec<u8>> = MemoryCache::new(config(3500));
        cache.put("a", vec![0; 1000], None, EntityKind::File);
        cache.put("b", vec![0; 1000], None, EntityKind::File);
        cache.put("c", vec![0; 1000], None, EntityKind::File);
        assert!(cache.get("a").is_some());

        cache.put("d", vec![0; 1000], None, EntityKind::File);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[test]
    fn test_ttl_expiry_counts_miss_and_expiration() {
        let cache: MemoryCache<u64> = MemoryCache::new(config(1024));
        cache.put("short", 1, Some(Duration::from_millis(30)), EntityKind::Query);
        cache.put("long", 2, None, EntityKind::Query);
        sleep(Duration::from_millis(60));

        assert!(cache.get("short").is_none());
        assert_eq!(cache.get("long").as_deref(), Some(&2));
        let stats = cache.get_stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_stale_entry_expires_on_access_ttl() {
        let cache: MemoryCache<u64> = MemoryCache::new(MemoryCacheConfig {
            max_size_bytes: 1024,
            cleanup_interval: Duration::ZERO,
            access_ttl: Duration::from_millis(30),
        });
        cache.put("k", 7, None, EntityKind::Node);
        sleep(Duration::from_millis(60));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.get_stats().expirations, 1);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let cache: MemoryCache<u64> = MemoryCache::new(MemoryCacheConfig {
            max_size_bytes: 1024,
            cleanup_interval: Duration::ZERO,
            access_ttl: Duration::MAX,
        });
        cache.put("k", 7, Some(Duration::MAX), EntityKind::File);
        assert_eq!(cache.get("k").as_deref(), Some(&7));
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn test_access_count_tracks_hits() {
        let cache: MemoryCache<u64> = MemoryCache::new(config(1024));
        cache.put("k", 7, None, EntityKind::Node);
        cache.get("k");
        cache.get("k");
        assert_eq!(cache.access_count("k"), Some(2));
    }

    #[test]
    fn test_background_sweep_removes_expired() {
        let cache: MemoryCache<u64> = MemoryCache::new(MemoryCacheConfig {
            max_size_bytes: 1024,
            cleanup_interval: Duration::from_millis(20),
            ..MemoryCacheConfig::default()
        });
        assert!(cache.is_sweeping());
        cache.put("k", 1, Some(Duration::from_millis(10)), EntityKind::Query);

        let deadline = Instant::now() + Duration::from_secs(2);
        while cache.len() > 0 && Instant::now() < deadline {
            sleep(Duration::from_millis(10));
        }
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_stats().expirations, 1);
    }

    #[test]
    fn test_shutdown_stops_sweeper_and_clears() {
        let cache: MemoryCache<u64> = MemoryCache::new(MemoryCacheConfig {
            max_size_bytes: 1024,
            cleanup_interval: Duration::from_secs(60),
            ..MemoryCacheConfig::default()
        });
        cache.put("k", 1, None, EntityKind::Node);
        cache.shutdown();
        assert!(!cache.is_sweeping());
        assert!(cache.is_empty());
        cache.shutdown();
    }
}
