//! Two-tier cache: memory in front of the SQLite file cache
//!
//! Memory holds every kind; disk only holds per-file values, keyed by path.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::disk::{DiskCache, DiskStats};
use crate::error::CacheResult;
use crate::memory::{BYTES_PER_MB, CacheStats, MemoryCache, MemoryCacheConfig};
use crate::policy::{CachePolicy, EntityKind};
use crate::size::{SizeEstimate, estimate_size};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridStats {
    pub memory: CacheStats,
    pub disk: DiskStats,
}

pub struct HybridCache<V> {
    memory: MemoryCache<V>,
    disk: DiskCache,
    policy: CachePolicy,
}

impl<V> HybridCache<V>
where
    V: SizeEstimate + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(memory: MemoryCacheConfig, disk: DiskCache, policy: CachePolicy) -> Self {
        HybridCache {
            memory: MemoryCache::with_policy(memory, policy.clone()),
            disk,
            policy,
        }
    }

    /// Look in memory, then on disk for file entries. A disk hit warms memory
    /// with the policy TTL for `kind`.
    pub fn get(&self, key: &str, kind: EntityKind) -> CacheResult<Option<Arc<V>>> {
        if let Some(value) = self.memory.get(key) {
            return Ok(Some(value));
        }
        if kind != EntityKind::File {
            return Ok(None);
        }

        match self.disk.get::<V>(Path::new(key))? {
            Some(value) => {
                let value = Arc::new(value);
                let ttl = self.policy.get_ttl(kind);
                if !self.memory.put_shared(key, value.clone(), Some(ttl), kind) {
                    debug!("Disk hit for {} too large to warm memory", key);
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Store a value. Returns false when the policy refuses it for its size.
    pub fn put(&self, key: &str, value: V, kind: EntityKind) -> CacheResult<bool> {
        let size_mb = estimate_size(&value) as f64 / BYTES_PER_MB;
        if !self.policy.should_cache(kind, size_mb) {
            debug!("Policy declined {} ({:.2} MB, {})", key, size_mb, kind);
            return Ok(false);
        }

        if kind == EntityKind::File {
            self.disk.put(Path::new(key), &value)?;
        }
        self.memory.put(key, value, None, kind);
        Ok(true)
    }
}

impl<V> HybridCache<V> {
    /// Whether the disk row for `path` still matches the file.
    pub fn is_fresh(&self, path: &Path) -> CacheResult<bool> {
        self.disk.is_cached(path)
    }

    /// Drop `key` from both tiers.
    pub fn invalidate(&self, key: &str) -> CacheResult<bool> {
        let in_memory = self.memory.remove(key);
        let on_disk = self.disk.remove(Path::new(key))?;
        Ok(in_memory || on_disk)
    }

    pub fn memory(&self) -> &MemoryCache<V> {
        &self.memory
    }

    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn stats(&self) -> CacheResult<HybridStats> {
        Ok(HybridStats {
            memory: self.memory.get_stats(),
            disk: self.disk.stats()?,
        })
    }

    pub fn shutdown(&self) {
        self.memory.shutdown();
    }
}
