//! Durable per-file cache in SQLite
//!
//! One row per source file, keyed by path. A row is valid while the file's
//! fingerprint still matches and its mtime is within a second of the stored one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::CacheResult;
use crate::fingerprint::{fingerprint_file, modified_secs};

const MTIME_TOLERANCE_SECS: f64 = 1.0;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS file_cache (
    path TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    mtime REAL NOT NULL,
    size INTEGER NOT NULL,
    cached_at INTEGER NOT NULL,
    data BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_cache_cached_at ON file_cache(cached_at);
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DiskStats {
    pub entries: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct DiskCache {
    path: PathBuf,
}

fn key(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

impl DiskCache {
    pub fn open(path: impl Into<PathBuf>) -> CacheResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let cache = DiskCache { path };
        cache.connect()?.execute_batch(SCHEMA_SQL)?;
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> CacheResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Whether the stored row still describes `file` as it is on disk.
    pub fn is_cached(&self, file: &Path) -> CacheResult<bool> {
        let row: Option<(String, f64)> = self
            .connect()?
            .query_row(
                "SELECT fingerprint, mtime FROM file_cache WHERE path = ?1",
                params![key(file)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((stored_hash, stored_mtime)) = row else {
            return Ok(false);
        };
        if (modified_secs(file)? - stored_mtime).abs() >= MTIME_TOLERANCE_SECS {
            return Ok(false);
        }
        Ok(fingerprint_file(file)?.hash == stored_hash)
    }

    /// Stored value for `file`. An undecodable row counts as a miss.
    pub fn get<T: DeserializeOwned>(&self, file: &Path) -> CacheResult<Option<T>> {
        let data: Option<Vec<u8>> = self
            .connect()?
            .query_row(
                "SELECT data FROM file_cache WHERE path = ?1",
                params![key(file)],
                |row| row.get(0),
            )
            .optional()?;

        let Some(data) = data else {
            return Ok(None);
        };
        match bincode::deserialize(&data) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring corrupt cache row for {}: {}", file.display(), e);
                Ok(None)
            }
        }
    }

    /// Store `value` for `file`, fingerprinting the file as it is now.
    pub fn put<T: Serialize + ?Sized>(&self, file: &Path, value: &T) -> CacheResult<()> {
        let fingerprint = fingerprint_file(file)?;
        let data = bincode::serialize(value)?;
        self.connect()?.execute(
            "INSERT OR REPLACE INTO file_cache (path, fingerprint, mtime, size, cached_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key(file),
                fingerprint.hash,
                fingerprint.mtime,
                fingerprint.size as i64,
                chrono::Utc::now().timestamp(),
                data,
            ],
        )?;
        debug!("Cached {} ({} bytes)", file.display(), data.len());
        Ok(())
    }

    pub fn remove(&self, file: &Path) -> CacheResult<bool> {
        let removed = self
            .connect()?
            .execute("DELETE FROM file_cache WHERE path = ?1", params![key(file)])?;
        Ok(removed > 0)
    }

    /// Purge rows cached more than `older_than_days` ago, or every row for `None`.
    /// An age reaching before the epoch purges nothing.
    pub fn clear(&self, older_than_days: Option<u64>) -> CacheResult<usize> {
        let conn = self.connect()?;
        let removed = match older_than_days {
            Some(days) => match cutoff(chrono::Utc::now().timestamp(), days) {
                Some(cutoff) => conn.execute("DELETE FROM file_cache WHERE cached_at < ?1", params![cutoff])?,
                None => 0,
            },
            None => conn.execute("DELETE FROM file_cache", [])?,
        };
        debug!("Purged {} disk cache rows", removed);
        Ok(removed)
    }

    pub fn stats(&self) -> CacheResult<DiskStats> {
        let (entries, total_bytes): (i64, i64) = self.connect()?.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(data)), 0) FROM file_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DiskStats {
            entries: entries as usize,
            total_bytes: total_bytes as u64,
        })
    }
}

fn cutoff(now: i64, days: u64) -> Option<i64> {
    i64::try_from(days)
        .ok()
        .and_then(|d| d.checked_mul(SECONDS_PER_DAY))
        .and_then(|age| now.checked_sub(age))
        .filter(|cutoff| *cutoff >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapling_core::{FileFragment, Language, LocalNode, NodeKind};
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskCache, PathBuf) {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path().join(".sapling").join("cache.db")).unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "def bar():\n    pass\n").unwrap();
        (dir, cache, file)
    }

    fn fragment(file: &Path) -> FileFragment {
        let mut fragment = FileFragment::new(file, Language::Python);
        let root = fragment.add_node(LocalNode::new(NodeKind::File, "a.py"));
        let bar = fragment.add_node(LocalNode::new(NodeKind::Function, "bar").at(1, 0));
        fragment.add_edge(root, bar, sapling_core::EdgeKind::Contains);
        fragment
    }

    #[test]
    fn test_put_then_get() {
        let (_dir, cache, file) = setup();
        assert!(!cache.is_cached(&file).unwrap());
        assert!(cache.get::<FileFragment>(&file).unwrap().is_none());

        let stored = fragment(&file);
        cache.put(&file, &stored).unwrap();
        assert!(cache.is_cached(&file).unwrap());
        assert_eq!(cache.get::<FileFragment>(&file).unwrap(), Some(stored));
    }

    #[test]
    fn test_modified_file_is_not_cached() {
        let (_dir, cache, file) = setup();
        cache.put(&file, &fragment(&file)).unwrap();
        fs::write(&file, "def baz():\n    pass\n").unwrap();
        assert!(!cache.is_cached(&file).unwrap());
    }

    #[test]
    fn test_deleted_file_check_is_error() {
        let (_dir, cache, file) = setup();
        cache.put(&file, &fragment(&file)).unwrap();
        fs::remove_file(&file).unwrap();
        assert!(cache.is_cached(&file).is_err());
    }

    #[test]
    fn test_corrupt_row_is_miss() {
        let (_dir, cache, file) = setup();
        cache.put(&file, &fragment(&file)).unwrap();
        cache
            .connect()
            .unwrap()
            .execute("UPDATE file_cache SET data = X'FFFF'", [])
            .unwrap();
        assert!(cache.get::<FileFragment>(&file).unwrap().is_none());
    }

    #[test]
    fn test_clear_by_age() {
        let (dir, cache, file) = setup();
        let other = dir.path().join("b.py");
        fs::write(&other, "x = 1\n").unwrap();
        cache.put(&file, &fragment(&file)).unwrap();
        cache.put(&other, &fragment(&other)).unwrap();

        let old = chrono::Utc::now().timestamp() - 10 * SECONDS_PER_DAY;
        cache
            .connect()
            .unwrap()
            .execute("UPDATE file_cache SET cached_at = ?1 WHERE path = ?2", params![old, key(&file)])
            .unwrap();

        assert_eq!(cache.clear(Some(7)).unwrap(), 1);
        assert!(cache.get::<FileFragment>(&file).unwrap().is_none());
        assert!(cache.get::<FileFragment>(&other).unwrap().is_some());

        assert_eq!(cache.clear(None).unwrap(), 1);
        assert_eq!(cache.stats().unwrap(), DiskStats::default());
    }

    #[test]
    fn test_clear_with_huge_age_keeps_fresh_rows() {
        let (_dir, cache, file) = setup();
        cache.put(&file, &fragment(&file)).unwrap();

        for days in [u64::MAX, i64::MAX as u64, 200_000_000_000_000] {
            assert_eq!(cache.clear(Some(days)).unwrap(), 0, "{days} days");
        }
        assert!(cache.get::<FileFragment>(&file).unwrap().is_some());
        assert_eq!(cutoff(1_000, 0), Some(1_000));
        assert_eq!(cutoff(SECONDS_PER_DAY * 3, 1), Some(SECONDS_PER_DAY * 2));
    }

    #[test]
    fn test_remove_and_stats() {
        let (_dir, cache, file) = setup();
        cache.put(&file, &fragment(&file)).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert!(stats.total_bytes > 0);

        assert!(cache.remove(&file).unwrap());
        assert!(!cache.remove(&file).unwrap());
        assert_eq!(cache.stats().unwrap().entries, 0);
    }
}
