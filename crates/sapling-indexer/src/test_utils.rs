//! Test utilities for the indexer

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use sapling_cache::{CachePolicy, DiskCache, HybridCache, MemoryCacheConfig};
use sapling_core::FileFragment;
use tempfile::TempDir;

/// Create a repository with a specific file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
    }

    temp_dir
}

/// Fragment cache in its own temp dir, without a sweep thread.
pub fn test_cache() -> (Arc<HybridCache<FileFragment>>, TempDir) {
    let dir = TempDir::new().unwrap();
    let disk = DiskCache::open(dir.path().join("cache.db")).unwrap();
    let memory = MemoryCacheConfig {
        cleanup_interval: Duration::ZERO,
        ..MemoryCacheConfig::default()
    };
    (Arc::new(HybridCache::new(memory, disk, CachePolicy::default())), dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_repo_with_nested_paths() {
        let repo = create_repo_with_structure(&[("pkg/mod/a.py", "x = 1\n")]);
        assert_eq!(fs::read_to_string(repo.path().join("pkg/mod/a.py")).unwrap(), "x = 1\n");
    }

    #[test]
    fn test_cache_starts_empty() {
        let (cache, _dir) = test_cache();
        assert!(cache.memory().is_empty());
        assert!(!cache.memory().is_sweeping());
    }
}
