//! Decides which files need parsing and loads the rest from cache

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use sapling_cache::{EntityKind, HybridCache};
use sapling_core::FileFragment;
use tracing::{debug, warn};

use crate::error::IndexResult;

/// Result of [`IncrementalIndexer::load_cached`].
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub fragments: Vec<(PathBuf, Arc<FileFragment>)>,
    /// Paths whose cached fragment could not be loaded; parse them instead.
    pub reload: Vec<PathBuf>,
}

pub struct IncrementalIndexer {
    cache: Arc<HybridCache<FileFragment>>,
    pool: ThreadPool,
}

/// Cache key for a file fragment.
pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl IncrementalIndexer {
    pub fn new(cache: Arc<HybridCache<FileFragment>>, io_threads: usize) -> IndexResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(io_threads.max(1))
            .thread_name(|i| format!("sapling-io-{i}"))
            .build()?;
        Ok(IncrementalIndexer { cache, pool })
    }

    pub fn cache(&self) -> &Arc<HybridCache<FileFragment>> {
        &self.cache
    }

    /// Partition `paths` into files with a valid cache entry and files that
    /// need parsing. Input order is kept within each side; any error while
    /// checking a file sends it to parsing.
    pub fn split(&self, paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let verdicts: Vec<bool> = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| match self.cache.is_fresh(path) {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        debug!("Cache check failed for {}: {}", path.display(), e);
                        false
                    }
                })
                .collect()
        });

        let mut cached = Vec::new();
        let mut to_process = Vec::new();
        for (path, fresh) in paths.iter().zip(verdicts) {
            if fresh {
                cached.push(path.clone());
            } else {
                to_process.push(path.clone());
            }
        }
        debug!("{} cached, {} to process", cached.len(), to_process.len());
        (cached, to_process)
    }

    /// Load cached fragments through the hybrid cache so memory is warmed.
    pub fn load_cached(&self, paths: &[PathBuf]) -> LoadOutcome {
        let loaded: Vec<(PathBuf, Option<Arc<FileFragment>>)> = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let fragment = match self.cache.get(&cache_key(path), EntityKind::File) {
                        Ok(Some(fragment)) => Some(fragment),
                        Ok(None) => {
                            warn!("Cached fragment for {} disappeared, reprocessing", path.display());
                            None
                        }
                        Err(e) => {
                            warn!("Failed to load cached fragment for {}: {}", path.display(), e);
                            None
                        }
                    };
                    (path.clone(), fragment)
                })
                .collect()
        });

        let mut outcome = LoadOutcome::default();
        for (path, fragment) in loaded {
            match fragment {
                Some(fragment) => outcome.fragments.push((path, fragment)),
                None => outcome.reload.push(path),
            }
        }
        outcome
    }

    /// Cache a freshly parsed fragment. Returns whether the policy accepted it.
    pub fn store(&self, path: &Path, fragment: FileFragment) -> IndexResult<bool> {
        Ok(self.cache.put(&cache_key(path), fragment, EntityKind::File)?)
    }
}
