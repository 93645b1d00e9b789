//! `sapling.toml` configuration
//!
//! ```toml
//! [cache]
//! memory_max_mb = 100
//!
//! [cache.policy.query]
//! ttl_days = 2
//!
//! [indexer]
//! max_workers = 4
//! exclude = ["vendor/**"]
//!
//! [scoring]
//! refine_with_centrality = true
//! ```

use std::path::{Path, PathBuf};

use sapling_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IndexError, IndexResult};

pub const CONFIG_FILE: &str = "sapling.toml";

/// Upper bound on parse workers regardless of CPU count.
pub const DEFAULT_MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaplingConfig {
    pub cache: CacheConfig,
    pub indexer: IndexerConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Cap on parallel parse workers
    pub max_workers: usize,
    /// Threads probing and loading the cache
    pub io_threads: usize,
    /// File extensions to index, without the dot
    pub extensions: Vec<String>,
    /// Extension-less file names to index
    pub file_names: Vec<String>,
    /// Glob patterns relative to the root
    pub exclude: Vec<String>,
    pub follow_gitignore: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            max_workers: DEFAULT_MAX_WORKERS,
            io_threads: 4,
            extensions: ["py", "pyi", "js", "jsx", "mjs", "cjs", "ts", "tsx", "yml", "yaml", "toml", "json"]
                .into_iter()
                .map(String::from)
                .collect(),
            file_names: ["Dockerfile", "Jenkinsfile"].into_iter().map(String::from).collect(),
            exclude: [
                ".git/**",
                ".sapling/**",
                "**/node_modules/**",
                "**/__pycache__/**",
                "**/dist/**",
                "**/build/**",
                "**/.venv/**",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            follow_gitignore: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Blend centrality on the weighted graph into node weights
    pub refine_with_centrality: bool,
}

impl SaplingConfig {
    /// Load `<root>/sapling.toml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> IndexResult<Self> {
        let path = config_path(root);
        if !path.exists() {
            debug!("No {} in {}, using defaults", CONFIG_FILE, root.display());
            return Ok(SaplingConfig::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content).map_err(|reason| IndexError::Config { path, reason })
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let config: SaplingConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        self.cache.validate().map_err(|e| e.to_string())?;
        if self.indexer.max_workers == 0 {
            return Err("indexer.max_workers must be at least 1".to_string());
        }
        if self.indexer.io_threads == 0 {
            return Err("indexer.io_threads must be at least 1".to_string());
        }
        Ok(())
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}
