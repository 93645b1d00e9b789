//! Error types for indexing runs

use std::path::PathBuf;

use sapling_cache::CacheError;
use sapling_core::StoreError;
use thiserror::Error;

/// Failures that abort a run. Per-file problems are reported as warnings instead.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("Invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Graph store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
