//! Error types for the cache tiers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
