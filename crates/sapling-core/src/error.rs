//! Error types for graph scoring and persistence

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("{measure} did not converge within {iterations} iterations")]
    NotConverged {
        measure: &'static str,
        iterations: usize,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
