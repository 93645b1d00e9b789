//! File selection, parsing and the incremental indexing pipeline

pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod incremental;
pub mod infra;
pub mod languages;
pub mod pipeline;
pub mod processor;

#[cfg(test)]
pub mod tests;

#[cfg(test)]
pub mod test_utils;

pub use config::{CONFIG_FILE, IndexerConfig, SaplingConfig, ScoringConfig, config_path};
pub use error::{IndexError, IndexResult};
pub use extractor::{ParserFactory, SourceParser, Toolchain, default_factory};
pub use filter::FileFilter;
pub use incremental::{IncrementalIndexer, LoadOutcome, cache_key};
pub use pipeline::{IndexContext, IndexOptions, IndexStats, index};
pub use processor::{ParallelFileProcessor, ProcessingResult};
