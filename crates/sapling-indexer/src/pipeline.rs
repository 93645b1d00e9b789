//! End-to-end indexing run
//!
//! filter -> split -> load cached -> parse the rest -> cache -> merge ->
//! score -> weight -> save. Every collaborator hangs off an [`IndexContext`]
//! built explicitly by the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sapling_cache::{DiskCache, HybridCache};
use sapling_core::{
    FileFragment, GraphAssembler, GraphStore, ImportanceScorer, UsageCounts, WeightCalculator, cache_db_path,
    ensure_data_dir, graph_db_path,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SaplingConfig;
use crate::error::{IndexError, IndexResult};
use crate::extractor::{ParserFactory, default_factory};
use crate::filter::FileFilter;
use crate::incremental::IncrementalIndexer;
use crate::processor::ParallelFileProcessor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Ignore cached fragments and parse everything.
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub nodes: usize,
    pub edges: usize,
    pub files: usize,
    pub cached: usize,
    pub processed: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub warnings: Vec<String>,
}

/// Configuration, caches, graph store and parser factory for one root.
pub struct IndexContext {
    root: PathBuf,
    config: SaplingConfig,
    cache: Arc<HybridCache<FileFragment>>,
    store: GraphStore,
    factory: ParserFactory,
}

impl IndexContext {
    /// Open `root`, reading `sapling.toml` when present.
    pub fn open(root: &Path) -> IndexResult<Self> {
        let root = canonical_root(root)?;
        let config = SaplingConfig::load(&root)?;
        Self::with_config(&root, config)
    }

    pub fn with_config(root: &Path, config: SaplingConfig) -> IndexResult<Self> {
        let root = canonical_root(root)?;
        ensure_data_dir(&root)?;
        let disk = DiskCache::open(cache_db_path(&root))?;
        let cache = Arc::new(HybridCache::new(config.cache.memory(), disk, config.cache.policy()));
        let store = GraphStore::open(graph_db_path(&root))?;
        Ok(IndexContext {
            root,
            config,
            cache,
            store,
            factory: default_factory(),
        })
    }

    pub fn with_parser_factory(mut self, factory: ParserFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SaplingConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<HybridCache<FileFragment>> {
        &self.cache
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Index every file the configured filter selects under the root.
    pub fn index(&self, options: &IndexOptions) -> IndexResult<IndexStats> {
        let filter = FileFilter::from_config(&self.config.indexer)?;
        let files = filter.filter(&self.root);
        self.index_paths(&files, options)
    }

    /// Index an explicit file list. Files that cannot be read are reported in
    /// the stats and the graph is built from the rest.
    pub fn index_paths(&self, files: &[PathBuf], options: &IndexOptions) -> IndexResult<IndexStats> {
        let start = Instant::now();
        let mut warnings = Vec::new();

        let incremental = IncrementalIndexer::new(self.cache.clone(), self.config.indexer.io_threads)?;
        let (cached, mut to_process) = if options.force {
            (Vec::new(), files.to_vec())
        } else {
            incremental.split(files)
        };

        let loaded = incremental.load_cached(&cached);
        to_process.extend(loaded.reload);

        let processor = ParallelFileProcessor::new(self.factory.clone(), self.config.indexer.max_workers);
        let results = processor.process(&to_process);

        let mut fresh = Vec::with_capacity(results.len());
        let mut failed = 0;
        for result in results {
            match result.fragment {
                Some(fragment) if result.success => {
                    if let Err(e) = incremental.store(&result.file_path, fragment.clone()) {
                        warn!("Could not cache {}: {}", result.file_path.display(), e);
                        warnings.push(format!("{}: not cached: {}", result.file_path.display(), e));
                    }
                    fresh.push(fragment);
                }
                _ => {
                    failed += 1;
                    let reason = result.error.unwrap_or_else(|| "unknown error".to_string());
                    warnings.push(format!("{}: {}", result.file_path.display(), reason));
                }
            }
        }

        let mut assembler = GraphAssembler::new();
        for (_, fragment) in &loaded.fragments {
            assembler.merge(fragment);
        }
        for fragment in &fresh {
            assembler.merge(fragment);
        }
        let assembled = assembler.finish();
        let mut graph = assembled.graph;
        debug!(
            "Merge: {} resolved, {} unresolved, {} ambiguous references",
            assembled.stats.resolved_references,
            assembled.stats.unresolved_references,
            assembled.stats.ambiguous_references
        );

        let score = ImportanceScorer::new().score(&mut graph, &assembled.findings);
        warnings.extend(score.warnings);

        let sources: Vec<&Path> = loaded
            .fragments
            .iter()
            .map(|(path, _)| path.as_path())
            .chain(fresh.iter().map(|f| f.path.as_path()))
            .collect();
        let (usage, skipped) = UsageCounts::scan_files(&sources);
        for (path, reason) in skipped {
            warnings.push(format!("{}: usage scan skipped: {}", path.display(), reason));
        }

        let weights = WeightCalculator::new(self.config.scoring.refine_with_centrality).calculate(&mut graph, &usage);
        warnings.extend(weights.warnings);

        let saved = self.store.save(&graph, &weights.relationships)?;

        let stats = IndexStats {
            nodes: saved.nodes,
            edges: saved.relationships,
            files: files.len(),
            cached: loaded.fragments.len(),
            processed: to_process.len(),
            failed,
            elapsed: start.elapsed(),
            warnings,
        };
        info!(
            "Indexed {} files ({} cached, {} parsed, {} failed): {} nodes, {} edges in {:.2?}",
            stats.files, stats.cached, stats.processed, stats.failed, stats.nodes, stats.edges, stats.elapsed
        );
        Ok(stats)
    }
}

fn canonical_root(root: &Path) -> IndexResult<PathBuf> {
    match root.canonicalize() {
        Ok(path) if path.is_dir() => Ok(path),
        _ => Err(IndexError::RootNotFound(root.to_path_buf())),
    }
}

/// Index `root` with its on-disk configuration.
pub fn index(root: &Path, options: &IndexOptions) -> IndexResult<IndexStats> {
    IndexContext::open(root)?.index(options)
}
