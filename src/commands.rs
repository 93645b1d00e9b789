//! CLI command implementations

use std::path::Path;

use anyhow::{Context, bail};
use sapling_cache::DiskCache;
use sapling_core::{GraphStore, cache_db_path, clear_data_dir, graph_db_path};
use sapling_indexer::{IndexContext, IndexOptions};

pub fn index(root: &Path, force: bool) -> anyhow::Result<()> {
    tracing::info!("Indexing repository: {}", root.display());

    let context = IndexContext::open(root)?;
    let stats = context.index(&IndexOptions { force })?;

    println!(
        "Indexed {} files ({} cached, {} parsed, {} failed)",
        stats.files, stats.cached, stats.processed, stats.failed
    );
    println!("Graph: {} nodes, {} edges in {:.2?}", stats.nodes, stats.edges, stats.elapsed);
    if !stats.warnings.is_empty() {
        println!("{} warnings:", stats.warnings.len());
        for warning in &stats.warnings {
            println!("  {warning}");
        }
    }
    Ok(())
}

pub fn top(root: &Path, limit: usize) -> anyhow::Result<()> {
    let path = graph_db_path(root);
    if !path.exists() {
        bail!("No graph found at {}; run `sapling index` first", path.display());
    }
    let store = GraphStore::open(&path)?;
    let nodes = store.top_nodes(limit).context("Failed to read graph")?;

    let base = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    println!("{:>6}  {:>6}  {:<8}  {:<32}  path", "weight", "score", "kind", "name");
    for node in nodes {
        let relative = Path::new(&node.path)
            .strip_prefix(&base)
            .map(|p| p.display().to_string())
            .unwrap_or(node.path.clone());
        let tags = node.relevance_tags.iter().cloned().collect::<Vec<_>>().join(",");
        println!(
            "{:>6.3}  {:>6.3}  {:<8}  {:<32}  {}:{} [{}]",
            node.weight, node.importance_score, node.kind, node.name, relative, node.line, tags
        );
    }
    Ok(())
}

pub fn cache_stats(root: &Path) -> anyhow::Result<()> {
    let path = cache_db_path(root);
    if !path.exists() {
        println!("No cache at {}", path.display());
        return Ok(());
    }
    let stats = DiskCache::open(&path)?.stats()?;
    println!("Cache: {}", path.display());
    println!("  entries: {}", stats.entries);
    println!("  size:    {:.2} MB", stats.total_bytes as f64 / (1024.0 * 1024.0));
    Ok(())
}

pub fn clear(root: &Path, older_than_days: Option<u64>) -> anyhow::Result<()> {
    match older_than_days {
        Some(days) => {
            let path = cache_db_path(root);
            if !path.exists() {
                tracing::info!("No cache to clear");
                return Ok(());
            }
            let removed = DiskCache::open(&path)?.clear(Some(days))?;
            tracing::info!("Removed {} cache entries older than {} days", removed, days);
        }
        None => {
            tracing::info!("Clearing cache for: {}", root.display());
            clear_data_dir(root)?;
            tracing::info!("Cache cleared");
        }
    }
    Ok(())
}
