//! Integration tests for Sapling
//!
//! These tests drive the indexer, caches and store together, and the CLI binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use sapling_cache::{EntityKind, MemoryCache, MemoryCacheConfig};
use sapling_indexer::{
    FileFilter, IncrementalIndexer, IndexContext, IndexOptions, SourceParser, Toolchain, cache_key,
};
use tempfile::TempDir;

fn create_repo(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, content) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }
    dir
}

fn scenario_repo() -> TempDir {
    create_repo(&[
        ("a.py", "class Foo:\n    pass\n\ndef bar():\n    return 1\n"),
        ("b.py", "import a\n\nbar()\n"),
    ])
}

fn selected_files(context: &IndexContext) -> Vec<PathBuf> {
    FileFilter::from_config(&context.config().indexer)
        .unwrap()
        .filter(context.root())
}

/// Cross-file call edge, then nothing left to parse on the second run.
#[test]
fn test_cross_file_edge_and_clean_second_run() {
    let repo = scenario_repo();
    let context = IndexContext::open(repo.path()).unwrap();
    context.index(&IndexOptions::default()).unwrap();

    let relationships = context.store().relationship_names().unwrap();
    assert!(relationships.contains(&("calls".to_string(), "b.py".to_string(), "bar".to_string())));

    let indexer = IncrementalIndexer::new(context.cache().clone(), 2).unwrap();
    let files = selected_files(&context);
    let (cached, to_process) = indexer.split(&files);
    assert_eq!(cached.len(), 2);
    assert!(to_process.is_empty());
}

/// Bounded memory cache under pressure keeps the newest entries.
#[test]
fn test_memory_pressure_evicts_oldest() {
    let cache: MemoryCache<Vec<u8>> = MemoryCache::new(MemoryCacheConfig {
        max_size_bytes: 1024 * 1024,
        cleanup_interval: Duration::ZERO,
        ..MemoryCacheConfig::default()
    });
    for i in 0..6 {
        assert!(cache.put(format!("blob{i}"), vec![0u8; 200 * 1024], None, EntityKind::Query));
    }

    let stats = cache.get_stats();
    assert!(stats.evictions >= 1);
    assert!(cache.get("blob0").is_none());
    assert!(cache.get("blob5").is_some());
    assert!(stats.size_mb <= 1.0);
}

/// A file deleted between discovery and parsing fails alone.
#[test]
fn test_deleted_file_fails_and_graph_is_saved() {
    let repo = create_repo(&[
        ("a.py", "class Foo:\n    pass\n\ndef bar():\n    return 1\n"),
        ("b.py", "import a\n\nbar()\n"),
        ("c.py", "def c():\n    pass\n"),
    ]);
    let context = IndexContext::open(repo.path()).unwrap();
    let files = selected_files(&context);
    assert_eq!(files.len(), 3);

    fs::remove_file(context.root().join("c.py")).unwrap();
    let stats = context.index_paths(&files, &IndexOptions::default()).unwrap();

    assert_eq!(stats.failed, 1);
    assert!(stats.warnings.iter().any(|w| w.contains("c.py")));
    let names: Vec<String> = context.store().top_nodes(100).unwrap().into_iter().map(|n| n.name).collect();
    assert!(names.contains(&"Foo".to_string()));
    assert!(!names.contains(&"c".to_string()));
}

/// Re-indexing unchanged input, even after a restart, persists the same graph.
#[test]
fn test_reindex_is_idempotent() {
    let repo = scenario_repo();
    let (first_rels, first_top) = {
        let context = IndexContext::open(repo.path()).unwrap();
        context.index(&IndexOptions::default()).unwrap();
        (
            context.store().relationship_names().unwrap(),
            context.store().top_nodes(50).unwrap(),
        )
    };

    let context = IndexContext::open(repo.path()).unwrap();
    let stats = context.index(&IndexOptions::default()).unwrap();
    assert_eq!(stats.processed, 0);
    assert_eq!(context.store().relationship_names().unwrap(), first_rels);

    let scores = |nodes: &[sapling_core::StoredNode]| -> Vec<(String, String, String)> {
        let mut rows: Vec<_> = nodes
            .iter()
            .map(|n| (n.name.clone(), format!("{:.6}", n.weight), format!("{:.6}", n.importance_score)))
            .collect();
        rows.sort();
        rows
    };
    assert_eq!(scores(&context.store().top_nodes(50).unwrap()), scores(&first_top));
}

/// A cached fragment is what parsing the unchanged file produces.
#[test]
fn test_cached_fragment_matches_fresh_parse() {
    let repo = scenario_repo();
    let context = IndexContext::open(repo.path()).unwrap();
    context.index(&IndexOptions::default()).unwrap();

    let mut toolchain = Toolchain::new().unwrap();
    for path in selected_files(&context) {
        let cached = context
            .cache()
            .get(&cache_key(&path), EntityKind::File)
            .unwrap()
            .expect("fragment cached after indexing");
        let fresh = toolchain.parse(&path, &fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(*cached, fresh, "{}", path.display());
    }
}

fn sapling(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_sapling"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("Failed to execute sapling")
}

#[test]
fn test_cli_index_top_and_clear() {
    let repo = scenario_repo();

    let output = sapling(repo.path(), &["index"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Indexed 2 files"));

    let output = sapling(repo.path(), &["top", "--limit", "10"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Foo"));

    let output = sapling(repo.path(), &["cache-stats"]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("entries: 2"));

    let output = sapling(repo.path(), &["clear"]);
    assert!(output.status.success());
    assert!(!repo.path().join(".sapling").exists());
}

#[test]
fn test_cli_version() {
    let output = sapling(Path::new("."), &["version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Sapling v"));
}
