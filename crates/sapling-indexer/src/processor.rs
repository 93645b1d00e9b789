//! Parallel parsing on isolated worker threads
//!
//! Each worker owns a parser toolchain built from the factory and a
//! contiguous chunk of paths. Nothing mutable is shared; workers hand their
//! results back over a channel and the caller collects them in completion
//! order. A parser that panics fails only the file it was parsing; the
//! worker rebuilds its toolchain and carries on with the rest of its chunk.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sapling_core::FileFragment;
use tracing::{debug, warn};

use crate::extractor::{ParserFactory, SourceParser};

/// Inputs at or below this size are parsed on the calling thread.
const SEQUENTIAL_THRESHOLD: usize = 2;

/// Outcome of parsing one file. Node ids in `fragment` are file-local.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub file_path: PathBuf,
    pub fragment: Option<FileFragment>,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ProcessingResult {
    fn ok(file_path: PathBuf, fragment: FileFragment, elapsed: Duration) -> Self {
        ProcessingResult {
            file_path,
            fragment: Some(fragment),
            success: true,
            error: None,
            elapsed,
        }
    }

    fn failed(file_path: PathBuf, error: impl Into<String>, elapsed: Duration) -> Self {
        ProcessingResult {
            file_path,
            fragment: None,
            success: false,
            error: Some(error.into()),
            elapsed,
        }
    }
}

pub struct ParallelFileProcessor {
    factory: ParserFactory,
    max_workers: usize,
}

impl ParallelFileProcessor {
    pub fn new(factory: ParserFactory, max_workers: usize) -> Self {
        ParallelFileProcessor {
            factory,
            max_workers: max_workers.max(1),
        }
    }

    /// Number of workers used for `file_count` files.
    pub fn worker_count(&self, file_count: usize) -> usize {
        let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        cpus.min(self.max_workers).min(file_count).max(1)
    }

    /// Parse every path. One result per input path, in completion order.
    pub fn process(&self, paths: &[PathBuf]) -> Vec<ProcessingResult> {
        if paths.is_empty() {
            return Vec::new();
        }
        if paths.len() <= SEQUENTIAL_THRESHOLD {
            return run_chunk(&self.factory, paths);
        }

        let workers = self.worker_count(paths.len());
        let chunk_size = paths.len().div_ceil(workers);
        debug!(
            "Parsing {} files on {} workers ({} per chunk)",
            paths.len(),
            workers,
            chunk_size
        );

        let (tx, rx) = mpsc::channel::<Vec<ProcessingResult>>();
        let mut handles = Vec::with_capacity(workers);
        let mut results = Vec::with_capacity(paths.len());

        for (index, chunk) in paths.chunks(chunk_size).enumerate() {
            let owned = chunk.to_vec();
            let factory = self.factory.clone();
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("sapling-parse-{index}"))
                .spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_chunk(&factory, &owned)));
                    let chunk_results = match outcome {
                        Ok(chunk_results) => chunk_results,
                        // Only the factory can still panic here.
                        Err(payload) => {
                            let reason = panic_message(payload.as_ref());
                            warn!("Parse worker {} panicked: {}", index, reason);
                            owned
                                .iter()
                                .map(|p| ProcessingResult::failed(p.clone(), format!("worker panicked: {reason}"), Duration::ZERO))
                                .collect()
                        }
                    };
                    // The receiver outlives every worker.
                    let _ = tx.send(chunk_results);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!("Could not spawn parse worker {}: {}; parsing its chunk inline", index, e);
                    results.extend(run_chunk(&self.factory, chunk));
                }
            }
        }
        drop(tx);

        for chunk_results in rx {
            results.extend(chunk_results);
        }
        for handle in handles {
            // Panics were caught inside the worker.
            let _ = handle.join();
        }
        results
    }
}

/// Parse a chunk with a freshly built toolchain.
fn run_chunk(factory: &ParserFactory, paths: &[PathBuf]) -> Vec<ProcessingResult> {
    let mut parser = match factory() {
        Ok(parser) => parser,
        Err(e) => {
            warn!("Failed to build parser toolchain: {:#}", e);
            return paths
                .iter()
                .map(|p| ProcessingResult::failed(p.clone(), format!("parser unavailable: {e:#}"), Duration::ZERO))
                .collect();
        }
    };

    let mut results = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        let (result, panicked) = process_file(parser.as_mut(), path);
        results.push(result);
        if !panicked {
            continue;
        }
        // Parser state is unknown after unwinding.
        match factory() {
            Ok(fresh) => parser = fresh,
            Err(e) => {
                warn!("Failed to rebuild parser toolchain: {:#}", e);
                results.extend(paths[index + 1..].iter().map(|p| {
                    ProcessingResult::failed(p.clone(), format!("parser unavailable: {e:#}"), Duration::ZERO)
                }));
                break;
            }
        }
    }
    results
}

/// Parse one file, containing any panic to that file. The flag reports
/// whether the parser panicked.
fn process_file(parser: &mut dyn SourceParser, path: &Path) -> (ProcessingResult, bool) {
    let start = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(|| parse_file(parser, path))) {
        Ok(Ok(fragment)) => (ProcessingResult::ok(path.to_path_buf(), fragment, start.elapsed()), false),
        Ok(Err(e)) => {
            warn!("Failed to process {}: {:#}", path.display(), e);
            (
                ProcessingResult::failed(path.to_path_buf(), format!("{e:#}"), start.elapsed()),
                false,
            )
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!("Parser panicked on {}: {}", path.display(), reason);
            (
                ProcessingResult::failed(path.to_path_buf(), format!("parser panicked: {reason}"), start.elapsed()),
                true,
            )
        }
    }
}

fn parse_file(parser: &mut dyn SourceParser, path: &Path) -> Result<FileFragment> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content = String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    parser.parse(path, &content)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::default_factory;
    use crate::languages::GenericParser;
    use crate::test_utils::create_repo_with_structure;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Panics on any file named `boom.py`.
    struct Explosive;

    impl SourceParser for Explosive {
        fn parse(&mut self, path: &Path, content: &str) -> Result<FileFragment> {
            if path.ends_with("boom.py") {
                panic!("cannot parse {}", path.display());
            }
            GenericParser.parse(path, content)
        }
    }

    fn explosive_factory() -> ParserFactory {
        Arc::new(|| Ok(Box::new(Explosive) as Box<dyn SourceParser>))
    }

    #[test]
    fn test_sequential_small_input() {
        let repo = create_repo_with_structure(&[("a.py", "def a():\n    pass\n"), ("b.py", "x = 1\n")]);
        let paths = vec![repo.path().join("a.py"), repo.path().join("b.py")];
        let results = ParallelFileProcessor::new(default_factory(), 4).process(&paths);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        // Sequential path keeps input order.
        assert_eq!(results[0].file_path, paths[0]);
        assert_eq!(results[0].fragment.as_ref().unwrap().node_count(), 2);
    }

    #[test]
    fn test_every_path_gets_exactly_one_result() {
        let files: Vec<(String, String)> = (0..23)
            .map(|i| (format!("m{i}.py"), format!("def f{i}():\n    return {i}\n")))
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
        let repo = create_repo_with_structure(&refs);
        let paths: Vec<PathBuf> = files.iter().map(|(p, _)| repo.path().join(p)).collect();

        let results = ParallelFileProcessor::new(default_factory(), 3).process(&paths);
        assert_eq!(results.len(), paths.len());
        let seen: HashSet<&PathBuf> = results.iter().map(|r| &r.file_path).collect();
        assert_eq!(seen.len(), paths.len());
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn test_missing_and_binary_files_fail_individually() {
        let repo = create_repo_with_structure(&[("ok.py", "x = 1\n"), ("other.py", "y = 2\n")]);
        std::fs::write(repo.path().join("bin.py"), [0xff, 0xfe, 0x00, 0x81]).unwrap();
        let paths = vec![
            repo.path().join("ok.py"),
            repo.path().join("gone.py"),
            repo.path().join("bin.py"),
            repo.path().join("other.py"),
        ];

        let results = ParallelFileProcessor::new(default_factory(), 2).process(&paths);
        assert_eq!(results.len(), 4);
        let failed: HashSet<PathBuf> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.file_path.clone())
            .collect();
        assert_eq!(failed, HashSet::from([paths[1].clone(), paths[2].clone()]));
        for r in results.iter().filter(|r| !r.success) {
            assert!(r.fragment.is_none());
            assert!(r.error.is_some());
        }
    }

    fn failed_names(results: &[ProcessingResult]) -> Vec<String> {
        let mut names: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .filter_map(|r| r.file_path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_panicking_parser_fails_only_that_file() {
        let repo = create_repo_with_structure(&[
            ("a.py", ""),
            ("boom.py", ""),
            ("c.py", ""),
            ("d.py", ""),
        ]);
        let paths: Vec<PathBuf> = ["a.py", "boom.py", "c.py", "d.py"]
            .iter()
            .map(|p| repo.path().join(p))
            .collect();

        for workers in [1, 2, 4] {
            let results = ParallelFileProcessor::new(explosive_factory(), workers).process(&paths);
            assert_eq!(results.len(), 4, "{workers} workers");
            assert_eq!(failed_names(&results), vec!["boom.py"], "{workers} workers");

            let boom = results.iter().find(|r| r.file_path == paths[1]).unwrap();
            assert!(boom.error.as_deref().unwrap().contains("panicked"));
            assert!(boom.fragment.is_none());
        }
    }

    #[test]
    fn test_panicking_parser_on_small_input_is_contained() {
        let repo = create_repo_with_structure(&[("a.py", "x = 1\n"), ("boom.py", "")]);
        let paths = vec![repo.path().join("boom.py"), repo.path().join("a.py")];

        let results = ParallelFileProcessor::new(explosive_factory(), 4).process(&paths);
        assert_eq!(results.len(), 2);
        assert_eq!(failed_names(&results), vec!["boom.py"]);
        // Sequential path keeps input order; the file after the panic still parses.
        assert!(results[1].success);
        assert_eq!(results[1].file_path, paths[1]);

        let single = ParallelFileProcessor::new(explosive_factory(), 4).process(&paths[..1]);
        assert_eq!(single.len(), 1);
        assert!(!single[0].success);
    }

    #[test]
    fn test_factory_failure_fails_all() {
        let factory: ParserFactory = Arc::new(|| Err(anyhow::anyhow!("no grammar")));
        let repo = create_repo_with_structure(&[("a.py", "")]);
        let results = ParallelFileProcessor::new(factory, 4).process(&[repo.path().join("a.py")]);
        assert_eq!(results.len(), 1);
        assert!(results[0].error.as_deref().unwrap().contains("no grammar"));
    }
}
