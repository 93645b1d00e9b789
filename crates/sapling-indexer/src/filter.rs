//! Selects the files an indexing run looks at

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::debug;

use crate::config::IndexerConfig;
use crate::error::IndexResult;

/// Gitignore-aware walk restricted to known extensions, minus exclude globs.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: HashSet<String>,
    file_names: HashSet<String>,
    exclude: GlobSet,
    follow_gitignore: bool,
}

impl FileFilter {
    pub fn from_config(config: &IndexerConfig) -> IndexResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            builder.add(Glob::new(pattern)?);
        }
        Ok(FileFilter {
            extensions: config.extensions.iter().map(|e| e.trim_start_matches('.').to_string()).collect(),
            file_names: config.file_names.iter().cloned().collect(),
            exclude: builder.build()?,
            follow_gitignore: config.follow_gitignore,
        })
    }

    /// Whether a root-relative path is eligible, ignoring gitignore rules.
    pub fn accepts(&self, relative: &Path) -> bool {
        if self.exclude.is_match(relative) {
            return false;
        }
        let by_name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.file_names.contains(name));
        let by_extension = relative
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.contains(ext));
        by_name || by_extension
    }

    /// Every eligible file under `root`, sorted.
    pub fn filter(&self, root: &Path) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(self.follow_gitignore)
            .git_global(self.follow_gitignore)
            .git_exclude(self.follow_gitignore)
            .ignore(self.follow_gitignore)
            .require_git(false)
            .build();

        let mut files: Vec<PathBuf> = walker
            .filter_map(|result| match result {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter(|entry| {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                self.accepts(relative)
            })
            .map(|entry| entry.into_path())
            .collect();

        files.sort();
        debug!("Selected {} files under {}", files.len(), root.display());
        files
    }
}
