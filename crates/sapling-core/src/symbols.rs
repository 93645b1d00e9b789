//! Symbol table for cross-file resolution

use crate::model::{NodeId, NodeKind};
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// A definition or module registered under a bare name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub node: NodeId,
    pub kind: NodeKind,
    pub path: PathBuf,
}

/// Symbol table mapping bare names to the nodes that define them. Thread-safe for concurrent access.
pub struct SymbolTable {
    definitions: DashMap<String, Vec<SymbolEntry>>,
    /// Module key of the file name -> file nodes
    modules: DashMap<String, Vec<SymbolEntry>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            definitions: DashMap::new(),
            modules: DashMap::new(),
        }
    }

    /// Register a class, function or method definition.
    pub fn insert_definition(&self, name: &str, node: NodeId, kind: NodeKind, path: &Path) {
        self.definitions
            .entry(name.to_string())
            .or_default()
            .push(SymbolEntry {
                node,
                kind,
                path: path.to_path_buf(),
            });
    }

    /// Register a file node under its module key.
    pub fn insert_module(&self, path: &Path, node: NodeId) {
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            return;
        };
        self.modules
            .entry(module_key(file_name))
            .or_default()
            .push(SymbolEntry {
                node,
                kind: NodeKind::File,
                path: path.to_path_buf(),
            });
    }

    /// Definitions registered under `name` whose kind is accepted by `filter`.
    pub fn lookup_definitions(&self, name: &str, filter: impl Fn(NodeKind) -> bool) -> Vec<SymbolEntry> {
        self.definitions
            .get(name)
            .map(|r| r.value().iter().filter(|e| filter(e.kind)).cloned().collect())
            .unwrap_or_default()
    }

    /// File nodes matching an import specifier.
    pub fn lookup_module(&self, spec: &str) -> Vec<SymbolEntry> {
        self.modules
            .get(&module_key(spec))
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.iter().map(|r| r.value().len()).sum()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

const SOURCE_EXTENSIONS: &[&str] = &[".py", ".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"];

/// Reduce an import specifier to the module key a file registers under:
/// `pkg.util` -> `util`, `./lib/util.js` -> `util`, `"a"` -> `a`.
pub fn module_key(spec: &str) -> String {
    let spec = spec.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let last = spec.rsplit('/').next().unwrap_or(spec);
    let last = SOURCE_EXTENSIONS
        .iter()
        .find_map(|ext| last.strip_suffix(ext))
        .unwrap_or(last);
    last.rsplit('.').next().unwrap_or(last).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_key() {
        assert_eq!(module_key("a"), "a");
        assert_eq!(module_key("pkg.util"), "util");
        assert_eq!(module_key("./lib/util.js"), "util");
        assert_eq!(module_key("'../service'"), "service");
    }

    #[test]
    fn test_lookup_filters_kind() {
        let table = SymbolTable::new();
        table.insert_definition("Foo", NodeId(1), NodeKind::Class, Path::new("a.py"));
        table.insert_definition("Foo", NodeId(2), NodeKind::Function, Path::new("b.py"));

        let classes = table.lookup_definitions("Foo", |k| k == NodeKind::Class);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].node, NodeId(1));
        assert_eq!(table.definition_count(), 2);
    }

    #[test]
    fn test_module_lookup_by_stem() {
        let table = SymbolTable::new();
        table.insert_module(Path::new("src/util.py"), NodeId(7));
        assert_eq!(table.lookup_module("pkg.util")[0].node, NodeId(7));
        assert!(table.lookup_module("other").is_empty());
    }
}
