//! Corpus-wide usage frequency counting
//!
//! Counting is textual and case-sensitive. It re-reads file contents rather
//! than trusting the graph, so usages the parsers missed still count.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::symbols::module_key;

static CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b(def|function|class|fn|new)\s+)?\b([A-Za-z_$][A-Za-z0-9_$]*)\s*\(")
        .expect("call pattern is valid")
});
static PY_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)")
        .expect("import pattern is valid")
});
static PY_FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*from\s+([\w.]+)\s+import\s+\(?([\w*, \t]+)").expect("from-import pattern is valid")
});
static JS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:([\w*{}\s,$]+?)\s+from\s+)?['"]([^'"]+)['"]"#)
        .expect("js import pattern is valid")
});
static JS_REQUIRE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#).expect("require pattern is valid")
});
static PY_BASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*class\s+\w+\s*\(([^)]*)\)").expect("class bases pattern is valid")
});
static JS_EXTENDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bclass\s+[\w$]+(?:<[^>]*>)?\s+extends\s+([\w$.]+)").expect("extends pattern is valid")
});

const NOT_CALLS: &[&str] = &[
    "if", "for", "while", "switch", "return", "catch", "with", "elif", "and", "or", "not", "in",
    "typeof", "await", "yield", "super", "lambda", "assert", "del", "except", "print",
];

/// Raw counts gathered from every file in the corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageCounts {
    /// Callee name -> call sites (`f(...)` and `obj.f(...)`)
    pub calls: HashMap<String, u32>,
    /// Uppercase-leading callee -> call sites
    pub instantiations: HashMap<String, u32>,
    /// Module, and `module.symbol`, -> import occurrences
    pub imports: HashMap<String, u32>,
    /// Base class name -> occurrences in class headers
    pub inheritances: HashMap<String, u32>,
    /// Module key -> import statements naming it
    pub module_references: HashMap<String, u32>,
}

impl UsageCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and scan every path. Unreadable or non-UTF-8 files are skipped and reported.
    pub fn scan_files<P: AsRef<Path>>(paths: &[P]) -> (Self, Vec<(PathBuf, String)>) {
        let mut counts = UsageCounts::new();
        let mut skipped = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match std::fs::read_to_string(path) {
                Ok(content) => counts.scan(&content),
                Err(e) => {
                    debug!("Skipping {} during usage scan: {}", path.display(), e);
                    skipped.push((path.to_path_buf(), e.to_string()));
                }
            }
        }
        (counts, skipped)
    }

    /// Accumulate counts from one file's content.
    pub fn scan(&mut self, content: &str) {
        for cap in CALL.captures_iter(content) {
            let keyword = cap.get(1).map(|m| m.as_str());
            if matches!(keyword, Some("def" | "function" | "class" | "fn")) {
                continue;
            }
            let name = &cap[2];
            if NOT_CALLS.contains(&name) {
                continue;
            }
            bump(&mut self.calls, name);
            if keyword == Some("new") || name.starts_with(|c: char| c.is_ascii_uppercase()) {
                bump(&mut self.instantiations, name);
            }
        }

        for cap in PY_IMPORT.captures_iter(content) {
            for item in cap[1].split(',') {
                let module = item.split_whitespace().next().unwrap_or("");
                if !module.is_empty() {
                    self.record_import(module, None);
                }
            }
        }
        for cap in PY_FROM_IMPORT.captures_iter(content) {
            let module = &cap[1];
            let symbols: Vec<&str> = cap[2]
                .split(',')
                .filter_map(|s| s.split_whitespace().next())
                .collect();
            self.record_import(module, Some(symbols.as_slice()));
        }
        for cap in JS_IMPORT.captures_iter(content) {
            let module = &cap[2];
            let symbols: Vec<&str> = cap
                .get(1)
                .map(|clause| {
                    clause
                        .as_str()
                        .split(|c: char| c == ',' || c == '{' || c == '}')
                        .filter_map(|s| s.split_whitespace().next())
                        .filter(|s| *s != "*" && *s != "as")
                        .collect()
                })
                .unwrap_or_default();
            self.record_import(module, Some(symbols.as_slice()));
        }
        for cap in JS_REQUIRE.captures_iter(content) {
            self.record_import(&cap[1], None);
        }

        for cap in PY_BASES.captures_iter(content) {
            for base in cap[1].split(',') {
                let base = base.trim();
                if base.is_empty() || base.contains('=') || base == "object" {
                    continue;
                }
                let name = base.rsplit('.').next().unwrap_or(base);
                bump(&mut self.inheritances, name);
            }
        }
        for cap in JS_EXTENDS.captures_iter(content) {
            let base = &cap[1];
            let name = base.rsplit('.').next().unwrap_or(base);
            bump(&mut self.inheritances, name);
        }
    }

    fn record_import(&mut self, module: &str, symbols: Option<&[&str]>) {
        bump(&mut self.imports, module);
        bump(&mut self.module_references, &module_key(module));
        for symbol in symbols.unwrap_or_default() {
            bump(&mut self.imports, &format!("{module}.{symbol}"));
        }
    }

    pub fn max_calls(&self) -> u32 {
        max_of(&self.calls)
    }

    pub fn max_instantiations(&self) -> u32 {
        max_of(&self.instantiations)
    }

    pub fn max_imports(&self) -> u32 {
        max_of(&self.imports)
    }

    pub fn max_inheritances(&self) -> u32 {
        max_of(&self.inheritances)
    }
}

fn bump(map: &mut HashMap<String, u32>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

fn max_of(map: &HashMap<String, u32>) -> u32 {
    map.values().copied().max().unwrap_or(0)
}
