//! Core data structures for the code graph

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Run-scoped identifier for a merged node. Not stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Class,
    Function,
    Method,
    Import,
    Variable,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Import => "import",
            NodeKind::Variable => "variable",
        }
    }

    /// Whether nodes of this kind can be the target of a call or inheritance reference.
    pub fn is_definition(&self) -> bool {
        matches!(self, NodeKind::Class | NodeKind::Function | NodeKind::Method)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(NodeKind::File),
            "class" => Ok(NodeKind::Class),
            "function" => Ok(NodeKind::Function),
            "method" => Ok(NodeKind::Method),
            "import" => Ok(NodeKind::Import),
            "variable" => Ok(NodeKind::Variable),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// What kind of relationship this edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    Contains,
    Imports,
    Calls,
    Inherits,
    Uses,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "contains",
            EdgeKind::Imports => "imports",
            EdgeKind::Calls => "calls",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Uses => "uses",
        }
    }

    /// Starting weight of a relationship before usage and endpoint weights are added.
    pub fn base_weight(&self) -> f64 {
        match self {
            EdgeKind::Imports => 0.3,
            EdgeKind::Calls => 0.5,
            EdgeKind::Inherits => 0.7,
            EdgeKind::Contains => 0.4,
            EdgeKind::Uses => 0.6,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(EdgeKind::Contains),
            "imports" => Ok(EdgeKind::Imports),
            "calls" => Ok(EdgeKind::Calls),
            "inherits" => Ok(EdgeKind::Inherits),
            "uses" => Ok(EdgeKind::Uses),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a stored string does not name a known kind or language.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// Languages recognised by the file walker and parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    Yaml,
    Toml,
    Json,
    Sql,
    Dockerfile,
    Markdown,
    Other,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("pyi") => Language::Python,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            Some("ts") | Some("tsx") => Language::TypeScript,
            Some("rs") => Language::Rust,
            Some("go") => Language::Go,
            Some("java") => Language::Java,
            Some("c") | Some("h") => Language::C,
            Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => Language::Cpp,
            Some("yml") | Some("yaml") => Language::Yaml,
            Some("toml") => Language::Toml,
            Some("json") | Some("jsonc") => Language::Json,
            Some("sql") => Language::Sql,
            Some("md") | Some("mdx") => Language::Markdown,
            _ => {
                if path.file_name().map_or(false, |n| {
                    let s = n.to_string_lossy();
                    s == "Dockerfile" || s.starts_with("Dockerfile.")
                }) {
                    Language::Dockerfile
                } else {
                    Language::Other
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Json => "json",
            Language::Sql => "sql",
            Language::Dockerfile => "dockerfile",
            Language::Markdown => "markdown",
            Language::Other => "other",
        }
    }
}

impl FromStr for Language {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = match s {
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "rust" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "yaml" => Language::Yaml,
            "toml" => Language::Toml,
            "json" => Language::Json,
            "sql" => Language::Sql,
            "dockerfile" => Language::Dockerfile,
            "markdown" => Language::Markdown,
            "other" => Language::Other,
            other => return Err(UnknownVariant(other.to_string())),
        };
        Ok(lang)
    }
}

/// Kind-specific attributes attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum NodeAttrs {
    #[default]
    None,
    File {
        loc: u32,
    },
    Class {
        bases: Vec<String>,
    },
    Function {
        params: Vec<String>,
        is_async: bool,
    },
    Method {
        owner: String,
        params: Vec<String>,
        is_async: bool,
    },
    Import {
        module: String,
        symbol: Option<String>,
    },
}

/// Raw usage counts behind a node's frequency weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UsageStats {
    pub calls: u32,
    pub instantiations: u32,
    pub inheritances: u32,
    pub imports: u32,
    pub references: u32,
}

/// A single node in the merged code graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub path: PathBuf,
    pub summary: Option<String>,
    /// Centrality-derived score in `[0, 1]`.
    pub importance_score: f64,
    pub relevance_tags: BTreeSet<String>,
    /// `importance_score` refined by corpus-wide usage, in `[0, 1]`.
    pub weight: f64,
    pub frequency_score: f64,
    pub usage_stats: UsageStats,
    pub language: Language,
    pub line: u32,
    pub column: u32,
    pub attrs: NodeAttrs,
}

impl CodeNode {
    pub fn new(kind: NodeKind, name: impl Into<String>, path: impl Into<PathBuf>, language: Language) -> Self {
        CodeNode {
            id: NodeId::default(),
            kind,
            name: name.into(),
            path: path.into(),
            summary: None,
            importance_score: 0.0,
            relevance_tags: BTreeSet::new(),
            weight: 0.0,
            frequency_score: 0.0,
            usage_stats: UsageStats::default(),
            language,
            line: 0,
            column: 0,
            attrs: NodeAttrs::None,
        }
    }
}

/// A directed edge in the merged code graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub weight: f64,
}

/// Duplicate `(source, target, kind)` relationships collapsed into one weighted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRelationship {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub weight: f64,
    pub occurrences: u32,
    /// Observed `(source kind, target kind)` pairs.
    pub contexts: BTreeSet<(NodeKind, NodeKind)>,
}
