//! Per-file graph fragments produced by parsing
//!
//! A fragment numbers its nodes locally (0..n). The numbering is only meaningful
//! inside the fragment; `GraphAssembler` assigns global ids at merge time.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{EdgeKind, Language, NodeAttrs, NodeKind};

/// Index of a node inside its fragment.
pub type LocalId = u32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNode {
    pub kind: NodeKind,
    pub name: String,
    pub summary: Option<String>,
    pub line: u32,
    pub column: u32,
    pub attrs: NodeAttrs,
}

impl LocalNode {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        LocalNode {
            kind,
            name: name.into(),
            summary: None,
            line: 0,
            column: 0,
            attrs: NodeAttrs::None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_attrs(mut self, attrs: NodeAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEdge {
    pub source: LocalId,
    pub target: LocalId,
    pub kind: EdgeKind,
}

/// A reference to a name the parser could not resolve inside the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReference {
    pub source: LocalId,
    pub target_name: String,
    pub kind: EdgeKind,
}

/// Infrastructure and environment patterns detected in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct InfraFindings {
    pub database: bool,
    pub api: bool,
    pub messaging: bool,
    pub cloud: bool,
    pub devops: bool,
    /// Environment keywords matched in connection strings.
    pub environments: BTreeSet<String>,
}

impl InfraFindings {
    pub fn is_empty(&self) -> bool {
        !(self.database || self.api || self.messaging || self.cloud || self.devops)
            && self.environments.is_empty()
    }

    /// Relevance tags contributed to every node of the file.
    pub fn tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        for (present, tag) in [
            (self.database, "database"),
            (self.api, "api"),
            (self.messaging, "messaging"),
            (self.cloud, "cloud"),
            (self.devops, "devops"),
        ] {
            if present {
                tags.insert(tag.to_string());
            }
        }
        for env in &self.environments {
            tags.insert(format!("profile:{env}"));
        }
        tags
    }
}

/// Everything one file contributes to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFragment {
    pub path: PathBuf,
    pub language: Language,
    pub nodes: Vec<LocalNode>,
    pub edges: Vec<LocalEdge>,
    pub references: Vec<PendingReference>,
    pub findings: InfraFindings,
}

impl FileFragment {
    pub fn new(path: impl Into<PathBuf>, language: Language) -> Self {
        FileFragment {
            path: path.into(),
            language,
            nodes: Vec::new(),
            edges: Vec::new(),
            references: Vec::new(),
            findings: InfraFindings::default(),
        }
    }

    /// Add a node and return its local id.
    pub fn add_node(&mut self, node: LocalNode) -> LocalId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as LocalId
    }

    pub fn add_edge(&mut self, source: LocalId, target: LocalId, kind: EdgeKind) {
        self.edges.push(LocalEdge { source, target, kind });
    }

    pub fn add_reference(&mut self, source: LocalId, target_name: impl Into<String>, kind: EdgeKind) {
        self.references.push(PendingReference {
            source,
            target_name: target_name.into(),
            kind,
        });
    }

    pub fn node(&self, id: LocalId) -> Option<&LocalNode> {
        self.nodes.get(id as usize)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Find the first local node with the given name and one of the given kinds.
    pub fn find_local(&self, name: &str, kinds: &[NodeKind]) -> Option<LocalId> {
        self.nodes
            .iter()
            .position(|n| n.name == name && kinds.contains(&n.kind))
            .map(|idx| idx as LocalId)
    }
}
