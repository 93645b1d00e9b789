//! Merges per-file fragments into one graph with globally unique node ids

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fragment::{FileFragment, InfraFindings, LocalId};
use crate::graph::CodeGraph;
use crate::model::{CodeNode, EdgeKind, NodeId, NodeKind};
use crate::symbols::{SymbolEntry, SymbolTable, module_key};

/// Counters describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub fragments: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Local edges with an endpoint missing from the fragment.
    pub dropped_edges: usize,
    pub resolved_references: usize,
    pub unresolved_references: usize,
    pub ambiguous_references: usize,
}

/// Result of a finished merge.
#[derive(Debug)]
pub struct AssembledGraph {
    pub graph: CodeGraph,
    pub findings: HashMap<PathBuf, InfraFindings>,
    pub stats: MergeStats,
}

struct Pending {
    source: NodeId,
    path: PathBuf,
    target_name: String,
    kind: EdgeKind,
}

/// Single-threaded merge of fragments arriving in any order.
pub struct GraphAssembler {
    graph: CodeGraph,
    symbols: SymbolTable,
    pending: Vec<Pending>,
    /// File path -> module keys the file imports
    imports_by_file: HashMap<PathBuf, HashSet<String>>,
    findings: HashMap<PathBuf, InfraFindings>,
    stats: MergeStats,
}

impl GraphAssembler {
    pub fn new() -> Self {
        GraphAssembler {
            graph: CodeGraph::new(),
            symbols: SymbolTable::new(),
            pending: Vec::new(),
            imports_by_file: HashMap::new(),
            findings: HashMap::new(),
            stats: MergeStats::default(),
        }
    }

    /// Copy a fragment into the graph, renumbering its local ids.
    pub fn merge(&mut self, fragment: &FileFragment) {
        let mut mapping: HashMap<LocalId, NodeId> = HashMap::with_capacity(fragment.nodes.len());

        for (local, node) in fragment.nodes.iter().enumerate() {
            let mut code = CodeNode::new(node.kind, node.name.clone(), fragment.path.clone(), fragment.language);
            code.summary = node.summary.clone();
            code.line = node.line;
            code.column = node.column;
            code.attrs = node.attrs.clone();

            let id = self.graph.add_node(code);
            mapping.insert(local as LocalId, id);
            self.stats.nodes += 1;

            if node.kind.is_definition() {
                self.symbols.insert_definition(&node.name, id, node.kind, &fragment.path);
            } else if node.kind == NodeKind::File {
                self.symbols.insert_module(&fragment.path, id);
            }
        }

        for edge in &fragment.edges {
            let endpoints = (mapping.get(&edge.source), mapping.get(&edge.target));
            match endpoints {
                (Some(&source), Some(&target)) => {
                    self.graph.add_edge(source, target, edge.kind);
                    self.stats.edges += 1;
                }
                _ => {
                    debug!(
                        "Dropping dangling edge {} -> {} in {}",
                        edge.source,
                        edge.target,
                        fragment.path.display()
                    );
                    self.stats.dropped_edges += 1;
                }
            }
        }

        for reference in &fragment.references {
            let Some(&source) = mapping.get(&reference.source) else {
                self.stats.unresolved_references += 1;
                continue;
            };
            if reference.kind == EdgeKind::Imports {
                self.imports_by_file
                    .entry(fragment.path.clone())
                    .or_default()
                    .insert(module_key(&reference.target_name));
            }
            self.pending.push(Pending {
                source,
                path: fragment.path.clone(),
                target_name: reference.target_name.clone(),
                kind: reference.kind,
            });
        }

        if !fragment.findings.is_empty() {
            self.findings
                .insert(fragment.path.clone(), fragment.findings.clone());
        }
        self.stats.fragments += 1;
    }

    /// Resolve cross-file references and hand back the graph.
    pub fn finish(mut self) -> AssembledGraph {
        self.resolve_references();
        debug!(
            "Merged {} fragments: {} nodes, {} edges ({} dropped), {} references resolved",
            self.stats.fragments,
            self.stats.nodes,
            self.stats.edges,
            self.stats.dropped_edges,
            self.stats.resolved_references
        );
        AssembledGraph {
            graph: self.graph,
            findings: self.findings,
            stats: self.stats,
        }
    }

    fn resolve_references(&mut self) {
        for pending in std::mem::take(&mut self.pending) {
            let mut candidates = match pending.kind {
                EdgeKind::Imports => self.symbols.lookup_module(&pending.target_name),
                EdgeKind::Inherits => self
                    .symbols
                    .lookup_definitions(&pending.target_name, |k| k == NodeKind::Class),
                EdgeKind::Calls | EdgeKind::Uses => self
                    .symbols
                    .lookup_definitions(&pending.target_name, |k| k.is_definition()),
                EdgeKind::Contains => Vec::new(),
            };
            candidates.retain(|c| c.node != pending.source);

            match self.choose(&pending.path, candidates) {
                Some(target) => {
                    let kind = if pending.kind == EdgeKind::Calls && target.kind == NodeKind::Class {
                        EdgeKind::Uses
                    } else {
                        pending.kind
                    };
                    self.graph.add_edge(pending.source, target.node, kind);
                    self.stats.edges += 1;
                    self.stats.resolved_references += 1;
                }
                None => self.stats.unresolved_references += 1,
            }
        }
    }

    /// Pick a single target. Several candidates are narrowed to the modules the
    /// referencing file imports; anything still ambiguous is left unresolved.
    fn choose(&mut self, path: &Path, mut candidates: Vec<SymbolEntry>) -> Option<SymbolEntry> {
        if candidates.len() <= 1 {
            return candidates.pop();
        }
        let imported = self.imports_by_file.get(path);
        let mut narrowed: Vec<SymbolEntry> = candidates
            .into_iter()
            .filter(|c| {
                let key = c
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(module_key);
                matches!((imported, key), (Some(set), Some(key)) if set.contains(&key))
            })
            .collect();
        if narrowed.len() == 1 {
            return narrowed.pop();
        }
        self.stats.ambiguous_references += 1;
        None
    }
}

impl Default for GraphAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge fragments in the order given.
pub fn assemble<'a>(fragments: impl IntoIterator<Item = &'a FileFragment>) -> AssembledGraph {
    let mut assembler = GraphAssembler::new();
    for fragment in fragments {
        assembler.merge(fragment);
    }
    assembler.finish()
}
