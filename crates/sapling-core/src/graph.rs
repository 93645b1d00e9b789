//! Graph wrapper using petgraph::StableDiGraph with NodeId mapped to node index

use crate::centrality::Adjacency;
use crate::model::*;
use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

/// The merged code graph: a directed multigraph whose node ids are the
/// petgraph indices. Nodes are never removed, so ids stay dense (0..n).
pub struct CodeGraph {
    inner: StableDiGraph<CodeNode, Relationship>,
}

impl std::fmt::Debug for CodeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl CodeGraph {
    pub fn new() -> Self {
        CodeGraph {
            inner: StableDiGraph::new(),
        }
    }

    /// Add a node to the graph. Returns the assigned NodeId, also written into the node.
    pub fn add_node(&mut self, mut node: CodeNode) -> NodeId {
        let next = NodeId(self.inner.node_count() as u64);
        node.id = next;
        let idx = self.inner.add_node(node);
        debug_assert_eq!(idx.index() as u64, next.0);
        next
    }

    /// Add an edge between two existing nodes. Returns `None` without touching
    /// the graph when either endpoint is missing.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) -> Option<EdgeIndex> {
        if !self.contains(source) || !self.contains(target) {
            return None;
        }
        let relationship = Relationship {
            source,
            target,
            kind,
            weight: kind.base_weight(),
        };
        Some(self.inner.add_edge(index(source), index(target), relationship))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.contains_node(index(id))
    }

    /// Get a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&CodeNode> {
        self.inner.node_weight(index(id))
    }

    /// Get a mutable node by ID.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut CodeNode> {
        self.inner.node_weight_mut(index(id))
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges, duplicates included.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &CodeNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Iterate mutably over all nodes.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut CodeNode> {
        self.inner.node_weights_mut()
    }

    /// Iterate over all edges.
    pub fn edges(&self) -> impl Iterator<Item = &Relationship> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Get all outgoing edges from a node.
    pub fn edges_from(&self, source: NodeId) -> impl Iterator<Item = &Relationship> {
        self.inner
            .edges_directed(index(source), Direction::Outgoing)
            .map(|edge_ref| edge_ref.weight())
    }

    /// Check if an edge exists between two nodes of a specific kind.
    pub fn has_edge_between(&self, source: NodeId, target: NodeId, kind: EdgeKind) -> bool {
        self.edges_from(source)
            .any(|e| e.target == target && e.kind == kind)
    }

    /// Find a node by name (first match).
    pub fn find_node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes().find(|n| n.name == name).map(|n| n.id)
    }

    /// Simple-digraph view: parallel edges collapse to one with weight 1.0.
    pub fn adjacency(&self) -> Adjacency {
        let mut adjacency = Adjacency::new(self.node_count());
        for edge in self.edges() {
            adjacency.add_edge(edge.source.0 as usize, edge.target.0 as usize, 1.0);
        }
        adjacency
    }
}

impl Default for CodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn index(id: NodeId) -> NodeIndex {
    NodeIndex::new(id.0 as usize)
}
