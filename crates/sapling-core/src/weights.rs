//! Usage-frequency weighting of nodes and relationships

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::centrality::{self, Adjacency, MAX_ITERATIONS, PAGERANK_DAMPING};
use crate::graph::CodeGraph;
use crate::model::{EdgeKind, NodeId, NodeKind, UsageStats, WeightedRelationship};
use crate::usage::UsageCounts;

/// Share of the blended weight kept from the usage pass.
const EXISTING_SHARE: f64 = 0.6;
const CENTRALITY_SHARE: f64 = 0.4;

/// Outcome of a weighting pass.
#[derive(Debug, Default)]
pub struct WeightReport {
    pub relationships: Vec<WeightedRelationship>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct WeightCalculator {
    refine_with_centrality: bool,
    max_iterations: usize,
}

impl WeightCalculator {
    pub fn new(refine_with_centrality: bool) -> Self {
        WeightCalculator {
            refine_with_centrality,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Cap on the iterative centrality measures used for refinement.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Assign node weights and build collapsed, weighted relationships.
    pub fn calculate(&self, graph: &mut CodeGraph, usage: &UsageCounts) -> WeightReport {
        self.weight_nodes(graph, usage);
        let relationships = weight_relationships(graph);
        let mut report = WeightReport {
            relationships,
            warnings: Vec::new(),
        };
        if self.refine_with_centrality {
            self.refine(graph, &mut report);
        }
        report
    }

    fn weight_nodes(&self, graph: &mut CodeGraph, usage: &UsageCounts) {
        let max_calls = usage.max_calls();
        let max_instantiations = usage.max_instantiations();
        let max_inheritances = usage.max_inheritances();
        let max_imports = usage.max_imports();

        for node in graph.nodes_mut() {
            let count = |map: &HashMap<String, u32>| map.get(&node.name).copied().unwrap_or(0);
            let mut stats = UsageStats::default();

            let frequency = match node.kind {
                NodeKind::Function | NodeKind::Method => {
                    stats.calls = count(&usage.calls);
                    ratio(stats.calls, max_calls) * 0.3
                }
                NodeKind::Class => {
                    stats.calls = count(&usage.calls);
                    stats.instantiations = count(&usage.instantiations);
                    stats.inheritances = count(&usage.inheritances);
                    ratio(stats.instantiations, max_instantiations) * 0.2
                        + ratio(stats.inheritances, max_inheritances) * 0.1
                }
                NodeKind::Import => {
                    stats.imports = count(&usage.imports);
                    ratio(stats.imports, max_imports) * 0.2
                }
                NodeKind::File => {
                    stats.references = node
                        .path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(crate::symbols::module_key)
                        .and_then(|key| usage.module_references.get(&key).copied())
                        .unwrap_or(0);
                    (stats.references as f64 / 10.0).min(0.3)
                }
                NodeKind::Variable => 0.0,
            };

            node.frequency_score = frequency;
            node.usage_stats = stats;
            node.weight = (node.importance_score + frequency).clamp(0.0, 1.0);
        }
    }

    /// Blend node weights with centrality computed on the weighted graph.
    fn refine(&self, graph: &mut CodeGraph, report: &mut WeightReport) {
        let mut adjacency = Adjacency::new(graph.node_count());
        for rel in &report.relationships {
            adjacency.add_edge(rel.source.0 as usize, rel.target.0 as usize, rel.weight);
        }

        let n = adjacency.len();
        let mut measures: Vec<Vec<f64>> = Vec::with_capacity(4);
        for result in [
            centrality::pagerank(&adjacency, PAGERANK_DAMPING, self.max_iterations),
            centrality::eigenvector(&adjacency, self.max_iterations),
        ] {
            measures.push(result.unwrap_or_else(|e| {
                warn!("Centrality refinement degraded: {}", e);
                report.warnings.push(e.to_string());
                vec![0.0; n]
            }));
        }
        measures.push(centrality::betweenness(&adjacency));
        measures.push(centrality::closeness(&adjacency));

        for node in graph.nodes_mut() {
            let idx = node.id.0 as usize;
            let combined = measures.iter().map(|m| m[idx]).sum::<f64>() / measures.len() as f64;
            node.weight = (EXISTING_SHARE * node.weight + CENTRALITY_SHARE * combined).clamp(0.0, 1.0);
        }
        debug!("Refined {} node weights with centrality", n);
    }
}

fn ratio(count: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        count as f64 / max as f64
    }
}

/// Collapse duplicate `(source, target, kind)` edges and weight each one.
pub fn weight_relationships(graph: &CodeGraph) -> Vec<WeightedRelationship> {
    let mut collapsed: HashMap<(NodeId, NodeId, EdgeKind), WeightedRelationship> = HashMap::new();
    let mut order = Vec::new();

    for edge in graph.edges() {
        let (Some(source), Some(target)) = (graph.node(edge.source), graph.node(edge.target)) else {
            continue;
        };
        let key = (edge.source, edge.target, edge.kind);
        let entry = collapsed.entry(key).or_insert_with(|| {
            order.push(key);
            WeightedRelationship {
                source: edge.source,
                target: edge.target,
                kind: edge.kind,
                weight: 0.0,
                occurrences: 0,
                contexts: Default::default(),
            }
        });
        entry.occurrences += 1;
        entry.contexts.insert((source.kind, target.kind));
    }

    let max_occurrences = collapsed.values().map(|r| r.occurrences).max().unwrap_or(0);
    order
        .into_iter()
        .filter_map(|key| collapsed.remove(&key))
        .map(|mut rel| {
            let endpoint_weight = match (graph.node(rel.source), graph.node(rel.target)) {
                (Some(s), Some(t)) => (s.weight + t.weight) / 4.0,
                _ => 0.0,
            };
            let weight = rel.kind.base_weight()
                + ratio(rel.occurrences, max_occurrences) * 0.5
                + endpoint_weight;
            rel.weight = weight.clamp(0.0, 1.0);
            rel
        })
        .collect()
}
