//! Importance scoring of the merged graph

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

use crate::centrality::{self, MAX_ITERATIONS, PAGERANK_DAMPING};
use crate::fragment::InfraFindings;
use crate::graph::CodeGraph;
use crate::model::NodeKind;

const IN_WEIGHT: f64 = 0.4;
const OUT_WEIGHT: f64 = 0.2;
const PAGERANK_WEIGHT: f64 = 0.4;
/// Raw centralities are small; scores are doubled before clamping.
const AMPLIFICATION: f64 = 2.0;

/// Outcome of a scoring pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreReport {
    pub scored: usize,
    pub pagerank_converged: bool,
    pub warnings: Vec<String>,
}

fn type_boost(kind: NodeKind) -> f64 {
    match kind {
        NodeKind::Class => 0.3,
        NodeKind::Function => 0.1,
        NodeKind::Method => 0.05,
        _ => 0.0,
    }
}

fn connectivity_boost(in_degree: usize) -> f64 {
    if in_degree > 5 {
        0.2
    } else if in_degree > 2 {
        0.1
    } else {
        0.0
    }
}

/// Computes `importance_score` and `relevance_tags` for every node.
#[derive(Debug, Clone, Copy)]
pub struct ImportanceScorer {
    max_iterations: usize,
}

impl Default for ImportanceScorer {
    fn default() -> Self {
        ImportanceScorer {
            max_iterations: MAX_ITERATIONS,
        }
    }
}

impl ImportanceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on PageRank power iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn score(&self, graph: &mut CodeGraph, findings: &HashMap<PathBuf, InfraFindings>) -> ScoreReport {
        let adjacency = graph.adjacency();
        let in_centrality = centrality::in_degree_centrality(&adjacency);
        let out_centrality = centrality::out_degree_centrality(&adjacency);

        let mut report = ScoreReport {
            pagerank_converged: true,
            ..ScoreReport::default()
        };
        let pagerank = match centrality::pagerank(&adjacency, PAGERANK_DAMPING, self.max_iterations) {
            Ok(ranks) => ranks,
            Err(e) => {
                warn!("PageRank failed, scoring without it: {}", e);
                report.pagerank_converged = false;
                report.warnings.push(e.to_string());
                vec![0.0; adjacency.len()]
            }
        };

        for node in graph.nodes_mut() {
            let idx = node.id.0 as usize;
            let in_degree = adjacency.in_degree(idx);
            let out_degree = adjacency.out_degree(idx);

            let composite = IN_WEIGHT * in_centrality[idx]
                + OUT_WEIGHT * out_centrality[idx]
                + PAGERANK_WEIGHT * pagerank[idx];
            let raw = composite + type_boost(node.kind) + connectivity_boost(in_degree);
            node.importance_score = (raw * AMPLIFICATION).clamp(0.0, 1.0);

            let tags = &mut node.relevance_tags;
            if node.kind == NodeKind::Class {
                tags.insert("structural".to_string());
            }
            if in_degree > 3 {
                tags.insert("highly-used".to_string());
            }
            if out_degree > 3 {
                tags.insert("complex".to_string());
            }
            if node.name.to_lowercase().contains("test") {
                tags.insert("test".to_string());
            }
            if node.kind == NodeKind::File {
                tags.insert("module".to_string());
            }
            if let Some(found) = findings.get(&node.path) {
                tags.extend(found.tags());
            }
            report.scored += 1;
        }

        report
    }
}
