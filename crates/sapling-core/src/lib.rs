//! Sapling Core: graph data model, merge, scoring and persistence

pub mod assembler;
pub mod centrality;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod model;
pub mod scoring;
pub mod store;
pub mod symbols;
pub mod usage;
pub mod weights;


#[cfg(test)]
pub mod test_utils;

pub use assembler::{AssembledGraph, GraphAssembler, MergeStats, assemble};
pub use error::{ScoreError, StoreError, StoreResult};
pub use fragment::{FileFragment, InfraFindings, LocalEdge, LocalId, LocalNode, PendingReference};
pub use graph::CodeGraph;
pub use model::{
    CodeNode, EdgeKind, Language, NodeAttrs, NodeId, NodeKind, Relationship, UsageStats, WeightedRelationship,
};
pub use scoring::{ImportanceScorer, ScoreReport};
pub use store::{CACHE_DB, DATA_DIR, GRAPH_DB, GraphStore, SaveSummary, StoredNode, cache_db_path, clear_data_dir, data_dir, ensure_data_dir, graph_db_path};
pub use symbols::SymbolTable;
pub use usage::UsageCounts;
pub use weights::{WeightCalculator, WeightReport, weight_relationships};
