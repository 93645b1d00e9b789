//! SQLite persistence for the scored graph

use crate::error::{StoreError, StoreResult};
use crate::graph::CodeGraph;
use crate::model::{UsageStats, WeightedRelationship};
use rusqlite::{Connection, params};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Data directory: .sapling/
pub const DATA_DIR: &str = ".sapling";

/// Graph database file
pub const GRAPH_DB: &str = "graph.db";

/// Per-file cache database file
pub const CACHE_DB: &str = "cache.db";

/// Get data directory path
pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

/// Get graph database path
pub fn graph_db_path(root: &Path) -> PathBuf {
    root.join(DATA_DIR).join(GRAPH_DB)
}

/// Get cache database path
pub fn cache_db_path(root: &Path) -> PathBuf {
    root.join(DATA_DIR).join(CACHE_DB)
}

/// Ensure data directory exists
pub fn ensure_data_dir(root: &Path) -> std::io::Result<()> {
    let dir = data_dir(root);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Remove the data directory and everything in it
pub fn clear_data_dir(root: &Path) -> std::io::Result<()> {
    let dir = data_dir(root);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS code_nodes (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    summary TEXT,
    importance_score REAL NOT NULL DEFAULT 0,
    relevance_tags TEXT NOT NULL DEFAULT '[]',
    weight REAL NOT NULL DEFAULT 0,
    frequency_score REAL NOT NULL DEFAULT 0,
    usage_stats TEXT NOT NULL DEFAULT '{}',
    language TEXT NOT NULL,
    line INTEGER NOT NULL DEFAULT 0,
    col INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS relationships (
    source_id INTEGER NOT NULL,
    target_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    weight REAL NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_code_nodes_weight ON code_nodes(weight DESC, importance_score DESC);
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);
";

/// A node row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredNode {
    pub id: i64,
    pub kind: String,
    pub name: String,
    pub path: String,
    pub summary: Option<String>,
    pub importance_score: f64,
    pub relevance_tags: BTreeSet<String>,
    pub weight: f64,
    pub frequency_score: f64,
    pub usage_stats: UsageStats,
    pub language: String,
    pub line: u32,
    pub col: u32,
}

/// Row counts written by a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveSummary {
    pub nodes: usize,
    pub relationships: usize,
}

/// Handle to the graph database. Every call opens its own connection.
#[derive(Debug, Clone)]
pub struct GraphStore {
    path: PathBuf,
}

impl GraphStore {
    /// Open (or create) the store, applying the schema.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = GraphStore { path };
        store.connect()?.execute_batch(SCHEMA_SQL)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Replace the stored graph. Runs in a single transaction so a failure
    /// leaves the previous graph in place.
    pub fn save(&self, graph: &CodeGraph, relationships: &[WeightedRelationship]) -> StoreResult<SaveSummary> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM relationships", [])?;
        tx.execute("DELETE FROM code_nodes", [])?;

        let mut summary = SaveSummary::default();
        {
            let mut insert_node = tx.prepare(
                "INSERT INTO code_nodes (id, kind, name, path, summary, importance_score, relevance_tags,
                     weight, frequency_score, usage_stats, language, line, col)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for node in graph.nodes() {
                insert_node.execute(params![
                    node.id.0 as i64,
                    node.kind.as_str(),
                    node.name,
                    node.path.to_string_lossy().into_owned(),
                    node.summary,
                    node.importance_score,
                    serde_json::to_string(&node.relevance_tags)?,
                    node.weight,
                    node.frequency_score,
                    serde_json::to_string(&node.usage_stats)?,
                    node.language.as_str(),
                    node.line,
                    node.column,
                ])?;
                summary.nodes += 1;
            }

            let mut insert_rel = tx.prepare(
                "INSERT INTO relationships (source_id, target_id, kind, weight) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for rel in relationships {
                if !graph.contains(rel.source) || !graph.contains(rel.target) {
                    continue;
                }
                insert_rel.execute(params![
                    rel.source.0 as i64,
                    rel.target.0 as i64,
                    rel.kind.as_str(),
                    rel.weight,
                ])?;
                summary.relationships += 1;
            }
        }
        tx.commit()?;

        tracing::debug!(
            "Saved {} nodes, {} relationships to {}",
            summary.nodes,
            summary.relationships,
            self.path.display()
        );
        Ok(summary)
    }

    /// Nodes ordered by weight, then importance.
    pub fn top_nodes(&self, limit: usize) -> StoreResult<Vec<StoredNode>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, name, path, summary, importance_score, relevance_tags, weight,
                    frequency_score, usage_stats, language, line, col
             FROM code_nodes ORDER BY weight DESC, importance_score DESC, id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, f64>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, u32>(11)?,
                row.get::<_, u32>(12)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (id, kind, name, path, summary, importance_score, tags, weight, frequency_score, usage, language, line, col) =
                row?;
            nodes.push(StoredNode {
                id,
                kind,
                name,
                path,
                summary,
                importance_score,
                relevance_tags: serde_json::from_str(&tags).map_err(|e| StoreError::Corrupt {
                    table: "code_nodes",
                    reason: e.to_string(),
                })?,
                weight,
                frequency_score,
                usage_stats: serde_json::from_str(&usage).map_err(|e| StoreError::Corrupt {
                    table: "code_nodes",
                    reason: e.to_string(),
                })?,
                language,
                line,
                col,
            });
        }
        Ok(nodes)
    }

    /// `(nodes, relationships)` currently stored.
    pub fn counts(&self) -> StoreResult<(usize, usize)> {
        let conn = self.connect()?;
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM code_nodes", [], |r| r.get(0))?;
        let rels: i64 = conn.query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))?;
        Ok((nodes as usize, rels as usize))
    }

    /// `(kind, source name, target name)` for every stored relationship, sorted.
    pub fn relationship_names(&self) -> StoreResult<Vec<(String, String, String)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT r.kind, s.name, t.name FROM relationships r
             JOIN code_nodes s ON s.id = r.source_id
             JOIN code_nodes t ON t.id = r.target_id",
        )?;
        let mut names = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<(String, String, String)>, _>>()?;
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CodeNode, EdgeKind, Language, NodeKind};
    use crate::weights::weight_relationships;
    use tempfile::TempDir;

    fn sample_graph() -> CodeGraph {
        let mut graph = CodeGraph::new();
        let file = graph.add_node(CodeNode::new(NodeKind::File, "a.py", "a.py", Language::Python));
        let func = graph.add_node(CodeNode::new(NodeKind::Function, "bar", "a.py", Language::Python));
        graph.add_edge(file, func, EdgeKind::Contains);
        if let Some(node) = graph.node_mut(func) {
            node.weight = 0.9;
            node.relevance_tags.insert("test".to_string());
        }
        graph
    }

    #[test]
    fn test_save_and_query() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(graph_db_path(dir.path())).unwrap();
        let graph = sample_graph();
        let rels = weight_relationships(&graph);

        let summary = store.save(&graph, &rels).unwrap();
        assert_eq!(summary, SaveSummary { nodes: 2, relationships: 1 });

        let top = store.top_nodes(1).unwrap();
        assert_eq!(top[0].name, "bar");
        assert!(top[0].relevance_tags.contains("test"));
        assert_eq!(
            store.relationship_names().unwrap(),
            vec![("contains".to_string(), "a.py".to_string(), "bar".to_string())]
        );
    }

    #[test]
    fn test_save_replaces_previous_graph() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
        let graph = sample_graph();
        store.save(&graph, &weight_relationships(&graph)).unwrap();
        store.save(&graph, &weight_relationships(&graph)).unwrap();
        assert_eq!(store.counts().unwrap(), (2, 1));
    }

    #[test]
    fn test_failed_save_keeps_previous_graph() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(dir.path().join("graph.db")).unwrap();
        let first = sample_graph();
        store.save(&first, &weight_relationships(&first)).unwrap();
        let before = store.relationship_names().unwrap();

        store
            .connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_calls BEFORE INSERT ON relationships
                 WHEN NEW.kind = 'calls'
                 BEGIN SELECT RAISE(ABORT, 'calls rejected'); END;",
            )
            .unwrap();

        let mut second = CodeGraph::new();
        let file = second.add_node(CodeNode::new(NodeKind::File, "b.py", "b.py", Language::Python));
        let main = second.add_node(CodeNode::new(NodeKind::Function, "main", "b.py", Language::Python));
        let helper = second.add_node(CodeNode::new(NodeKind::Function, "helper", "b.py", Language::Python));
        second.add_edge(file, main, EdgeKind::Contains);
        second.add_edge(file, helper, EdgeKind::Contains);
        second.add_edge(main, helper, EdgeKind::Calls);

        assert!(matches!(
            store.save(&second, &weight_relationships(&second)),
            Err(StoreError::Sqlite(_))
        ));
        assert_eq!(store.counts().unwrap(), (2, 1));
        assert_eq!(store.relationship_names().unwrap(), before);
        let names: Vec<String> = store.top_nodes(10).unwrap().into_iter().map(|n| n.name).collect();
        assert!(names.contains(&"bar".to_string()));
        assert!(!names.contains(&"main".to_string()));
    }

    #[test]
    fn test_clear_data_dir() {
        let dir = TempDir::new().unwrap();
        ensure_data_dir(dir.path()).unwrap();
        assert!(data_dir(dir.path()).exists());
        clear_data_dir(dir.path()).unwrap();
        assert!(!data_dir(dir.path()).exists());
    }
}
