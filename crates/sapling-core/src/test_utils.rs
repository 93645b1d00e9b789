//! Test utilities for Sapling core

use crate::fragment::{FileFragment, LocalId, LocalNode};
use crate::model::{EdgeKind, Language, NodeKind};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Create a repository with a specific file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }

        fs::write(&full_path, content).unwrap();
    }

    temp_dir
}

/// A fragment with a file node (local id 0) containing one node per `(kind, name)`.
pub fn fragment_with(path: impl AsRef<Path>, members: &[(NodeKind, &str)]) -> FileFragment {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut fragment = FileFragment::new(path, Language::from_path(path));
    let file = fragment.add_node(LocalNode::new(NodeKind::File, name));
    for (kind, member) in members {
        let id = fragment.add_node(LocalNode::new(*kind, *member));
        fragment.add_edge(file, id, EdgeKind::Contains);
    }
    fragment
}

/// Local id of the first member with the given name.
pub fn local(fragment: &FileFragment, name: &str) -> LocalId {
    fragment
        .nodes
        .iter()
        .position(|n| n.name == name)
        .map(|i| i as LocalId)
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_repo_with_structure() {
        let temp_dir = create_repo_with_structure(&[("src/a.py", "x = 1\n"), ("b.js", "")]);
        assert!(temp_dir.path().join("src/a.py").exists());
        assert!(temp_dir.path().join("b.js").exists());
    }

    #[test]
    fn test_fragment_with_members() {
        let fragment = fragment_with("a.py", &[(NodeKind::Class, "Foo"), (NodeKind::Function, "bar")]);
        assert_eq!(fragment.node_count(), 3);
        assert_eq!(fragment.edge_count(), 2);
        assert_eq!(local(&fragment, "bar"), 2);
    }
}
