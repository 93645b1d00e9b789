//! Fallback for files without a grammar (configs, manifests, Dockerfiles)

use std::path::Path;

use anyhow::Result;
use sapling_core::{FileFragment, Language};

use super::file_fragment;
use crate::extractor::SourceParser;

/// Emits only the file node.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericParser;

impl SourceParser for GenericParser {
    fn parse(&mut self, path: &Path, content: &str) -> Result<FileFragment> {
        Ok(file_fragment(path, Language::from_path(path), content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapling_core::{NodeAttrs, NodeKind};

    #[test]
    fn test_file_node_only() {
        let fragment = GenericParser
            .parse(Path::new("deploy/docker-compose.yml"), "services:\n  db:\n    image: postgres\n")
            .unwrap();
        assert_eq!(fragment.language, Language::Yaml);
        assert_eq!(fragment.node_count(), 1);
        assert_eq!(fragment.nodes[0].kind, NodeKind::File);
        assert_eq!(fragment.nodes[0].name, "docker-compose.yml");
        assert_eq!(fragment.nodes[0].attrs, NodeAttrs::File { loc: 3 });
    }
}
