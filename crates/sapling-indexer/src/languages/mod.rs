//! Tree-sitter parsers producing file fragments

pub mod generic;
pub mod javascript;
pub mod python;

use std::collections::HashSet;
use std::path::Path;

use sapling_core::{EdgeKind, FileFragment, Language, LocalId, LocalNode, NodeAttrs, NodeKind};
use tree_sitter::Node;

pub use generic::GenericParser;
pub use javascript::{JavaScriptParser, ScriptDialect};
pub use python::PythonParser;

/// 1-based line and 0-based column of a syntax node.
pub(crate) fn position(node: Node) -> (u32, u32) {
    let point = node.start_position();
    (point.row as u32 + 1, point.column as u32)
}

pub(crate) fn text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

pub(crate) fn field_text<'a>(node: Node, field: &str, source: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name(field)
        .map(|child| text(child, source))
        .filter(|s| !s.is_empty())
}

pub(crate) fn has_child_kind(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| child.kind() == kind);
    found
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The file node every fragment starts with.
pub(crate) fn file_fragment(path: &Path, language: Language, content: &str) -> FileFragment {
    let mut fragment = FileFragment::new(path, language);
    fragment.add_node(
        LocalNode::new(NodeKind::File, file_name(path)).with_attrs(NodeAttrs::File {
            loc: content.lines().count() as u32,
        }),
    );
    fragment
}

/// Accumulates a fragment while walking a tree. Calls and base classes are
/// held back until the walk ends so they can bind to definitions anywhere in
/// the file; names still unknown then become cross-file references.
pub(crate) struct FragmentBuilder {
    fragment: FileFragment,
    calls: Vec<(LocalId, String)>,
    bases: Vec<(LocalId, String)>,
    imported_modules: HashSet<String>,
}

impl FragmentBuilder {
    pub const FILE: LocalId = 0;

    pub fn new(path: &Path, language: Language, content: &str) -> Self {
        FragmentBuilder {
            fragment: file_fragment(path, language, content),
            calls: Vec::new(),
            bases: Vec::new(),
            imported_modules: HashSet::new(),
        }
    }

    /// Add a definition contained in `parent`.
    pub fn define(&mut self, node: LocalNode, parent: LocalId) -> LocalId {
        let id = self.fragment.add_node(node);
        self.fragment.add_edge(parent, id, EdgeKind::Contains);
        id
    }

    /// Record `import module` or `from module import symbol`.
    pub fn import(&mut self, module: &str, symbol: Option<&str>, (line, column): (u32, u32)) {
        let name = match symbol {
            Some(symbol) => format!("{module}.{symbol}"),
            None => module.to_string(),
        };
        let node = LocalNode::new(NodeKind::Import, name)
            .at(line, column)
            .with_attrs(NodeAttrs::Import {
                module: module.to_string(),
                symbol: symbol.map(str::to_string),
            });
        let id = self.fragment.add_node(node);
        self.fragment.add_edge(Self::FILE, id, EdgeKind::Imports);

        if self.imported_modules.insert(module.to_string()) {
            self.fragment.add_reference(Self::FILE, module, EdgeKind::Imports);
        }
    }

    pub fn call(&mut self, caller: LocalId, callee: &str) {
        if !callee.is_empty() {
            self.calls.push((caller, callee.to_string()));
        }
    }

    pub fn inherit(&mut self, class: LocalId, base: &str) {
        if !base.is_empty() {
            self.bases.push((class, base.to_string()));
        }
    }

    pub fn finish(mut self) -> FileFragment {
        for (caller, callee) in std::mem::take(&mut self.calls) {
            let local = self
                .fragment
                .find_local(&callee, &[NodeKind::Function, NodeKind::Method, NodeKind::Class]);
            match local {
                Some(target) if target == caller => {}
                Some(target) => {
                    let kind = match self.fragment.node(target).map(|n| n.kind) {
                        Some(NodeKind::Class) => EdgeKind::Uses,
                        _ => EdgeKind::Calls,
                    };
                    self.fragment.add_edge(caller, target, kind);
                }
                None => self.fragment.add_reference(caller, callee, EdgeKind::Calls),
            }
        }

        for (class, base) in std::mem::take(&mut self.bases) {
            match self.fragment.find_local(&base, &[NodeKind::Class]) {
                Some(target) if target != class => self.fragment.add_edge(class, target, EdgeKind::Inherits),
                Some(_) => {}
                None => self.fragment.add_reference(class, base, EdgeKind::Inherits),
            }
        }

        self.fragment
    }
}
