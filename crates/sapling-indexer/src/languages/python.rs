//! Python parser using tree-sitter

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use sapling_core::{FileFragment, Language, LocalId, LocalNode, NodeAttrs, NodeKind};
use tree_sitter::{Node, Parser};

use super::{FragmentBuilder, field_text, has_child_kind, position, text};
use crate::extractor::SourceParser;

pub struct PythonParser {
    parser: Parser,
}

/// Where the walk currently is.
#[derive(Clone)]
struct Scope {
    /// Receives `Contains` edges for new definitions
    container: LocalId,
    /// Receives calls made here
    caller: LocalId,
    /// Set only directly inside a class body
    class: Option<String>,
}

impl PythonParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .context("Failed to load Python grammar")?;
        Ok(Self { parser })
    }

    fn visit(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FragmentBuilder) {
        match node.kind() {
            "class_definition" => self.visit_class(node, source, scope, out),
            "function_definition" => self.visit_function(node, source, scope, out),
            "import_statement" => {
                let mut cursor = node.walk();
                for name in node.children_by_field_name("name", &mut cursor) {
                    if let Some(module) = imported_name(name, source) {
                        out.import(module, None, position(node));
                    }
                }
            }
            "import_from_statement" => {
                let Some(module) = field_text(node, "module_name", source) else {
                    return;
                };
                let mut cursor = node.walk();
                let symbols: Vec<&str> = node
                    .children_by_field_name("name", &mut cursor)
                    .filter_map(|name| imported_name(name, source))
                    .collect();
                if symbols.is_empty() {
                    out.import(module, None, position(node));
                }
                for symbol in symbols {
                    out.import(module, Some(symbol), position(node));
                }
            }
            "call" => {
                if let Some(function) = node.child_by_field_name("function") {
                    match function.kind() {
                        "identifier" => out.call(scope.caller, text(function, source)),
                        "attribute" => {
                            if let Some(attr) = field_text(function, "attribute", source) {
                                out.call(scope.caller, attr);
                            }
                        }
                        _ => {}
                    }
                }
                self.visit_children(node, source, scope, out);
            }
            _ => self.visit_children(node, source, scope, out),
        }
    }

    fn visit_children(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FragmentBuilder) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, source, scope, out);
        }
    }

    fn visit_class(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FragmentBuilder) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let bases = node
            .child_by_field_name("superclasses")
            .map(|list| superclasses(list, source))
            .unwrap_or_default();

        let (line, column) = position(node);
        let mut local = LocalNode::new(NodeKind::Class, name)
            .at(line, column)
            .with_attrs(NodeAttrs::Class { bases: bases.clone() });
        let body = node.child_by_field_name("body");
        if let Some(doc) = body.and_then(|b| docstring(b, source)) {
            local = local.with_summary(doc);
        }

        let id = out.define(local, scope.container);
        for base in &bases {
            out.inherit(id, base);
        }

        if let Some(body) = body {
            let inner = Scope {
                container: id,
                caller: id,
                class: Some(name.to_string()),
            };
            self.visit_children(body, source, &inner, out);
        }
    }

    fn visit_function(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FragmentBuilder) {
        let Some(name) = field_text(node, "name", source) else {
            return;
        };
        let params = node
            .child_by_field_name("parameters")
            .map(|p| parameters(p, source))
            .unwrap_or_default();
        let is_async = has_child_kind(node, "async");

        let (kind, attrs) = match &scope.class {
            Some(owner) => (
                NodeKind::Method,
                NodeAttrs::Method {
                    owner: owner.clone(),
                    params,
                    is_async,
                },
            ),
            None => (NodeKind::Function, NodeAttrs::Function { params, is_async }),
        };

        let (line, column) = position(node);
        let mut local = LocalNode::new(kind, name).at(line, column).with_attrs(attrs);
        let body = node.child_by_field_name("body");
        if let Some(doc) = body.and_then(|b| docstring(b, source)) {
            local = local.with_summary(doc);
        }
        let id = out.define(local, scope.container);

        if let Some(body) = body {
            let inner = Scope {
                container: id,
                caller: id,
                class: None,
            };
            self.visit_children(body, source, &inner, out);
        }
    }
}

/// Module path of a `dotted_name` or `aliased_import`.
fn imported_name<'a>(node: Node, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "dotted_name" => Some(text(node, source)),
        "aliased_import" => field_text(node, "name", source),
        _ => None,
    }
}

fn superclasses(list: Node, source: &[u8]) -> Vec<String> {
    let mut cursor = list.walk();
    list.named_children(&mut cursor)
        .filter_map(|arg| match arg.kind() {
            "identifier" => Some(text(arg, source).to_string()),
            "attribute" => field_text(arg, "attribute", source).map(str::to_string),
            // keyword arguments such as metaclass=...
            _ => None,
        })
        .filter(|base| base != "object")
        .collect()
}

fn parameters(list: Node, source: &[u8]) -> Vec<String> {
    let mut cursor = list.walk();
    list.named_children(&mut cursor)
        .filter_map(|param| match param.kind() {
            "identifier" => Some(text(param, source).to_string()),
            "default_parameter" | "typed_default_parameter" => field_text(param, "name", source).map(str::to_string),
            "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                let mut inner = param.walk();
                let name = param
                    .named_children(&mut inner)
                    .find(|c| c.kind() == "identifier")
                    .map(|c| text(c, source).to_string());
                name
            }
            _ => None,
        })
        .filter(|name| name != "self" && name != "cls")
        .collect()
}

/// First line of a leading string literal in a block.
fn docstring(body: Node, source: &[u8]) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let line = text(literal, source)
        .trim_matches(|c| c == '"' || c == '\'')
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?;
    Some(line.to_string())
}

impl SourceParser for PythonParser {
    fn parse(&mut self, path: &Path, content: &str) -> Result<FileFragment> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| anyhow!("Failed to parse {}", path.display()))?;

        let mut out = FragmentBuilder::new(path, Language::Python, content);
        let scope = Scope {
            container: FragmentBuilder::FILE,
            caller: FragmentBuilder::FILE,
            class: None,
        };
        self.visit(tree.root_node(), content.as_bytes(), &scope, &mut out);
        Ok(out.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sapling_core::EdgeKind;

    fn parse(code: &str) -> FileFragment {
        PythonParser::new().unwrap().parse(Path::new("shop.py"), code).unwrap()
    }

    fn id(fragment: &FileFragment, name: &str) -> LocalId {
        fragment
            .nodes
            .iter()
            .position(|n| n.name == name)
            .unwrap_or_else(|| panic!("missing node {name}")) as LocalId
    }

    fn has_edge(fragment: &FileFragment, source: LocalId, target: LocalId, kind: EdgeKind) -> bool {
        fragment
            .edges
            .iter()
            .any(|e| e.source == source && e.target == target && e.kind == kind)
    }

    const CODE: &str = r#"
import os
from models import Base, Item as It

class Cart(Base):
    """Holds items."""

    def add(self, item, qty=1):
        validate(item)
        self.total()

    def total(self):
        return 0

async def checkout(cart):
    helper()
    return Cart()

def helper():
    pass

helper()
"#;

    #[test]
    fn test_definitions_and_containment() {
        let fragment = parse(CODE);
        assert_eq!(fragment.nodes[0].kind, NodeKind::File);
        assert_eq!(fragment.nodes[0].name, "shop.py");

        let cart = id(&fragment, "Cart");
        let add = id(&fragment, "add");
        assert_eq!(fragment.nodes[cart as usize].kind, NodeKind::Class);
        assert_eq!(fragment.nodes[cart as usize].summary.as_deref(), Some("Holds items."));
        assert_eq!(fragment.nodes[add as usize].kind, NodeKind::Method);
        assert_eq!(
            fragment.nodes[add as usize].attrs,
            NodeAttrs::Method {
                owner: "Cart".to_string(),
                params: vec!["item".to_string(), "qty".to_string()],
                is_async: false,
            }
        );
        assert!(has_edge(&fragment, 0, cart, EdgeKind::Contains));
        assert!(has_edge(&fragment, cart, add, EdgeKind::Contains));

        let checkout = id(&fragment, "checkout");
        assert!(matches!(
            fragment.nodes[checkout as usize].attrs,
            NodeAttrs::Function { is_async: true, .. }
        ));
    }

    #[test]
    fn test_imports() {
        let fragment = parse(CODE);
        let names: Vec<&str> = fragment
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Import)
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["os", "models.Base", "models.Item"]);

        let modules: Vec<&str> = fragment
            .references
            .iter()
            .filter(|r| r.kind == EdgeKind::Imports)
            .map(|r| r.target_name.as_str())
            .collect();
        assert_eq!(modules, vec!["os", "models"]);
    }

    #[test]
    fn test_local_calls_bind_and_external_calls_defer() {
        let fragment = parse(CODE);
        let add = id(&fragment, "add");
        let total = id(&fragment, "total");
        let checkout = id(&fragment, "checkout");
        let helper = id(&fragment, "helper");
        let cart = id(&fragment, "Cart");

        assert!(has_edge(&fragment, add, total, EdgeKind::Calls));
        assert!(has_edge(&fragment, checkout, helper, EdgeKind::Calls));
        assert!(has_edge(&fragment, checkout, cart, EdgeKind::Uses));
        // Module-level call is attributed to the file.
        assert!(has_edge(&fragment, 0, helper, EdgeKind::Calls));

        assert!(
            fragment
                .references
                .iter()
                .any(|r| r.source == add && r.target_name == "validate" && r.kind == EdgeKind::Calls)
        );
        assert!(
            fragment
                .references
                .iter()
                .any(|r| r.source == cart && r.target_name == "Base" && r.kind == EdgeKind::Inherits)
        );
    }

    #[test]
    fn test_empty_file_has_only_file_node() {
        let fragment = parse("");
        assert_eq!(fragment.node_count(), 1);
        assert!(fragment.edges.is_empty());
    }

    #[test]
    fn test_local_ids_are_dense() {
        let fragment = parse(CODE);
        for edge in &fragment.edges {
            assert!((edge.source as usize) < fragment.node_count());
            assert!((edge.target as usize) < fragment.node_count());
        }
    }
}
