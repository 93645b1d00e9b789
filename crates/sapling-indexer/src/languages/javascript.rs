//! JavaScript and TypeScript parser using tree-sitter

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use sapling_core::{FileFragment, Language, LocalId, LocalNode, NodeAttrs, NodeKind};
use tree_sitter::{Node, Parser};

use super::{FragmentBuilder, field_text, has_child_kind, position, text};
use crate::extractor::SourceParser;

/// Grammar variant; TSX needs its own grammar for JSX inside TypeScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDialect {
    JavaScript,
    TypeScript,
    Tsx,
}

impl ScriptDialect {
    fn language(&self) -> Language {
        match self {
            ScriptDialect::JavaScript => Language::JavaScript,
            ScriptDialect::TypeScript | ScriptDialect::Tsx => Language::TypeScript,
        }
    }
}

pub struct JavaScriptParser {
    parser: Parser,
    dialect: ScriptDialect,
}

#[derive(Clone)]
struct Scope {
    container: LocalId,
    caller: LocalId,
    class: Option<String>,
}

impl JavaScriptParser {
    pub fn new(dialect: ScriptDialect) -> Result<Self> {
        let grammar = match dialect {
            ScriptDialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            ScriptDialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            ScriptDialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        };
        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .with_context(|| format!("Failed to load {dialect:?} grammar"))?;
        Ok(Self { parser, dialect })
    }

    fn visit(&self, node: Node, source: &[u8], scope: &Scope, out: &mut FragmentBuilder) {
        match node.kind() {
            "class_declaration" | "abstract_class_declaration" => self.visit_class(node, source, scope, out),
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = field_text(node, "name", source) {
                    self.visit_function(node, name, node, source, scope, out);
                }
            }
            "method_definition" => {
                if let Some(name) = field_text(node, "name", source) {
                    self.visit_function(node, name, node, source, scope, out);
                }
            }
            "variable_declarator" => {
                let name = node
                    .child_by_field_name("name")
                    .filter(|n| n.kind() == "identifier")
                    .map(|n| text(n, source));
                let value = node
                    .child_by_field_name("value")
                    .filter(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"));
                match (name, value) {
                    (Some(name), Some(value)) => self.visit_function(node, name, value, source, scope, out),
                    _ => self.visit_children(node, source, scope, out),
                }
            }
            "import_statement" => self.visit_import(node, source, out),
            "call_expression" => {
                if let Some(function) = node.child_by_field_name("function") {
                    if function.kind() == "identifier" && text(function, source) == "require" {
                        if let Some(module) = first_string_argument(node, source) {
                            out.import(&module, None, position(node));
                        }
                        return;
                    }
                    if let Some(callee) = callee_name(function, source) {
                        out.call(scope.caller, callee);
                    }
                }
                self.visit_children(node, source, scope, out);
            }
            "new_expression" => {
                if let Some(callee) = node.child_by_field_name("constructor").and_then(|c| callee_name(c, source)) {
                    out.call(scope.caller, callee);
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
        let bases = heritage(node, source);

        let (line, column) = position(node);
        let local = LocalNode::new(NodeKind::Class, name)
            .at(line, column)
            .with_attrs(NodeAttrs::Class { bases: bases.clone() });
        let id = out.define(local, scope.container);
        for base in &bases {
            out.inherit(id, base);
        }

        if let Some(body) = node.child_by_field_name("body") {
            let inner = Scope {
                container: id,
                caller: id,
                class: Some(name.to_string()),
            };
            self.visit_children(body, source, &inner, out);
        }
    }

    /// `decl` carries the position, `function` the parameters and body.
    fn visit_function(
        &self,
        decl: Node,
        name: &str,
        function: Node,
        source: &[u8],
        scope: &Scope,
        out: &mut FragmentBuilder,
    ) {
        let params = function
            .child_by_field_name("parameters")
            .map(|p| parameters(p, source))
            .or_else(|| {
                // `x => ...` has a bare identifier instead of a parameter list
                function
                    .child_by_field_name("parameter")
                    .map(|p| vec![text(p, source).to_string()])
            })
            .unwrap_or_default();
        let is_async = has_child_kind(function, "async");

        let (kind, attrs) = match (&scope.class, function.kind()) {
            (Some(owner), "method_definition") => (
                NodeKind::Method,
                NodeAttrs::Method {
                    owner: owner.clone(),
                    params,
                    is_async,
                },
            ),
            _ => (NodeKind::Function, NodeAttrs::Function { params, is_async }),
        };

        let (line, column) = position(decl);
        let local = LocalNode::new(kind, name).at(line, column).with_attrs(attrs);
        let id = out.define(local, scope.container);

        if let Some(body) = function.child_by_field_name("body") {
            let inner = Scope {
                container: id,
                caller: id,
                class: None,
            };
            self.visit(body, source, &inner, out);
        }
    }

    fn visit_import(&self, node: Node, source: &[u8], out: &mut FragmentBuilder) {
        let Some(module) = node.child_by_field_name("source").map(|s| unquote(text(s, source))) else {
            return;
        };
        let at = position(node);

        let mut symbols = Vec::new();
        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor).filter(|c| c.kind() == "import_clause") {
            let mut inner = clause.walk();
            for part in clause.named_children(&mut inner) {
                match part.kind() {
                    "identifier" => symbols.push(text(part, source).to_string()),
                    "named_imports" => {
                        let mut specs = part.walk();
                        for spec in part.named_children(&mut specs).filter(|s| s.kind() == "import_specifier") {
                            if let Some(name) = field_text(spec, "name", source) {
                                symbols.push(name.to_string());
                            }
                        }
                    }
                    // `* as ns` imports the module as a whole
                    _ => {}
                }
            }
        }

        if symbols.is_empty() {
            out.import(&module, None, at);
        }
        for symbol in &symbols {
            out.import(&module, Some(symbol), at);
        }
    }
}

/// Identifier called, or the property name of a member call.
fn callee_name<'a>(node: Node, source: &'a [u8]) -> Option<&'a str> {
    match node.kind() {
        "identifier" => Some(text(node, source)),
        "member_expression" => field_text(node, "property", source),
        _ => None,
    }
}

fn first_string_argument(call: Node, source: &[u8]) -> Option<String> {
    let args = call.child_by_field_name("arguments")?;
    let first = args.named_child(0)?;
    (first.kind() == "string").then(|| unquote(text(first, source)))
}

fn unquote(literal: &str) -> String {
    literal.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

/// Base class names from `extends`. JavaScript puts the expression directly
/// under `class_heritage`; TypeScript wraps it in an `extends_clause`.
fn heritage(class: Node, source: &[u8]) -> Vec<String> {
    let mut bases = Vec::new();
    let mut cursor = class.walk();
    for child in class.named_children(&mut cursor).filter(|c| c.kind() == "class_heritage") {
        let mut inner = child.walk();
        for part in child.named_children(&mut inner) {
            let expr = match part.kind() {
                "extends_clause" => part.child_by_field_name("value"),
                "implements_clause" => None,
                _ => Some(part),
            };
            if let Some(name) = expr.and_then(|e| base_name(e, source)) {
                bases.push(name.to_string());
            }
        }
    }
    bases
}

fn base_name<'a>(expr: Node, source: &'a [u8]) -> Option<&'a str> {
    match expr.kind() {
        "identifier" | "type_identifier" => Some(text(expr, source)),
        "member_expression" => field_text(expr, "property", source),
        _ => None,
    }
}

fn parameters(list: Node, source: &[u8]) -> Vec<String> {
    let mut cursor = list.walk();
    list.named_children(&mut cursor)
        .filter_map(|param| {
            let target = match param.kind() {
                "identifier" => Some(param),
                "assignment_pattern" => param.child_by_field_name("left"),
                "required_parameter" | "optional_parameter" => param.child_by_field_name("pattern"),
                "rest_pattern" => param.named_child(0),
                _ => None,
            }?;
            (target.kind() == "identifier").then(|| text(target, source).to_string())
        })
        .collect()
}

impl SourceParser for JavaScriptParser {
    fn parse(&mut self, path: &Path, content: &str) -> Result<FileFragment> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| anyhow!("Failed to parse {}", path.display()))?;

        let mut out = FragmentBuilder::new(path, self.dialect.language(), content);
        let scope = Scope {
            container: FragmentBuilder::FILE,
            caller: FragmentBuilder::FILE,
            class: None,
        };
        self.visit(tree.root_node(), content.as_bytes(), &scope, &mut out);
        Ok(out.finish())
    }
}
