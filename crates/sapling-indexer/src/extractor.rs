//! Parser trait and the per-worker parser toolchain

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use sapling_core::{FileFragment, Language};

use crate::infra;
use crate::languages::{GenericParser, JavaScriptParser, PythonParser, ScriptDialect};

/// Turns one file's content into a locally numbered fragment.
///
/// Implementations own mutable parser state and are never shared between
/// workers; each worker builds its own through a [`ParserFactory`].
pub trait SourceParser {
    fn parse(&mut self, path: &Path, content: &str) -> Result<FileFragment>;
}

/// Builds a fresh parser inside each worker thread.
pub type ParserFactory = Arc<dyn Fn() -> Result<Box<dyn SourceParser>> + Send + Sync>;

/// Factory for the default [`Toolchain`].
pub fn default_factory() -> ParserFactory {
    Arc::new(|| Ok(Box::new(Toolchain::new()?) as Box<dyn SourceParser>))
}

/// Dispatches on file language and attaches infrastructure findings.
pub struct Toolchain {
    python: PythonParser,
    javascript: JavaScriptParser,
    typescript: JavaScriptParser,
    tsx: JavaScriptParser,
    generic: GenericParser,
}

impl Toolchain {
    pub fn new() -> Result<Self> {
        Ok(Toolchain {
            python: PythonParser::new()?,
            javascript: JavaScriptParser::new(ScriptDialect::JavaScript)?,
            typescript: JavaScriptParser::new(ScriptDialect::TypeScript)?,
            tsx: JavaScriptParser::new(ScriptDialect::Tsx)?,
            generic: GenericParser,
        })
    }

    fn parser_for(&mut self, path: &Path) -> &mut dyn SourceParser {
        match Language::from_path(path) {
            Language::Python => &mut self.python,
            Language::JavaScript => &mut self.javascript,
            Language::TypeScript if path.extension().is_some_and(|e| e == "tsx") => &mut self.tsx,
            Language::TypeScript => &mut self.typescript,
            _ => &mut self.generic,
        }
    }
}

impl SourceParser for Toolchain {
    fn parse(&mut self, path: &Path, content: &str) -> Result<FileFragment> {
        let mut fragment = self.parser_for(path).parse(path, content)?;
        fragment.findings = infra::detect(path, content);
        Ok(fragment)
    }
}
