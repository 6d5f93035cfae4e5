//! Symbol table entries (spec §3 "Symbol").

use super::pir::{NodeId, SourceUnitId, SymbolId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Class,
    Method,
    Variable,
    Parameter,
    Import,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Variable => "variable",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Import => "import",
            SymbolKind::Module => "module",
        }
    }

    /// Nodes of these kinds are callable and therefore eligible as call-graph
    /// nodes (spec §3 "Call graph").
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "tsx" => Some(Language::TypeScript),
            "java" => Some(Language::Java),
            _ => None,
        }
    }
}

/// `qualified_name` follows `language::module_path::...::name` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub declaring_node: Option<NodeId>,
    pub declaring_source_unit: SourceUnitId,
    pub visibility: Visibility,
    pub language: Language,
}

/// Placeholder symbol bound to unresolved imports (spec §4.4): opaque, but
/// carries the import path so callers can still inspect where it pointed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalModuleSymbol {
    pub id: SymbolId,
    pub import_path: String,
}
