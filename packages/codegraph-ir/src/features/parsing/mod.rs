//! Language Front Ends (spec §4.2, component C2).
//!
//! One front end per language, all implementing [`FrontEnd`]. Python uses
//! tree-sitter's full grammar; JavaScript, TypeScript, and Java ride the
//! same incremental tree-sitter machinery — the spec's distinction between
//! "full syntactic parser" and "incremental grammar-driven parser" is a
//! property of the underlying grammar's error recovery, not of how this
//! layer calls it, since all four go through `tree_sitter::Parser`.

pub mod java;
pub mod javascript;
pub mod python;

use crate::shared::models::{CodegraphError, Language, Result, Span};
use crate::shared::utils::tree_sitter::node_to_span;

/// A language-specific parse tree plus enough context to re-derive spans
/// and slice text without re-parsing.
pub struct NativeTree {
    pub language: Language,
    pub tree: tree_sitter::Tree,
    pub source: String,
}

impl NativeTree {
    pub fn root(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// First error node in the tree, depth-first, if any (spec §4.2: "a
    /// parse that produces error nodes is treated as a failure in strict
    /// mode").
    pub fn first_error(&self) -> Option<tree_sitter::Node<'_>> {
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if node.is_error() || node.is_missing() {
                return Some(node);
            }
            for i in (0..node.child_count()).rev() {
                if let Some(child) = node.child(i) {
                    stack.push(child);
                }
            }
        }
        None
    }

    pub fn has_error(&self) -> bool {
        self.first_error().is_some()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Unset is equivalent to strict (spec §4.2).
    pub accept_partial: bool,
}

/// Common capability set every language front end implements (spec §4.2).
pub trait FrontEnd {
    fn language(&self) -> Language;
    fn supports_incremental(&self) -> bool;
    fn parse_native(&self, text: &str) -> Result<tree_sitter::Tree>;

    fn parse(&self, text: &str, options: ParseOptions) -> Result<NativeTree> {
        let tree = self.parse_native(text)?;
        let native = NativeTree {
            language: self.language(),
            tree,
            source: text.to_string(),
        };
        if let Some(err_node) = native.first_error() {
            if !options.accept_partial {
                let span = node_to_span(&err_node);
                return Err(parse_error_for(&native.source, span));
            }
        }
        Ok(native)
    }
}

fn parse_error_for(source: &str, span: Span) -> CodegraphError {
    let snippet: String = source
        .lines()
        .nth((span.start_line.saturating_sub(1)) as usize)
        .unwrap_or("")
        .chars()
        .take(80)
        .collect();
    CodegraphError::parse_error(format!("unexpected syntax near: {}", snippet.trim()))
        .with_location(span.start_line, span.start_col)
}

/// Dispatches to the front end for `language` (spec §4.10: one configurable
/// parse function fronting every tool, no per-tool parsing entry points).
pub fn front_end_for(language: Language) -> Box<dyn FrontEnd> {
    match language {
        Language::Python => Box::new(python::PythonFrontEnd),
        Language::JavaScript => Box::new(javascript::JavaScriptFrontEnd::javascript()),
        Language::TypeScript => Box::new(javascript::JavaScriptFrontEnd::typescript()),
        Language::Java => Box::new(java::JavaFrontEnd),
    }
}

/// Language auto-detection (spec §6): explicit argument first, then
/// shebang, then first-line heuristics, then a final-token fallback.
/// Ambiguity between candidates fails with `language_ambiguous`.
pub fn detect_language(code: &str, explicit: Option<Language>) -> Result<Language> {
    if let Some(lang) = explicit {
        return Ok(lang);
    }

    let first_line = code.lines().next().unwrap_or("");
    if first_line.starts_with("#!") {
        if first_line.contains("python") {
            return Ok(Language::Python);
        }
        if first_line.contains("node") {
            return Ok(Language::JavaScript);
        }
    }

    let mut candidates = Vec::new();
    if code.contains("def ") || code.contains("import ") && code.contains(':') {
        candidates.push(Language::Python);
    }
    if code.contains("function ") || code.contains("=>") || code.contains("const ") {
        candidates.push(Language::JavaScript);
    }
    if code.contains(": string")
        || code.contains(": number")
        || code.contains("interface ")
        || code.contains(": boolean")
    {
        candidates.push(Language::TypeScript);
    }
    if code.contains("public class ") || code.contains("public static void main") {
        candidates.push(Language::Java);
    }

    candidates.dedup();
    match candidates.len() {
        1 => Ok(candidates[0]),
        0 => Err(CodegraphError::language_ambiguous(
            "no explicit language and no recognizable syntax markers",
        )),
        _ => Err(CodegraphError::language_ambiguous(format!(
            "input matches heuristics for more than one language: {:?}",
            candidates
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_language_wins_over_heuristics() {
        let lang = detect_language("def f(): pass", Some(Language::JavaScript)).unwrap();
        assert_eq!(lang, Language::JavaScript);
    }

    #[test]
    fn python_detected_from_def_keyword() {
        let lang = detect_language("def f():\n    return 1\n", None).unwrap();
        assert_eq!(lang, Language::Python);
    }

    #[test]
    fn java_detected_from_public_class() {
        let lang = detect_language("public class Main { public static void main(String[] a) {} }", None).unwrap();
        assert_eq!(lang, Language::Java);
    }
}
