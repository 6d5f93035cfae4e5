use super::FrontEnd;
use crate::shared::models::{CodegraphError, Language, Result};

/// Backs both `Language::JavaScript` and `Language::TypeScript`: the
/// `tree-sitter-typescript` grammar is a strict superset for parsing
/// purposes, so one front end struct serves both, distinguished only by
/// which grammar function it loads.
pub struct JavaScriptFrontEnd {
    language: Language,
}

impl JavaScriptFrontEnd {
    pub fn javascript() -> Self {
        Self {
            language: Language::JavaScript,
        }
    }

    pub fn typescript() -> Self {
        Self {
            language: Language::TypeScript,
        }
    }
}

impl FrontEnd for JavaScriptFrontEnd {
    fn language(&self) -> Language {
        self.language
    }

    fn supports_incremental(&self) -> bool {
        true
    }

    fn parse_native(&self, text: &str) -> Result<tree_sitter::Tree> {
        let mut parser = tree_sitter::Parser::new();
        let grammar = match self.language {
            Language::TypeScript => tree_sitter_typescript::language_typescript(),
            _ => tree_sitter_javascript::language(),
        };
        parser
            .set_language(&grammar)
            .map_err(|e| CodegraphError::internal(format!("failed to load grammar: {e}")))?;
        parser
            .parse(text, None)
            .ok_or_else(|| CodegraphError::parse_error("tree-sitter returned no tree"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::ParseOptions;

    #[test]
    fn parses_js_function() {
        let fe = JavaScriptFrontEnd::javascript();
        let tree = fe
            .parse("function f(x) { return x; }", ParseOptions::default())
            .unwrap();
        assert!(!tree.has_error());
    }

    #[test]
    fn parses_typed_ts_function() {
        let fe = JavaScriptFrontEnd::typescript();
        let tree = fe
            .parse("function f(x: number): number { return x; }", ParseOptions::default())
            .unwrap();
        assert!(!tree.has_error());
    }

    #[test]
    fn permissive_mode_accepts_partial_tree() {
        let fe = JavaScriptFrontEnd::javascript();
        let options = ParseOptions {
            accept_partial: true,
        };
        // Dangling open brace still yields error nodes but should be
        // accepted when the caller opts into partial trees.
        let result = fe.parse("function f(x) { return x", options);
        assert!(result.is_ok());
    }
}
