use super::FrontEnd;
use crate::shared::models::{CodegraphError, Language, Result};

pub struct PythonFrontEnd;

impl FrontEnd for PythonFrontEnd {
    fn language(&self) -> Language {
        Language::Python
    }

    fn supports_incremental(&self) -> bool {
        false
    }

    fn parse_native(&self, text: &str) -> Result<tree_sitter::Tree> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_python::language())
            .map_err(|e| CodegraphError::internal(format!("failed to load python grammar: {e}")))?;
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
    fn parses_simple_function() {
        let fe = PythonFrontEnd;
        let tree = fe.parse("def f(x):\n    return x\n", ParseOptions::default()).unwrap();
        assert!(!tree.has_error());
    }

    #[test]
    fn strict_mode_rejects_syntax_errors() {
        let fe = PythonFrontEnd;
        let result = fe.parse("def f(:\n", ParseOptions::default());
        assert!(result.is_err());
    }
}
