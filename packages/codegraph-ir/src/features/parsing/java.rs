use super::FrontEnd;
use crate::shared::models::{CodegraphError, Language, Result};

pub struct JavaFrontEnd;

impl FrontEnd for JavaFrontEnd {
    fn language(&self) -> Language {
        Language::Java
    }

    fn supports_incremental(&self) -> bool {
        true
    }

    fn parse_native(&self, text: &str) -> Result<tree_sitter::Tree> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_java::language())
            .map_err(|e| CodegraphError::internal(format!("failed to load java grammar: {e}")))?;
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
    fn parses_simple_class() {
        let fe = JavaFrontEnd;
        let tree = fe
            .parse(
                "public class Main { public static void main(String[] args) {} }",
                ParseOptions::default(),
            )
            .unwrap();
        assert!(!tree.has_error());
    }
}
