//! `extract_code`, `update_symbol`, `rename_symbol` (spec §6, component
//! C8): locate a named node and either return its source text or apply a
//! validated rewrite back to disk.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::dispatcher::{
    module_path_for, parse_and_resolve, validate_path, OpExtras, RequestContext, ToolDispatcher,
    ToolResponse,
};
use crate::features::extract_update::{
    apply_update, extract_code as extract_code_impl, write_update, DependencySnippet,
    ExtractOptions, TargetType, UpdateOperation,
};
use crate::features::parsing::detect_language;
use crate::shared::models::symbol::Language;
use crate::shared::models::{CodegraphError, Result};

fn parse_target_type(raw: &str) -> Result<TargetType> {
    match raw {
        "function" => Ok(TargetType::Function),
        "class" => Ok(TargetType::Class),
        "method" => Ok(TargetType::Method),
        other => Err(CodegraphError::invalid_argument(format!("unknown target_type '{other}'"))),
    }
}

fn parse_update_operation(raw: &str) -> Result<UpdateOperation> {
    match raw {
        "replace" => Ok(UpdateOperation::Replace),
        "delete" => Ok(UpdateOperation::Delete),
        "rename" => Ok(UpdateOperation::Rename),
        other => Err(CodegraphError::invalid_argument(format!("unknown operation '{other}'"))),
    }
}

/// Reads and resolves the file at `path` the same way `get_file_context`
/// does: validate, detect language from extension, parse, resolve symbols.
fn load_unit(
    dispatcher: &ToolDispatcher,
    path: &Path,
) -> Result<(PathBuf, String, Language, crate::shared::models::pir::Program)> {
    let resolved = validate_path(path, &dispatcher.config.allowed_roots, false)?;
    let text = std::fs::read_to_string(&resolved)?;
    let ext = resolved.extension().and_then(|e| e.to_str()).unwrap_or("");
    let language = Language::from_extension(ext)
        .ok_or_else(|| CodegraphError::unsupported_language(format!("no front end for extension '{ext}'")))?;
    let module_root = resolved.parent().unwrap_or_else(|| Path::new("."));
    let module_path = module_path_for(module_root, &resolved);
    let (program, _table, _report) =
        parse_and_resolve(&text, language, &dispatcher.config.sanitizer_policy, true, &module_path)?;
    Ok((resolved, text, language, program))
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencySnippetData {
    pub qualified_name: String,
    pub code: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl From<&DependencySnippet> for DependencySnippetData {
    fn from(d: &DependencySnippet) -> Self {
        Self { qualified_name: d.qualified_name.clone(), code: d.code.clone(), start_line: d.start_line, end_line: d.end_line }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractCodeData {
    pub code: String,
    pub start_line: u32,
    pub end_line: u32,
    pub token_estimate: usize,
    pub dependencies: Vec<DependencySnippetData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateSymbolData {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

impl ToolDispatcher {
    /// `extract_code` (spec §6, §4.8): locate `(target_type, target_name)`
    /// in `code` (an inline snippet) or the file at `path`, and return its
    /// source text plus, when requested, the declarations it depends on
    /// (`opts.include_context`). Cross-file dependency chasing
    /// (`include_cross_file`) is left to `get_cross_file_dependencies`,
    /// which already walks import boundaries project-wide.
    pub fn extract_code(
        &self,
        ctx: &RequestContext,
        target_type: &str,
        target_name: &str,
        code: Option<&str>,
        path: Option<&Path>,
        language: Option<Language>,
        opts: ExtractOptions,
    ) -> ToolResponse {
        self.run("extract_code", ctx, || {
            let mut extras = OpExtras::default();
            let result: Result<ExtractCodeData> = (|| {
                let target_type = parse_target_type(target_type)?;

                let (text, table, program) = match (code, path) {
                    (Some(code), _) => {
                        let language = detect_language(code, language)?;
                        let (program, table, report) =
                            parse_and_resolve(code, language, &self.config.sanitizer_policy, true, "inline")?;
                        if report.modified {
                            extras.warnings.push("source was sanitized before parsing".to_string());
                        }
                        extras.sanitization = Some(report);
                        (code.to_string(), table, program)
                    }
                    (None, Some(path)) => {
                        let resolved = validate_path(path, &self.config.allowed_roots, false)?;
                        let text = std::fs::read_to_string(&resolved)?;
                        let ext = resolved.extension().and_then(|e| e.to_str()).unwrap_or("");
                        let language = Language::from_extension(ext).ok_or_else(|| {
                            CodegraphError::unsupported_language(format!("no front end for extension '{ext}'"))
                        })?;
                        let module_root = resolved.parent().unwrap_or_else(|| Path::new("."));
                        let module_path = module_path_for(module_root, &resolved);
                        let (program, table, _report) =
                            parse_and_resolve(&text, language, &self.config.sanitizer_policy, true, &module_path)?;
                        (text, table, program)
                    }
                    (None, None) => {
                        return Err(CodegraphError::invalid_argument("extract_code requires either `code` or `path`"));
                    }
                };

                let result = extract_code_impl(&program, &text, &table, target_type, target_name, opts)?;
                Ok(ExtractCodeData {
                    code: result.code,
                    start_line: result.start_line,
                    end_line: result.end_line,
                    token_estimate: result.token_estimate,
                    dependencies: result.dependencies.iter().map(DependencySnippetData::from).collect(),
                })
            })();
            (result, extras)
        })
    }

    /// `update_symbol` (spec §6, §4.8): replace or delete the node matching
    /// `(target_type, target_name)` in the file at `path`. Rename goes
    /// through [`ToolDispatcher::rename_symbol`] instead, which requires
    /// `new_name` rather than `new_code`.
    pub fn update_symbol(
        &self,
        ctx: &RequestContext,
        path: &Path,
        target_type: &str,
        target_name: &str,
        new_code: Option<&str>,
        operation: &str,
        write_backup: bool,
    ) -> ToolResponse {
        self.run("update_symbol", ctx, || {
            let extras = OpExtras::default();
            let result: Result<UpdateSymbolData> = (|| {
                let target_type = parse_target_type(target_type)?;
                let operation = parse_update_operation(operation)?;
                if operation == UpdateOperation::Rename {
                    return Err(CodegraphError::invalid_argument("use rename_symbol for rename operations"));
                }
                let (resolved, text, language, program) = load_unit(self, path)?;
                let new_text =
                    apply_update(&program, &text, language, target_type, target_name, operation, new_code, None)?;
                let update = write_update(&resolved, &new_text, write_backup)?;
                Ok(UpdateSymbolData { success: true, backup_path: update.backup_path.map(|p| p.display().to_string()) })
            })();
            (result, extras)
        })
    }

    /// `rename_symbol` (spec §6, §4.8 "Rename caveat"): rewrite only the
    /// defining identifier of `(target_type, target_name)` to `new_name`.
    /// Community operation rewrites only the declaration; a project-wide
    /// rename composes this with `get_symbol_references` at the caller.
    pub fn rename_symbol(
        &self,
        ctx: &RequestContext,
        path: &Path,
        target_type: &str,
        target_name: &str,
        new_name: &str,
        write_backup: bool,
    ) -> ToolResponse {
        self.run("rename_symbol", ctx, || {
            let extras = OpExtras::default();
            let result: Result<UpdateSymbolData> = (|| {
                let target_type = parse_target_type(target_type)?;
                let (resolved, text, language, program) = load_unit(self, path)?;
                let new_text = apply_update(
                    &program,
                    &text,
                    language,
                    target_type,
                    target_name,
                    UpdateOperation::Rename,
                    None,
                    Some(new_name),
                )?;
                let update = write_update(&resolved, &new_text, write_backup)?;
                Ok(UpdateSymbolData { success: true, backup_path: update.backup_path.map(|p| p.display().to_string()) })
            })();
            (result, extras)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalpelConfig;

    const FILE: &str = "def helper():\n    return 1\n\n\ndef process_order(o):\n    return helper() + o\n";

    #[test]
    fn extract_code_from_inline_snippet() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response = dispatcher.extract_code(
            &ctx,
            "function",
            "process_order",
            Some(FILE),
            None,
            Some(Language::Python),
            ExtractOptions::default(),
        );
        assert!(response.success);
        let data = response.data.unwrap();
        assert!(data["code"].as_str().unwrap().contains("process_order"));
    }

    #[test]
    fn extract_code_requires_code_or_path() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response = dispatcher.extract_code(
            &ctx,
            "function",
            "process_order",
            None,
            None,
            None,
            ExtractOptions::default(),
        );
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, "invalid_argument");
    }

    #[test]
    fn update_symbol_replaces_and_writes_backup() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("mod.py");
        std::fs::write(&file, FILE).unwrap();

        let mut config = ScalpelConfig::default();
        config.allowed_roots = vec![tmp.path().to_path_buf()];
        let dispatcher = ToolDispatcher::new(config);
        let ctx = RequestContext::new("community");
        let response = dispatcher.update_symbol(
            &ctx,
            &file,
            "function",
            "helper",
            Some("def helper():\n    return 2\n"),
            "replace",
            true,
        );
        assert!(response.success);
        let data = response.data.unwrap();
        assert!(data["backup_path"].as_str().is_some());
        let new_text = std::fs::read_to_string(&file).unwrap();
        assert!(new_text.contains("return 2"));
    }

    #[test]
    fn rename_symbol_rewrites_the_declaration_only() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("mod.py");
        std::fs::write(&file, FILE).unwrap();

        let mut config = ScalpelConfig::default();
        config.allowed_roots = vec![tmp.path().to_path_buf()];
        let dispatcher = ToolDispatcher::new(config);
        let ctx = RequestContext::new("community");
        let response = dispatcher.rename_symbol(&ctx, &file, "function", "helper", "compute_base", false);
        assert!(response.success);
        let new_text = std::fs::read_to_string(&file).unwrap();
        assert!(new_text.contains("def compute_base():"));
        assert!(new_text.contains("return helper() + o"));
    }

    #[test]
    fn update_symbol_rejects_rename_operation() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("mod.py");
        std::fs::write(&file, FILE).unwrap();

        let mut config = ScalpelConfig::default();
        config.allowed_roots = vec![tmp.path().to_path_buf()];
        let dispatcher = ToolDispatcher::new(config);
        let ctx = RequestContext::new("community");
        let response = dispatcher.update_symbol(&ctx, &file, "function", "helper", None, "rename", false);
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, "invalid_argument");
    }
}
