//! `analyze_code`, `get_file_context`, `get_project_map`, `crawl_project`
//! (spec §6): the read-only structural analyses that never touch the
//! filesystem's write path.

use std::path::Path;

use serde::Serialize;

use crate::dispatcher::{
    load_project, module_path_for, parse_and_resolve, validate_path, OpExtras, RequestContext,
    ToolDispatcher, ToolResponse,
};
use crate::features::flow_graph::build_cfg;
use crate::features::parsing::detect_language;
use crate::features::query_engine::project_map::{build_project_map, FileStats, ProjectMap};
use crate::features::query_engine::LimitKind;
use crate::shared::models::pir::{NodeKind, Program};
use crate::shared::models::symbol::Language;
use crate::shared::models::{CodegraphError, Result, Span};

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSummary {
    pub name: String,
    pub is_method: bool,
    pub is_async: bool,
    pub param_count: usize,
    pub complexity: usize,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub name: String,
    pub bases: Vec<String>,
    pub method_count: usize,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub module_path: String,
    pub imported_names: Vec<String>,
    pub is_relative: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpanEntry {
    pub node_id: u32,
    pub kind: &'static str,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeCodeData {
    pub language: &'static str,
    pub functions: Vec<FunctionSummary>,
    pub classes: Vec<ClassSummary>,
    pub imports: Vec<ImportSummary>,
    /// Sum of every function's McCabe complexity (spec SPEC_FULL §11).
    pub complexity: usize,
    pub spans: Vec<SpanEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileContextData {
    pub path: String,
    pub language: &'static str,
    pub loc: usize,
    pub function_names: Vec<String>,
    pub class_names: Vec<String>,
    pub complexity: usize,
}

fn function_summaries(program: &Program) -> (Vec<FunctionSummary>, usize) {
    let mut total = 0;
    let summaries = program
        .function_nodes()
        .into_iter()
        .filter_map(|id| {
            let NodeKind::Function(f) = &program.get(id).kind else { return None };
            let complexity = build_cfg(program, id).cyclomatic_complexity();
            total += complexity;
            Some(FunctionSummary {
                name: f.name.clone(),
                is_method: f.is_method,
                is_async: f.is_async,
                param_count: f.params.len(),
                complexity,
                span: program.get(id).span,
            })
        })
        .collect();
    (summaries, total)
}

fn class_summaries(program: &Program) -> Vec<ClassSummary> {
    program
        .class_nodes()
        .into_iter()
        .filter_map(|id| {
            let NodeKind::Class(c) = &program.get(id).kind else { return None };
            let method_count = c
                .members
                .iter()
                .filter(|&&m| matches!(&program.get(m).kind, NodeKind::Function(f) if f.is_method))
                .count();
            Some(ClassSummary {
                name: c.name.clone(),
                bases: c.bases.clone(),
                method_count,
                span: program.get(id).span,
            })
        })
        .collect()
}

fn import_summaries(program: &Program) -> Vec<ImportSummary> {
    program
        .walk()
        .into_iter()
        .filter_map(|id| {
            let NodeKind::Import(i) = &program.get(id).kind else { return None };
            Some(ImportSummary {
                module_path: i.module_path.clone(),
                imported_names: i.imported_names.clone(),
                is_relative: i.is_relative,
                span: program.get(id).span,
            })
        })
        .collect()
}

/// Every node's span, in arena order (spec §6 `analyze_code`: "span
/// table"). A flat list rather than a tree since callers already have the
/// parent relationship via `analyze_code`'s own structured fields.
fn span_table(program: &Program) -> Vec<SpanEntry> {
    program
        .walk()
        .into_iter()
        .map(|id| {
            let node = program.get(id);
            SpanEntry { node_id: id.0, kind: node.kind.tag(), span: node.span }
        })
        .collect()
}

fn build_analyze_code_data(program: &Program, language: Language) -> AnalyzeCodeData {
    let (functions, complexity) = function_summaries(program);
    AnalyzeCodeData {
        language: language.as_str(),
        classes: class_summaries(program),
        imports: import_summaries(program),
        spans: span_table(program),
        functions,
        complexity,
    }
}

impl ToolDispatcher {
    /// `analyze_code` (spec §6): parse and normalize a standalone snippet,
    /// detecting the language when the caller does not supply one.
    pub fn analyze_code(
        &self,
        ctx: &RequestContext,
        code: &str,
        language: Option<Language>,
        accept_partial: bool,
    ) -> ToolResponse {
        self.run("analyze_code", ctx, || {
            let mut extras = OpExtras::default();
            let result: Result<AnalyzeCodeData> = (|| {
                let language = detect_language(code, language)?;
                let policy = self.config.sanitizer_policy.clone();

                // Sanitization is cheap and deterministic (spec §4.1
                // "determinism invariant"), so it is always re-run to
                // surface the report even on a cache hit for the
                // (expensive) parse+normalize+resolve pipeline below.
                let mut sanitize_policy = policy.clone();
                sanitize_policy.language = Some(language);
                let (_sanitized, report) = crate::pipeline::preprocessors::sanitizer::sanitize(code, &sanitize_policy);
                if report.modified {
                    extras.warnings.push("source was sanitized before parsing".to_string());
                }
                extras.sanitization = Some(report);

                let key = crate::features::cache::cache_key(
                    "analyze_code",
                    code,
                    &format!("{policy:?}|{language:?}|accept_partial={accept_partial}"),
                    &ctx.tier,
                );
                let cached = self.analyze_cache.get_or_compute(&key, || -> Result<AnalyzeCodeData> {
                    let (program, _table, _report) =
                        parse_and_resolve(code, language, &policy, accept_partial, "inline")?;
                    Ok(build_analyze_code_data(&program, language))
                })?;
                Ok((*cached).clone())
            })();
            (result, extras)
        })
    }

    /// `get_file_context` (spec §6): a quick single-file summary — names,
    /// LOC, and a complexity estimate — cheaper than the full span table
    /// `analyze_code` returns.
    pub fn get_file_context(&self, ctx: &RequestContext, path: &Path) -> ToolResponse {
        self.run("get_file_context", ctx, || {
            let extras = OpExtras::default();
            let result: Result<FileContextData> = (|| {
                let resolved = validate_path(path, &self.config.allowed_roots, false)?;
                let text = std::fs::read_to_string(&resolved)?;
                let ext = resolved.extension().and_then(|e| e.to_str()).unwrap_or("");
                let language = Language::from_extension(ext).ok_or_else(|| {
                    CodegraphError::unsupported_language(format!("no front end for extension '{ext}'"))
                })?;
                let module_root = resolved.parent().unwrap_or_else(|| Path::new("."));
                let module_path = module_path_for(module_root, &resolved);
                let (program, _table, _report) =
                    parse_and_resolve(&text, language, &self.config.sanitizer_policy, true, &module_path)?;
                let (functions, complexity) = function_summaries(&program);
                Ok(FileContextData {
                    path: resolved.display().to_string(),
                    language: language.as_str(),
                    loc: program.root_node().span.line_count() as usize,
                    function_names: functions.iter().map(|f| f.name.clone()).collect(),
                    class_names: class_summaries(&program).into_iter().map(|c| c.name).collect(),
                    complexity,
                })
            })();
            (result, extras)
        })
    }

    /// `get_project_map` (spec §6): per-file statistics, complexity
    /// hotspots, entry points, and language distribution across a project.
    pub fn get_project_map(&self, ctx: &RequestContext, project_root: &Path, top_n: usize) -> ToolResponse {
        self.run("get_project_map", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<ProjectMap> = (|| {
                let root = validate_path(project_root, &self.config.allowed_roots, false)?;
                let (units, _graph, warnings) = load_project(&root, &self.config.sanitizer_policy, limits.max_files)?;
                if warnings.iter().any(|w| w.contains("max_files limit")) {
                    extras.truncated_by_limit = Some(LimitKind::MaxFiles);
                }
                extras.warnings = warnings;
                Ok(build_project_map(&units, top_n))
            })();
            (result, extras)
        })
    }

    /// `crawl_project` (spec §6): per-file summaries across a project,
    /// optionally restricted to paths matching one of `patterns` (matched
    /// as a path suffix) and to files at or above `min_complexity`.
    pub fn crawl_project(
        &self,
        ctx: &RequestContext,
        root: &Path,
        patterns: Option<&[String]>,
        min_complexity: Option<usize>,
    ) -> ToolResponse {
        self.run("crawl_project", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<Vec<FileStats>> = (|| {
                let resolved_root = validate_path(root, &self.config.allowed_roots, false)?;
                let (units, _graph, warnings) =
                    load_project(&resolved_root, &self.config.sanitizer_policy, limits.max_files)?;
                if warnings.iter().any(|w| w.contains("max_files limit")) {
                    extras.truncated_by_limit = Some(LimitKind::MaxFiles);
                }
                extras.warnings = warnings;
                let map = build_project_map(&units, units.len().max(1));
                let mut files = map.files;
                if let Some(patterns) = patterns {
                    files.retain(|f| patterns.iter().any(|p| f.path.ends_with(p.as_str())));
                }
                if let Some(min) = min_complexity {
                    files.retain(|f| f.complexity >= min);
                }
                Ok(files)
            })();
            (result, extras)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalpelConfig;

    #[test]
    fn analyze_code_reports_functions_and_complexity() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response = dispatcher.analyze_code(
            &ctx,
            "def f(x):\n    if x > 1:\n        return 1\n    return 0\n",
            Some(Language::Python),
            false,
        );
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["functions"][0]["name"], "f");
        assert!(data["complexity"].as_u64().unwrap() >= 2);
    }

    #[test]
    fn analyze_code_reports_merge_conflict_as_parse_error_in_strict_mode() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let code = "def f():\n<<<<<<< HEAD\n    return 1\n=======\n    return 2\n>>>>>>> branch\n";
        let response = dispatcher.analyze_code(&ctx, code, Some(Language::Python), false);
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, "parse_error");
    }

    /// Testable property 4 (spec §8 "Cache purity"): a cache hit and a
    /// cache miss for the same inputs return equal `data`.
    #[test]
    fn analyze_code_cache_hit_matches_cache_miss() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let code = "def f(x):\n    if x > 1:\n        return 1\n    return 0\n";

        let miss = dispatcher.analyze_code(&ctx, code, Some(Language::Python), false);
        assert_eq!(dispatcher.cache_metrics().analyze_code.misses, 1);

        let hit = dispatcher.analyze_code(&ctx, code, Some(Language::Python), false);
        assert_eq!(dispatcher.cache_metrics().analyze_code.hits, 1);

        assert_eq!(miss.data, hit.data);
    }
}
