//! `security_scan`, `cross_file_security_scan`, `unified_sink_detect`,
//! `type_evaporation_scan`, `scan_dependencies`, `code_policy_check`,
//! `verify_policy_integrity` (spec §6): everything that answers "is this
//! code dangerous" rather than "what does this code look like".
//!
//! `scan_dependencies` and `verify_policy_integrity` are named in spec §1
//! as external-collaborator concerns (dependency-vulnerability lookup
//! against external databases; license/policy integrity verification); the
//! operations here validate their path argument and return the response
//! shape spec §6 promises with `delegated: true`, since no such collaborator
//! is wired into this crate.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dispatcher::{
    load_project, module_path_for, parse_and_resolve, validate_path, OpExtras, RequestContext,
    ToolDispatcher, ToolResponse,
};
use crate::features::flow_graph::build_cfg;
use crate::features::parsing::detect_language;
use crate::features::pdg::call_graph::{build_call_graph, CallGraph};
use crate::features::query_engine::{GraphNodeRef, LimitKind};
use crate::features::taint_analysis::ruleset::Ruleset;
use crate::features::taint_analysis::{analyze_project, scan_function, ProjectUnit, TaintFinding};
use crate::shared::models::pir::{NodeId, NodeKind, Program};
use crate::shared::models::span::Span;
use crate::shared::models::symbol::Language;
use crate::shared::models::{CodegraphError, Result};

use super::graph_ops::locate_function_node;

impl ToolDispatcher {
    /// Merges every configured taint ruleset file over the built-in
    /// baseline (SPEC_FULL §12: `serde_yaml` for rulesets), falling back to
    /// `Ruleset::default_builtin()` unconfigured so the engine scans with
    /// sane defaults.
    fn load_ruleset(&self) -> Result<Ruleset> {
        let mut merged = Ruleset::default_builtin();
        for path in &self.config.taint_ruleset_paths {
            let text = std::fs::read_to_string(path)?;
            let loaded = Ruleset::load_from_yaml(&text)?;
            for (lang, rules) in loaded.by_language {
                let entry = merged.by_language.entry(lang).or_default();
                entry.sources.extend(rules.sources);
                entry.sinks.extend(rules.sinks);
                entry.sanitizers.extend(rules.sanitizers);
            }
            merged.version = loaded.version;
        }
        Ok(merged)
    }
}

/// Resolves one already-parsed unit from either inline `code` or a file
/// `path`, the same pattern `edit_ops` uses for `extract_code`.
fn resolve_single_unit(
    dispatcher: &ToolDispatcher,
    code: Option<&str>,
    path: Option<&Path>,
    language: Option<Language>,
    extras: &mut OpExtras,
) -> Result<(String, Language, Program)> {
    match (code, path) {
        (Some(code), _) => {
            let language = detect_language(code, language)?;
            let (program, _table, report) =
                parse_and_resolve(code, language, &dispatcher.config.sanitizer_policy, true, "inline")?;
            if report.modified {
                extras.warnings.push("source was sanitized before parsing".to_string());
            }
            extras.sanitization = Some(report);
            Ok((code.to_string(), language, program))
        }
        (None, Some(path)) => {
            let resolved = validate_path(path, &dispatcher.config.allowed_roots, false)?;
            let text = std::fs::read_to_string(&resolved)?;
            let ext = resolved.extension().and_then(|e| e.to_str()).unwrap_or("");
            let language = Language::from_extension(ext).ok_or_else(|| {
                CodegraphError::unsupported_language(format!("no front end for extension '{ext}'"))
            })?;
            let module_root = resolved.parent().unwrap_or_else(|| Path::new("."));
            let module_path = module_path_for(module_root, &resolved);
            let (program, _table, _report) =
                parse_and_resolve(&text, language, &dispatcher.config.sanitizer_policy, true, &module_path)?;
            Ok((text, language, program))
        }
        (None, None) => Err(CodegraphError::invalid_argument("this operation requires either `code` or `path`")),
    }
}

fn collect_calls(program: &Program, root: NodeId, out: &mut Vec<NodeId>) {
    if matches!(program.get(root).kind, NodeKind::Call(_)) {
        out.push(root);
    }
    for child in program.children(root) {
        collect_calls(program, child, out);
    }
}

/// Deduplicates findings by `(source_node, sink_node, kind)` (spec §4.7
/// "Output"), folding repeats into `alternative_path_count` on the entry
/// that is kept rather than dropping the information entirely.
fn dedup_findings(findings: Vec<TaintFinding>) -> Vec<TaintFinding> {
    let mut by_key: HashMap<(usize, NodeId, NodeId, String), TaintFinding> = HashMap::new();
    for f in findings {
        let key = (f.unit, f.source_node, f.sink_node, f.cwe.clone());
        by_key
            .entry(key)
            .and_modify(|existing| existing.alternative_path_count += 1)
            .or_insert(f);
    }
    let mut out: Vec<TaintFinding> = by_key.into_values().collect();
    out.sort_by_key(|f| (f.unit, f.source_span.start_byte, f.sink_span.start_byte));
    out
}

/// Every node reachable by following call-graph edges forward from `starts`
/// (spec §6 `cross_file_security_scan`: findings scoped to declared entry
/// points).
fn reachable_from(call_graph: &CallGraph, starts: &[GraphNodeRef]) -> HashSet<GraphNodeRef> {
    let mut seen: HashSet<GraphNodeRef> = starts.iter().copied().collect();
    let mut frontier: Vec<GraphNodeRef> = starts.to_vec();
    while let Some(node) = frontier.pop() {
        for e in &call_graph.edges {
            let from = GraphNodeRef { unit: e.caller_unit, node: e.caller };
            let to = GraphNodeRef { unit: e.callee_unit, node: e.callee };
            if from == node && seen.insert(to) {
                frontier.push(to);
            }
        }
    }
    seen
}

fn function_signatures(program: &Program) -> HashMap<String, Vec<Option<String>>> {
    program
        .function_nodes()
        .into_iter()
        .filter_map(|id| match &program.get(id).kind {
            NodeKind::Function(f) => Some((f.name.clone(), f.params.iter().map(|p| p.type_hint.clone()).collect())),
            _ => None,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityScanData {
    pub findings: Vec<TaintFinding>,
    /// `false` when `max_findings` truncated the result (spec §4.7
    /// "Failure modes": "the engine returns partial results with
    /// `complete=false`").
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinkHitData {
    pub sink_name: String,
    pub cwe: String,
    pub confidence: f32,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeMismatchData {
    pub function_name: String,
    pub frontend_signature: Vec<Option<String>>,
    pub backend_signature: Vec<Option<String>>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyVulnerability {
    pub package: String,
    pub version: String,
    pub advisory_id: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyScanData {
    pub path: String,
    pub vulnerabilities: Vec<DependencyVulnerability>,
    pub delegated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyIntegrityData {
    pub policy_dir: String,
    pub verified: bool,
    pub delegated: bool,
}

/// A single policy rule (spec §6 `code_policy_check`: "paths, rules"). The
/// spec does not define a rule schema, so this crate supports the two
/// checks its own components can already evaluate without an external
/// rules engine: a forbidden literal substring, and a per-function
/// complexity ceiling computed from the same CFG the project map uses.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    #[serde(default)]
    pub forbidden_pattern: Option<String>,
    #[serde(default)]
    pub max_complexity: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyViolationData {
    pub rule_id: String,
    pub file: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl ToolDispatcher {
    /// `security_scan` (spec §6, §4.7): intraprocedural taint scan of
    /// `code` (an inline snippet) or the file at `path`, over every
    /// function it declares.
    pub fn security_scan(
        &self,
        ctx: &RequestContext,
        code: Option<&str>,
        path: Option<&Path>,
        language: Option<Language>,
    ) -> ToolResponse {
        self.run("security_scan", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<SecurityScanData> = (|| {
                let ruleset = self.load_ruleset()?;
                let (text, language, program) = resolve_single_unit(self, code, path, language, &mut extras)?;

                // Cached per (source_unit, ruleset_version) ahead of
                // tier-specific truncation (spec §3 "Lifecycle": "Taint
                // findings are cached per (source_unit, ruleset_version)"),
                // so the memoized value is the full, untruncated finding
                // set and stays valid across callers on different tiers.
                let key = crate::features::cache::cache_key("security_scan", &text, &ruleset.version, &ctx.tier);
                let cached = self.security_cache.get_or_compute(&key, || -> Result<SecurityScanData> {
                    let mut findings = Vec::new();
                    for function in program.function_nodes() {
                        findings.extend(scan_function(&program, &text, language, &ruleset, function));
                    }
                    Ok(SecurityScanData { findings: dedup_findings(findings), complete: true })
                })?;

                let mut data = (*cached).clone();
                if data.findings.len() > limits.max_findings {
                    data.findings.truncate(limits.max_findings);
                    extras.truncated_by_limit = Some(LimitKind::MaxFindings);
                    data.complete = false;
                }
                Ok(data)
            })();
            (result, extras)
        })
    }

    /// `cross_file_security_scan` (spec §6, §4.7 "Interprocedural pass"):
    /// the project-wide worklist, optionally scoped to findings reachable
    /// from `entry_points` (unresolvable entry-point names are ignored
    /// rather than failing the whole scan).
    pub fn cross_file_security_scan(
        &self,
        ctx: &RequestContext,
        project_root: &Path,
        entry_points: &[String],
        max_depth: usize,
    ) -> ToolResponse {
        self.run("cross_file_security_scan", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<SecurityScanData> = (|| {
                let ruleset = self.load_ruleset()?;
                let root = validate_path(project_root, &self.config.allowed_roots, false)?;
                let (units, _graph, warnings) = load_project(&root, &self.config.sanitizer_policy, limits.max_files)?;
                extras.warnings = warnings;
                let call_graph = build_call_graph(&units);
                let texts: Vec<String> =
                    units.iter().map(|u| std::fs::read_to_string(&u.path).unwrap_or_default()).collect();
                let project_units: Vec<ProjectUnit> = units
                    .iter()
                    .zip(texts.iter())
                    .map(|(unit, source_text)| ProjectUnit { unit, source_text })
                    .collect();
                let depth = max_depth.min(limits.max_depth).max(1);
                let mut findings =
                    analyze_project(&project_units, &call_graph, |idx| units[idx].language, &ruleset, depth);

                if !entry_points.is_empty() {
                    let entry_nodes: Vec<GraphNodeRef> = entry_points
                        .iter()
                        .filter_map(|name| locate_function_node(&units, None, name).ok())
                        .collect();
                    if !entry_nodes.is_empty() {
                        let reachable = reachable_from(&call_graph, &entry_nodes);
                        findings.retain(|f| {
                            reachable.contains(&GraphNodeRef { unit: f.unit, node: f.sink_node })
                                || reachable.contains(&GraphNodeRef { unit: f.unit, node: f.source_node })
                        });
                    }
                }

                let mut findings = dedup_findings(findings);
                let mut complete = true;
                if findings.len() > limits.max_findings {
                    findings.truncate(limits.max_findings);
                    extras.truncated_by_limit = Some(LimitKind::MaxFindings);
                    complete = false;
                }
                Ok(SecurityScanData { findings, complete })
            })();
            (result, extras)
        })
    }

    /// `unified_sink_detect` (spec §6): every call in `code` that matches a
    /// ruleset sink pattern for `language`, independent of whether any
    /// tainted value reaches it — a coarser sweep than `security_scan` for
    /// callers that just want "where are the dangerous calls".
    pub fn unified_sink_detect(
        &self,
        ctx: &RequestContext,
        code: &str,
        language: Option<Language>,
        threshold: f32,
    ) -> ToolResponse {
        self.run("unified_sink_detect", ctx, || {
            let mut extras = OpExtras::default();
            let result: Result<Vec<SinkHitData>> = (|| {
                let ruleset = self.load_ruleset()?;
                let (text, language, program) = resolve_single_unit(self, Some(code), None, language, &mut extras)?;
                let mut calls = Vec::new();
                collect_calls(&program, program.root, &mut calls);
                let mut hits: Vec<SinkHitData> = calls
                    .into_iter()
                    .filter_map(|id| {
                        let span = program.get(id).span;
                        let sink = ruleset.match_sink(language, span.slice(&text))?;
                        (sink.base_confidence >= threshold).then(|| SinkHitData {
                            sink_name: sink.name.clone(),
                            cwe: sink.cwe.clone(),
                            confidence: sink.base_confidence,
                            span,
                        })
                    })
                    .collect();
                hits.sort_by_key(|h| h.span.start_byte);
                Ok(hits)
            })();
            (result, extras)
        })
    }

    /// `type_evaporation_scan` (spec §6): compares declared parameter types
    /// for same-named functions across a polyglot boundary (`frontend_code`
    /// and `backend_code`, each independently parsed and language-detected)
    /// and reports where a type annotation present on one side has no
    /// counterpart, or disagrees, on the other.
    pub fn type_evaporation_scan(
        &self,
        ctx: &RequestContext,
        frontend_code: &str,
        frontend_language: Option<Language>,
        backend_code: &str,
        backend_language: Option<Language>,
    ) -> ToolResponse {
        self.run("type_evaporation_scan", ctx, || {
            let mut extras = OpExtras::default();
            let result: Result<Vec<TypeMismatchData>> = (|| {
                let (_, _, front_program) =
                    resolve_single_unit(self, Some(frontend_code), None, frontend_language, &mut extras)?;
                let (_, _, back_program) =
                    resolve_single_unit(self, Some(backend_code), None, backend_language, &mut extras)?;
                let front_sigs = function_signatures(&front_program);
                let back_sigs = function_signatures(&back_program);

                let mut mismatches = Vec::new();
                for (name, front_params) in &front_sigs {
                    let Some(back_params) = back_sigs.get(name) else { continue };
                    if front_params.len() != back_params.len() {
                        mismatches.push(TypeMismatchData {
                            function_name: name.clone(),
                            frontend_signature: front_params.clone(),
                            backend_signature: back_params.clone(),
                            reason: "parameter count differs across the boundary".to_string(),
                        });
                        continue;
                    }
                    let disagrees = front_params
                        .iter()
                        .zip(back_params.iter())
                        .any(|(a, b)| a.is_some() && b.is_some() && a != b);
                    if disagrees {
                        mismatches.push(TypeMismatchData {
                            function_name: name.clone(),
                            frontend_signature: front_params.clone(),
                            backend_signature: back_params.clone(),
                            reason: "declared parameter type evaporates across the boundary".to_string(),
                        });
                    }
                }
                mismatches.sort_by(|a, b| a.function_name.cmp(&b.function_name));
                Ok(mismatches)
            })();
            (result, extras)
        })
    }

    /// `scan_dependencies` (spec §6, §1 Non-goals "dependency-vulnerability
    /// lookup against external databases"): validates `path` and returns
    /// the documented response shape with `delegated: true`, since looking
    /// up real advisories is an out-of-process callout this crate does not
    /// implement.
    pub fn scan_dependencies(&self, ctx: &RequestContext, path: &Path) -> ToolResponse {
        self.run("scan_dependencies", ctx, || {
            let mut extras = OpExtras::default();
            let result: Result<DependencyScanData> = (|| {
                let resolved = validate_path(path, &self.config.allowed_roots, false)?;
                extras.warnings.push(
                    "dependency-vulnerability lookup is an external collaborator (spec §1); this call only validates the path".to_string(),
                );
                Ok(DependencyScanData { path: resolved.display().to_string(), vulnerabilities: Vec::new(), delegated: true })
            })();
            (result, extras)
        })
    }

    /// `verify_policy_integrity` (spec §6, §1 "policy integrity
    /// verification" external collaborator): validates `policy_dir` and
    /// returns the response shape, deferring the actual cryptographic
    /// verification to that collaborator.
    pub fn verify_policy_integrity(&self, ctx: &RequestContext, policy_dir: &Path) -> ToolResponse {
        self.run("verify_policy_integrity", ctx, || {
            let mut extras = OpExtras::default();
            let result: Result<PolicyIntegrityData> = (|| {
                let resolved = validate_path(policy_dir, &self.config.allowed_roots, false)?;
                extras.warnings.push(
                    "policy integrity verification is an external collaborator (spec §1); this call only validates the path".to_string(),
                );
                Ok(PolicyIntegrityData { policy_dir: resolved.display().to_string(), verified: false, delegated: true })
            })();
            (result, extras)
        })
    }

    /// `code_policy_check` (spec §6): evaluates `rules` against every file
    /// in `paths`.
    pub fn code_policy_check(&self, ctx: &RequestContext, paths: &[PathBuf], rules: &[PolicyRule]) -> ToolResponse {
        self.run("code_policy_check", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<Vec<PolicyViolationData>> = (|| {
                let mut violations = Vec::new();
                for path in paths {
                    let resolved = validate_path(path, &self.config.allowed_roots, false)?;
                    let text = std::fs::read_to_string(&resolved)?;
                    let ext = resolved.extension().and_then(|e| e.to_str()).unwrap_or("");
                    let Some(language) = Language::from_extension(ext) else { continue };

                    for rule in rules {
                        if let Some(pattern) = &rule.forbidden_pattern {
                            if let Some(byte_offset) = text.find(pattern.as_str()) {
                                let line = text[..byte_offset].bytes().filter(|&b| b == b'\n').count() as u32 + 1;
                                violations.push(PolicyViolationData {
                                    rule_id: rule.id.clone(),
                                    file: resolved.display().to_string(),
                                    message: format!("forbidden pattern '{pattern}' found"),
                                    line: Some(line),
                                });
                            }
                        }
                        if let Some(max_complexity) = rule.max_complexity {
                            let module_root = resolved.parent().unwrap_or_else(|| Path::new("."));
                            let module_path = module_path_for(module_root, &resolved);
                            if let Ok((program, _table, _report)) =
                                parse_and_resolve(&text, language, &self.config.sanitizer_policy, true, &module_path)
                            {
                                for f in program.function_nodes() {
                                    let complexity = build_cfg(&program, f).cyclomatic_complexity();
                                    if complexity <= max_complexity {
                                        continue;
                                    }
                                    let NodeKind::Function(fd) = &program.get(f).kind else { continue };
                                    violations.push(PolicyViolationData {
                                        rule_id: rule.id.clone(),
                                        file: resolved.display().to_string(),
                                        message: format!(
                                            "function '{}' has complexity {complexity} exceeding max {max_complexity}",
                                            fd.name
                                        ),
                                        line: Some(program.get(f).span.start_line),
                                    });
                                }
                            }
                        }
                    }
                }
                if violations.len() > limits.max_findings {
                    violations.truncate(limits.max_findings);
                    extras.truncated_by_limit = Some(LimitKind::MaxFindings);
                }
                Ok(violations)
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
    fn security_scan_flags_sql_injection() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let code = "def handler(request, db):\n    q = \"SELECT * FROM u WHERE id=\" + request.args[\"id\"]\n    db.execute(q)\n";
        let response = dispatcher.security_scan(&ctx, Some(code), None, Some(Language::Python));
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["findings"][0]["cwe"], "CWE-89");
        assert_eq!(data["complete"], true);
    }

    #[test]
    fn unified_sink_detect_finds_sql_sink_above_threshold() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response =
            dispatcher.unified_sink_detect(&ctx, "def f(db):\n    db.execute(q)\n", Some(Language::Python), 0.5);
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data[0]["cwe"], "CWE-89");
    }

    #[test]
    fn unified_sink_detect_respects_threshold() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response =
            dispatcher.unified_sink_detect(&ctx, "def f(db):\n    db.execute(q)\n", Some(Language::Python), 1.5);
        assert!(response.success);
        assert_eq!(response.data.unwrap().as_array().unwrap().len(), 0);
    }

    #[test]
    fn code_policy_check_flags_forbidden_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("mod.py");
        std::fs::write(&file, "x = eval(user_input)\n").unwrap();

        let mut config = ScalpelConfig::default();
        config.allowed_roots = vec![tmp.path().to_path_buf()];
        let dispatcher = ToolDispatcher::new(config);
        let ctx = RequestContext::new("community");
        let rules = vec![PolicyRule { id: "no-eval".to_string(), forbidden_pattern: Some("eval(".to_string()), max_complexity: None }];
        let response = dispatcher.code_policy_check(&ctx, &[file], &rules);
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data[0]["rule_id"], "no-eval");
    }

    #[test]
    fn scan_dependencies_is_delegated() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("requirements.txt");
        std::fs::write(&file, "flask==1.0\n").unwrap();

        let mut config = ScalpelConfig::default();
        config.allowed_roots = vec![tmp.path().to_path_buf()];
        let dispatcher = ToolDispatcher::new(config);
        let ctx = RequestContext::new("community");
        let response = dispatcher.scan_dependencies(&ctx, &file);
        assert!(response.success);
        assert_eq!(response.data.unwrap()["delegated"], true);
    }
}
