//! `symbolic_execute`, `generate_unit_tests`, `simulate_refactor` (spec
//! §6, §4.6, §9): a bounded, in-core stand-in for full symbolic execution.
//!
//! Spec §9 leaves "full symbolic execution with an SMT backend" out of
//! scope for this engine; SPEC_FULL §11 resolves that by scoping these
//! three operations down to a condition-text path enumerator over the
//! function's CFG plus naive numeric/string literal extraction, and by
//! exposing [`function_ir`] as the hook an external, SMT-backed
//! collaborator would call to go further without reimplementing PDG
//! construction.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::dispatcher::{module_path_for, parse_and_resolve, validate_path, OpExtras, RequestContext, ToolDispatcher, ToolResponse};
use crate::features::extract_update::{locate, TargetType};
use crate::features::flow_graph::{build_cfg, Cfg};
use crate::features::parsing::detect_language;
use crate::features::pdg::{build_pdg, Pdg, PdgEdgeKind};
use crate::shared::models::pir::{FunctionData, NodeId, NodeKind, Program};
use crate::shared::models::symbol::Language;
use crate::shared::models::{CodegraphError, Result};

static CONDITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*(>=|<=|==|!=|>|<)\s*(-?\d+(?:\.\d+)?)").unwrap()
});

#[derive(Debug, Clone, Copy, Default)]
struct Interval {
    lo: Option<f64>,
    lo_inclusive: bool,
    hi: Option<f64>,
    hi_inclusive: bool,
}

impl Interval {
    fn tighten_lo(&mut self, value: f64, inclusive: bool) {
        match self.lo {
            Some(existing) if existing > value => {}
            Some(existing) if existing == value => self.lo_inclusive = self.lo_inclusive && inclusive,
            _ => {
                self.lo = Some(value);
                self.lo_inclusive = inclusive;
            }
        }
    }

    fn tighten_hi(&mut self, value: f64, inclusive: bool) {
        match self.hi {
            Some(existing) if existing < value => {}
            Some(existing) if existing == value => self.hi_inclusive = self.hi_inclusive && inclusive,
            _ => {
                self.hi = Some(value);
                self.hi_inclusive = inclusive;
            }
        }
    }

    fn apply(&mut self, op: &str, value: f64, truth: bool) {
        // A `false` branch negates the comparison: `x > v` not taken means `x <= v`.
        let effective_op = match (op, truth) {
            (op, true) => op,
            (">", false) => "<=",
            (">=", false) => "<",
            ("<", false) => ">=",
            ("<=", false) => ">",
            ("==", false) => return, // can't bound a numeric range from `!=`
            ("!=", false) => "==",
            _ => return,
        };
        match effective_op {
            ">" => self.tighten_lo(value, false),
            ">=" => self.tighten_lo(value, true),
            "<" => self.tighten_hi(value, false),
            "<=" => self.tighten_hi(value, true),
            "==" => {
                self.tighten_lo(value, true);
                self.tighten_hi(value, true);
            }
            _ => {}
        }
    }

    fn sample(&self) -> f64 {
        match (self.lo, self.hi) {
            (Some(lo), Some(hi)) => {
                let adj_lo = if self.lo_inclusive { lo } else { lo + 1.0 };
                let adj_hi = if self.hi_inclusive { hi } else { hi - 1.0 };
                if adj_lo <= adj_hi {
                    adj_lo
                } else {
                    lo
                }
            }
            (Some(lo), None) => {
                if self.lo_inclusive {
                    lo
                } else {
                    lo + 1.0
                }
            }
            (None, Some(hi)) => {
                if self.hi_inclusive {
                    hi
                } else {
                    hi - 1.0
                }
            }
            (None, None) => 0.0,
        }
    }
}

/// One branch decision recorded while walking the function body: the `If`
/// node's condition and whether that path took it (`true`) or not.
type PathTrace = Vec<(NodeId, bool)>;

/// Enumerates simple (loop-free) paths through `stmts` up to `max_depth`
/// nested `If`s and `max_paths` total paths. A loop-free path is one that
/// ends at a `Return`/`Raise` or falls off the end of the block; `Loop`
/// bodies are treated as a single opaque step (spec §4.6 "bounded": loop
/// unrolling is explicitly out of scope here).
fn enumerate_paths(
    program: &Program,
    stmts: &[NodeId],
    trace: &PathTrace,
    depth: usize,
    max_depth: usize,
    max_paths: usize,
    out: &mut Vec<PathTrace>,
) {
    if out.len() >= max_paths {
        return;
    }
    let Some((&head, tail)) = stmts.split_first() else {
        out.push(trace.clone());
        return;
    };

    match &program.get(head).kind {
        NodeKind::If(i) if depth < max_depth => {
            let mut then_trace = trace.clone();
            then_trace.push((i.condition, true));
            let then_seq: Vec<NodeId> = i.then_body.iter().chain(tail.iter()).copied().collect();
            enumerate_paths(program, &then_seq, &then_trace, depth + 1, max_depth, max_paths, out);

            if out.len() >= max_paths {
                return;
            }
            let mut else_trace = trace.clone();
            else_trace.push((i.condition, false));
            let else_seq: Vec<NodeId> = i.else_body.iter().chain(tail.iter()).copied().collect();
            enumerate_paths(program, &else_seq, &else_trace, depth + 1, max_depth, max_paths, out);
        }
        NodeKind::Return(_) | NodeKind::Raise(_) => out.push(trace.clone()),
        _ => enumerate_paths(program, tail, trace, depth, max_depth, max_paths, out),
    }
}

/// A path's human-readable conditions plus a numeric input that is known
/// to satisfy every comparison the regex parser could recognize.
/// Conditions the parser can't interpret (string comparisons, method
/// calls, boolean combinators) are kept in `path_conditions` for
/// readability but don't narrow `example_input`.
struct SynthesizedPath {
    path_conditions: Vec<String>,
    example_input: Map<String, Value>,
}

fn synthesize(program: &Program, source_text: &str, trace: &PathTrace) -> SynthesizedPath {
    let mut path_conditions = Vec::with_capacity(trace.len());
    let mut intervals: HashMap<String, Interval> = HashMap::new();

    for &(cond_id, truth) in trace {
        let text = program.get(cond_id).span.slice(source_text).trim().to_string();
        path_conditions.push(if truth { text.clone() } else { format!("not ({text})") });

        if let Some(caps) = CONDITION_RE.captures(&text) {
            let var = caps[1].to_string();
            let op = caps[2].to_string();
            if let Ok(value) = caps[3].parse::<f64>() {
                intervals.entry(var).or_default().apply(&op, value, truth);
            }
        }
    }

    let mut example_input = Map::new();
    for (var, interval) in intervals {
        let sample = interval.sample();
        let as_json = if sample.fract() == 0.0 {
            Value::from(sample as i64)
        } else {
            serde_json::Number::from_f64(sample).map(Value::Number).unwrap_or(Value::Null)
        };
        example_input.insert(var, as_json);
    }

    SynthesizedPath { path_conditions, example_input }
}

/// Parses `code`, locates `function_name` (or the sole/first function when
/// `None`), and returns the parsed program plus that function's node id.
fn resolve_function(
    dispatcher: &ToolDispatcher,
    code: Option<&str>,
    path: Option<&Path>,
    language: Option<Language>,
    function_name: Option<&str>,
    extras: &mut OpExtras,
) -> Result<(String, Program, NodeId)> {
    let (text, _language, program) = match (code, path) {
        (Some(code), _) => {
            let language = detect_language(code, language)?;
            let (program, _table, report) =
                parse_and_resolve(code, language, &dispatcher.config.sanitizer_policy, true, "inline")?;
            if report.modified {
                extras.warnings.push("source was sanitized before parsing".to_string());
            }
            extras.sanitization = Some(report);
            (code.to_string(), language, program)
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
            (text, language, program)
        }
        (None, None) => return Err(CodegraphError::invalid_argument("this operation requires either `code` or `path`")),
    };

    let function = match function_name {
        Some(name) => locate(&program, TargetType::Function, name)?,
        None => program
            .function_nodes()
            .into_iter()
            .next()
            .ok_or_else(|| CodegraphError::symbol_not_found("no function declared in the given source"))?,
    };

    Ok((text, program, function))
}

fn function_name_of(program: &Program, function: NodeId) -> String {
    match &program.get(function).kind {
        NodeKind::Function(f) => f.name.clone(),
        _ => "<unknown>".to_string(),
    }
}

fn function_params(program: &Program, function: NodeId) -> Vec<String> {
    match &program.get(function).kind {
        NodeKind::Function(FunctionData { params, .. }) => params.iter().map(|p| p.name.clone()).collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPathData {
    pub path_conditions: Vec<String>,
    pub example_input: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolicExecutionData {
    pub function_name: String,
    pub paths: Vec<ExecutionPathData>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedTest {
    pub name: String,
    pub body: String,
}

/// `generate_unit_tests`'s payload (SPEC_FULL §11: "a `TestGenerationResult`
/// type for external collaborators" — a richer test generator can replace
/// `tests` without changing callers that only look at `framework`/`tests`).
#[derive(Debug, Clone, Serialize)]
pub struct TestGenerationResult {
    pub framework: String,
    pub tests: Vec<GeneratedTest>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PdgEdgeData {
    pub from: usize,
    pub to: usize,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionIrData {
    pub function_name: String,
    pub params: Vec<String>,
    pub statement_count: usize,
    pub cyclomatic_complexity: usize,
    pub pdg_node_count: usize,
    pub pdg_edges: Vec<PdgEdgeData>,
}

/// Internal hook (SPEC_FULL §11): `(ir_summary, pdg)` for one function,
/// addressed by name, for a collaborator that wants to run its own
/// analysis (e.g. SMT-backed symbolic execution) without rebuilding the
/// CFG/PDG this crate already has.
pub fn function_ir(program: &Program, function: NodeId) -> (FunctionIrData, Pdg) {
    let cfg: Cfg = build_cfg(program, function);
    let pdg = build_pdg(program, function);
    let statement_count = match &program.get(function).kind {
        NodeKind::Function(f) => f.body.len(),
        _ => 0,
    };
    let ir = FunctionIrData {
        function_name: function_name_of(program, function),
        params: function_params(program, function),
        statement_count,
        cyclomatic_complexity: cfg.cyclomatic_complexity(),
        pdg_node_count: pdg.nodes.len(),
        pdg_edges: pdg
            .edges
            .iter()
            .map(|e| {
                let kind = match &e.kind {
                    PdgEdgeKind::DataFlow { variable } => format!("data_flow:{variable}"),
                    PdgEdgeKind::ControlDep => "control_dep".to_string(),
                    PdgEdgeKind::DefUse => "def_use".to_string(),
                    PdgEdgeKind::UseDef => "use_def".to_string(),
                };
                PdgEdgeData { from: e.from, to: e.to, kind }
            })
            .collect(),
    };
    (ir, pdg)
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}

fn render_pytest(function_name: &str, params: &[String], index: usize, path: &SynthesizedPath) -> GeneratedTest {
    let args = params
        .iter()
        .map(|p| render_literal(path.example_input.get(p).unwrap_or(&Value::Null)))
        .collect::<Vec<_>>()
        .join(", ");
    let conditions = path.path_conditions.join(" and ");
    let body = format!(
        "def test_{function_name}_path_{index}():\n    # path: {conditions}\n    result = {function_name}({args})\n    assert result is not None\n"
    );
    GeneratedTest { name: format!("test_{function_name}_path_{index}"), body }
}

fn render_jest(function_name: &str, params: &[String], index: usize, path: &SynthesizedPath) -> GeneratedTest {
    let args = params
        .iter()
        .map(|p| render_literal(path.example_input.get(p).unwrap_or(&Value::Null)))
        .collect::<Vec<_>>()
        .join(", ");
    let conditions = path.path_conditions.join(" && ");
    let name = format!("{function_name}_path_{index}");
    let body = format!(
        "test('{name}', () => {{\n  // path: {conditions}\n  const result = {function_name}({args});\n  expect(result).toBeDefined();\n}});\n"
    );
    GeneratedTest { name, body }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulateRefactorData {
    /// Scoped per spec §9: this crate checks signature and side-effect
    /// equality plus a structural diff, and explicitly does not claim full
    /// semantic equivalence.
    pub behavior_preserved: bool,
    pub signature_changed: bool,
    pub side_effects_changed: bool,
    pub added_lines: Vec<String>,
    pub removed_lines: Vec<String>,
}

impl ToolDispatcher {
    /// `symbolic_execute` (spec §6, §4.6): bounded path enumeration over
    /// `code`'s first (or named) function, with a literal-comparison
    /// example input per path.
    pub fn symbolic_execute(
        &self,
        ctx: &RequestContext,
        code: &str,
        language: Option<Language>,
        function_name: Option<&str>,
        max_paths: usize,
        max_depth: usize,
    ) -> ToolResponse {
        self.run("symbolic_execute", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<SymbolicExecutionData> = (|| {
                let (text, program, function) =
                    resolve_function(self, Some(code), None, language, function_name, &mut extras)?;
                let body = match &program.get(function).kind {
                    NodeKind::Function(f) => f.body.clone(),
                    _ => Vec::new(),
                };
                let bounded_paths = max_paths.min(limits.max_paths);
                let bounded_depth = max_depth.min(limits.max_depth);
                let mut traces = Vec::new();
                enumerate_paths(&program, &body, &Vec::new(), 0, bounded_depth, bounded_paths, &mut traces);
                let truncated = traces.len() >= bounded_paths;
                if truncated {
                    extras.truncated_by_limit = Some(crate::features::query_engine::LimitKind::MaxPaths);
                }
                let paths = traces
                    .iter()
                    .map(|trace| {
                        let synthesized = synthesize(&program, &text, trace);
                        ExecutionPathData {
                            path_conditions: synthesized.path_conditions,
                            example_input: Value::Object(synthesized.example_input),
                        }
                    })
                    .collect();
                Ok(SymbolicExecutionData { function_name: function_name_of(&program, function), paths, truncated })
            })();
            (result, extras)
        })
    }

    /// `generate_unit_tests` (spec §6): one synthesized test per bounded
    /// execution path, rendered for `framework` (`pytest` or `jest`).
    pub fn generate_unit_tests(
        &self,
        ctx: &RequestContext,
        code: Option<&str>,
        path: Option<&Path>,
        language: Option<Language>,
        function_name: Option<&str>,
        framework: &str,
    ) -> ToolResponse {
        self.run("generate_unit_tests", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<TestGenerationResult> = (|| {
                let renderer: fn(&str, &[String], usize, &SynthesizedPath) -> GeneratedTest = match framework {
                    "pytest" => render_pytest,
                    "jest" => render_jest,
                    other => return Err(CodegraphError::invalid_argument(format!("unsupported test framework '{other}'"))),
                };

                let (text, program, function) = resolve_function(self, code, path, language, function_name, &mut extras)?;
                let body = match &program.get(function).kind {
                    NodeKind::Function(f) => f.body.clone(),
                    _ => Vec::new(),
                };
                let params = function_params(&program, function);
                let name = function_name_of(&program, function);

                let bounded_paths = limits.max_paths;
                let bounded_depth = limits.max_depth;
                let mut traces = Vec::new();
                enumerate_paths(&program, &body, &Vec::new(), 0, bounded_depth, bounded_paths, &mut traces);
                let truncated = traces.len() >= bounded_paths;
                if truncated {
                    extras.truncated_by_limit = Some(crate::features::query_engine::LimitKind::MaxPaths);
                }

                let tests = traces
                    .iter()
                    .enumerate()
                    .map(|(index, trace)| {
                        let synthesized = synthesize(&program, &text, trace);
                        renderer(&name, &params, index, &synthesized)
                    })
                    .collect();

                Ok(TestGenerationResult { framework: framework.to_string(), tests, truncated })
            })();
            (result, extras)
        })
    }

    /// `simulate_refactor` (spec §6, §9): compares `original_code` against
    /// `new_code` for the scoped notion of "behavior preserved" spec §9
    /// settles on — signature equality (same parameter names/types) and
    /// side-effect equality (same set of call names reached), plus a
    /// line-level structural diff for human review. This is not a claim
    /// of semantic equivalence.
    pub fn simulate_refactor(
        &self,
        ctx: &RequestContext,
        original_code: &str,
        new_code: &str,
        language: Option<Language>,
        function_name: Option<&str>,
    ) -> ToolResponse {
        self.run("simulate_refactor", ctx, || {
            let mut extras = OpExtras::default();
            let result: Result<SimulateRefactorData> = (|| {
                let (_, original_program, original_function) =
                    resolve_function(self, Some(original_code), None, language, function_name, &mut extras)?;
                let (_, new_program, new_function) =
                    resolve_function(self, Some(new_code), None, language, function_name, &mut extras)?;

                let original_params = function_params(&original_program, original_function);
                let new_params = function_params(&new_program, new_function);
                let signature_changed = original_params != new_params;

                let original_calls = called_names(&original_program, original_function);
                let new_calls = called_names(&new_program, new_function);
                let side_effects_changed = original_calls != new_calls;

                let original_lines: Vec<&str> = original_code.lines().collect();
                let new_lines: Vec<&str> = new_code.lines().collect();
                let original_set: std::collections::HashSet<&str> = original_lines.iter().copied().collect();
                let new_set: std::collections::HashSet<&str> = new_lines.iter().copied().collect();
                let mut added_lines: Vec<String> =
                    new_lines.iter().filter(|l| !original_set.contains(*l)).map(|l| l.to_string()).collect();
                let mut removed_lines: Vec<String> =
                    original_lines.iter().filter(|l| !new_set.contains(*l)).map(|l| l.to_string()).collect();
                added_lines.sort();
                removed_lines.sort();

                Ok(SimulateRefactorData {
                    behavior_preserved: !signature_changed && !side_effects_changed,
                    signature_changed,
                    side_effects_changed,
                    added_lines,
                    removed_lines,
                })
            })();
            (result, extras)
        })
    }
}

fn called_names(program: &Program, function: NodeId) -> std::collections::BTreeSet<String> {
    let mut out = std::collections::BTreeSet::new();
    collect_called_names(program, function, &mut out);
    out
}

fn collect_called_names(program: &Program, id: NodeId, out: &mut std::collections::BTreeSet<String>) {
    if let NodeKind::Call(c) = &program.get(id).kind {
        if let NodeKind::Name(n) = &program.get(c.callee).kind {
            out.insert(n.identifier.clone());
        } else if let NodeKind::Expr(e) = &program.get(c.callee).kind {
            out.insert(e.text.clone());
        }
    }
    for child in program.children(id) {
        collect_called_names(program, child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalpelConfig;

    const CLASSIFY: &str = "def classify(x):\n    if x > 10:\n        return 1\n    elif x > 5:\n        return 2\n    else:\n        return 3\n";

    #[test]
    fn symbolic_execute_produces_three_satisfying_paths() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response = dispatcher.symbolic_execute(&ctx, CLASSIFY, Some(Language::Python), None, 10, 5);
        assert!(response.success);
        let data = response.data.unwrap();
        let paths = data["paths"].as_array().unwrap();
        assert_eq!(paths.len(), 3);
        for path in paths {
            assert!(path["example_input"]["x"].is_number());
        }
    }

    #[test]
    fn generate_unit_tests_renders_pytest_bodies() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response =
            dispatcher.generate_unit_tests(&ctx, Some(CLASSIFY), None, Some(Language::Python), None, "pytest");
        assert!(response.success);
        let data = response.data.unwrap();
        let tests = data["tests"].as_array().unwrap();
        assert_eq!(tests.len(), 3);
        assert!(tests[0]["body"].as_str().unwrap().contains("def test_classify_path_0"));
    }

    #[test]
    fn generate_unit_tests_rejects_unknown_framework() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response =
            dispatcher.generate_unit_tests(&ctx, Some(CLASSIFY), None, Some(Language::Python), None, "mocha");
        assert!(!response.success);
        assert_eq!(response.error.unwrap().kind, "invalid_argument");
    }

    #[test]
    fn simulate_refactor_flags_unchanged_signature_as_preserved() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let original = "def add(a, b):\n    return a + b\n";
        let refactored = "def add(a, b):\n    total = a + b\n    return total\n";
        let response =
            dispatcher.simulate_refactor(&ctx, original, refactored, Some(Language::Python), Some("add"));
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["signature_changed"], false);
        assert_eq!(data["behavior_preserved"], true);
    }

    #[test]
    fn simulate_refactor_flags_changed_side_effects() {
        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let original = "def handler(req):\n    return compute(req)\n";
        let refactored = "def handler(req):\n    log(req)\n    return compute(req)\n";
        let response =
            dispatcher.simulate_refactor(&ctx, original, refactored, Some(Language::Python), Some("handler"));
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["side_effects_changed"], true);
        assert_eq!(data["behavior_preserved"], false);
    }
}
