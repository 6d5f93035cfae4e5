//! Taint analysis (component C7): intraprocedural source-to-sink tracing
//! within one function, and an interprocedural pass that carries tainted
//! parameters across the call graph.

pub mod ruleset;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::features::cross_file::SourceUnit;
use crate::features::pdg::call_graph::CallGraph;
use crate::shared::models::pir::{
    AssignmentData, CallData, FunctionData, NodeId, NodeKind, Program,
};
use crate::shared::models::span::Span;
use crate::shared::models::symbol::Language;
use ruleset::{Ruleset, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaintFinding {
    pub sink_name: String,
    pub cwe: String,
    pub severity: Severity,
    pub source_node: NodeId,
    pub source_span: Span,
    pub sink_node: NodeId,
    pub sink_span: Span,
    pub sanitizer_on_path: bool,
    pub confidence: f32,
    pub evidence: String,
    pub remediation: String,
    pub alternative_path_count: usize,
    /// Index into the project's unit list the sink was found in. `0` for
    /// single-file scans, where there is only one unit. `analyze_project`
    /// stamps the real index after each per-unit scan, since the engine
    /// that matches sinks has no notion of a project (spec §4.7 is
    /// intraprocedural by design; cross-file attribution is a dispatcher
    /// concern layered on top).
    #[serde(default)]
    pub unit: usize,
}

#[derive(Debug, Clone, Default)]
struct Taint {
    source_node: NodeId,
    source_span: Span,
    /// CWE ids a sanitizer has already cleared along the path to this
    /// variable's current value. A sanitizer with no declared coverage
    /// clears every CWE, which shows up here as the special marker `"*"`.
    blocked_cwes: HashSet<String>,
    sanitized: bool,
}

impl Taint {
    fn blocks(&self, cwe: &str) -> bool {
        self.blocked_cwes.contains("*") || self.blocked_cwes.contains(cwe)
    }
}

fn collect_name_identifiers(program: &Program, root: NodeId, out: &mut Vec<String>) {
    if let NodeKind::Name(n) = &program.get(root).kind {
        out.push(n.identifier.clone());
    }
    for child in program.children(root) {
        collect_name_identifiers(program, child, out);
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

fn assignment_target_names(program: &Program, data: &AssignmentData) -> Vec<String> {
    let mut names = Vec::new();
    for &target in &data.targets {
        collect_name_identifiers(program, target, &mut names);
    }
    names
}

fn ordered_statements(program: &Program, body: &[NodeId], out: &mut Vec<NodeId>) {
    for &stmt in body {
        out.push(stmt);
        match &program.get(stmt).kind {
            NodeKind::If(i) => {
                ordered_statements(program, &i.then_body, out);
                ordered_statements(program, &i.else_body, out);
            }
            NodeKind::Loop(l) => ordered_statements(program, &l.body, out),
            NodeKind::Try(t) => {
                ordered_statements(program, &t.body, out);
                for h in &t.handlers {
                    ordered_statements(program, &h.body, out);
                }
                ordered_statements(program, &t.finally_body, out);
            }
            _ => {}
        }
    }
}

/// Intraprocedural taint state threaded through one function's statements
/// in source order. `seed` pre-taints a parameter for the interprocedural
/// pass; an empty seed starts from scratch.
struct Engine<'a> {
    program: &'a Program,
    source_text: &'a str,
    language: Language,
    ruleset: &'a Ruleset,
    vars: HashMap<String, Taint>,
}

impl<'a> Engine<'a> {
    fn span_text(&self, node: NodeId) -> &'a str {
        self.program.get(node).span.slice(self.source_text)
    }

    fn visit_assignment(&mut self, stmt: NodeId, data: &AssignmentData) {
        let rhs_text = self.span_text(data.value);
        let mut reads = Vec::new();
        collect_name_identifiers(self.program, data.value, &mut reads);

        let source_hit = self.ruleset.match_source(self.language, rhs_text);
        let sanitizer_hit = self.ruleset.match_sanitizer(self.language, rhs_text);

        let inherited: Option<Taint> = reads.iter().find_map(|name| self.vars.get(name).cloned());

        let mut taint = if source_hit.is_some() {
            Some(Taint { source_node: stmt, source_span: self.program.get(stmt).span, blocked_cwes: HashSet::new(), sanitized: false })
        } else {
            inherited
        };

        if let (Some(t), Some(sanitizer)) = (taint.as_mut(), sanitizer_hit) {
            t.sanitized = true;
            if sanitizer.covers.is_empty() {
                t.blocked_cwes.insert("*".to_string());
            } else {
                t.blocked_cwes.extend(sanitizer.covers.iter().cloned());
            }
        }

        for name in assignment_target_names(self.program, data) {
            match &taint {
                Some(t) => {
                    self.vars.insert(name, t.clone());
                }
                None => {
                    self.vars.remove(&name);
                }
            }
        }
    }

    fn check_sink(&self, call: NodeId, findings: &mut Vec<TaintFinding>) {
        let text = self.span_text(call);
        let Some(sink) = self.ruleset.match_sink(self.language, text) else { return };

        let NodeKind::Call(CallData { positional_args, keyword_args, .. }) = &self.program.get(call).kind else { return };
        let mut read_names = Vec::new();
        for &arg in positional_args {
            collect_name_identifiers(self.program, arg, &mut read_names);
        }
        for (_, arg) in keyword_args {
            collect_name_identifiers(self.program, *arg, &mut read_names);
        }

        for name in read_names {
            let Some(taint) = self.vars.get(&name) else { continue };
            if taint.blocks(&sink.cwe) {
                continue;
            }
            findings.push(TaintFinding {
                sink_name: sink.name.clone(),
                cwe: sink.cwe.clone(),
                severity: sink.severity,
                source_node: taint.source_node,
                source_span: taint.source_span,
                sink_node: call,
                sink_span: self.program.get(call).span,
                sanitizer_on_path: taint.sanitized,
                confidence: sink.base_confidence,
                evidence: format!("'{name}' reaches {} with no sanitizer for {}", sink.name, sink.cwe),
                remediation: sink.remediation.clone(),
                alternative_path_count: 0,
                unit: 0,
            });
        }
    }
}

/// Traces sources to sinks within a single function (spec §4.7
/// "Intraprocedural"). Statements are visited in source order, including
/// nested bodies, which is enough for straight-line and structured
/// control flow since the IR has no unstructured jumps.
pub fn analyze_function(
    program: &Program,
    source_text: &str,
    language: Language,
    ruleset: &Ruleset,
    function: NodeId,
    seed: HashMap<String, Taint>,
) -> Vec<TaintFinding> {
    let body = match &program.get(function).kind {
        NodeKind::Function(FunctionData { body, .. }) => body.clone(),
        _ => Vec::new(),
    };
    let mut statements = Vec::new();
    ordered_statements(program, &body, &mut statements);

    let mut engine = Engine { program, source_text, language, ruleset, vars: seed };
    let mut findings = Vec::new();

    for stmt in statements {
        if let NodeKind::Assignment(data) = &program.get(stmt).kind {
            engine.visit_assignment(stmt, data);
        }
        let mut calls = Vec::new();
        collect_calls(program, stmt, &mut calls);
        for call in calls {
            engine.check_sink(call, &mut findings);
        }
    }

    findings
}

/// Public entry point: no pre-tainted parameters, for standalone per-
/// function scans.
pub fn scan_function(program: &Program, source_text: &str, language: Language, ruleset: &Ruleset, function: NodeId) -> Vec<TaintFinding> {
    analyze_function(program, source_text, language, ruleset, function, HashMap::new())
}

fn function_param_names(program: &Program, function: NodeId) -> Vec<String> {
    match &program.get(function).kind {
        NodeKind::Function(f) => f.params.iter().map(|p| p.name.clone()).collect(),
        _ => Vec::new(),
    }
}

/// A unit plus the raw source text `analyze_project` needs to slice span
/// text out of; the taint ruleset is matched against source text, which
/// `features::cross_file::SourceUnit` does not itself carry.
pub struct ProjectUnit<'a> {
    pub unit: &'a SourceUnit,
    pub source_text: &'a str,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
struct WorkItem {
    unit: usize,
    function: NodeId,
    param_mask: u64,
}

/// Interprocedural pass (spec §4.7 "Interprocedural"): a worklist of
/// `(callee, tainted-param-mask)` pairs over the project call graph,
/// memoized so the same combination never re-runs. Confidence degrades by
/// `0.1` for every call-graph edge crossed with confidence below `1.0`
/// (dynamic dispatch); a path through an unresolved/opaque call cannot be
/// followed at all and simply stops there.
pub fn analyze_project(
    units: &[ProjectUnit],
    call_graph: &CallGraph,
    language_of: impl Fn(usize) -> Language,
    ruleset: &Ruleset,
    max_depth: usize,
) -> Vec<TaintFinding> {
    let mut all_findings = Vec::new();
    let mut seen: HashSet<WorkItem> = HashSet::new();

    for (unit_idx, pu) in units.iter().enumerate() {
        for function in pu.unit.program.function_nodes() {
            let findings = scan_function(&pu.unit.program, pu.source_text, language_of(unit_idx), ruleset, function)
                .into_iter()
                .map(|mut f| {
                    f.unit = unit_idx;
                    f
                });
            all_findings.extend(findings);
        }
    }

    let mut worklist: Vec<(WorkItem, f32, HashSet<String>)> = Vec::new();
    for edge in &call_graph.edges {
        let caller_tainted_args = tainted_call_args(units, edge.caller_unit, edge.caller, language_of(edge.caller_unit), ruleset);
        if caller_tainted_args.is_empty() {
            continue;
        }
        let params = function_param_names(&units[edge.callee_unit].unit.program, edge.callee);
        let mut mask: u64 = 0;
        for (idx, name) in params.iter().enumerate() {
            if idx < 64 && caller_tainted_args.contains(name) {
                mask |= 1 << idx;
            }
        }
        if mask == 0 {
            continue;
        }
        let item = WorkItem { unit: edge.callee_unit, function: edge.callee, param_mask: mask };
        worklist.push((item, edge.confidence, caller_tainted_args));
    }

    let mut depth_budget = HashMap::new();
    while let Some((item, confidence, tainted_names)) = worklist.pop() {
        if !seen.insert(item) {
            continue;
        }
        let depth = depth_budget.entry(item.unit).or_insert(0usize);
        if *depth >= max_depth {
            continue;
        }
        *depth += 1;

        let pu = &units[item.unit];
        let language = language_of(item.unit);
        let params = function_param_names(&pu.unit.program, item.function);
        let mut seed = HashMap::new();
        for (idx, name) in params.iter().enumerate() {
            if idx < 64 && item.param_mask & (1 << idx) != 0 {
                seed.insert(
                    name.clone(),
                    Taint { source_node: item.function, source_span: pu.unit.program.get(item.function).span, blocked_cwes: HashSet::new(), sanitized: false },
                );
            }
        }
        let _ = tainted_names;

        let mut findings = analyze_function(&pu.unit.program, pu.source_text, language, ruleset, item.function, seed);
        for f in &mut findings {
            f.unit = item.unit;
            if confidence < 1.0 {
                f.confidence = (f.confidence - 0.1).max(0.0);
            }
        }
        all_findings.extend(findings);
    }

    all_findings
}

/// Variable names the call at `caller` passes as arguments that are
/// currently tainted at that call site, per a fresh scan of the caller's
/// function.
fn tainted_call_args(units: &[ProjectUnit], unit_idx: usize, call_node: NodeId, language: Language, ruleset: &Ruleset) -> HashSet<String> {
    let pu = &units[unit_idx];
    let program = &pu.unit.program;

    let enclosing = enclosing_function(program, call_node);
    let Some(function) = enclosing else { return HashSet::new() };

    let body = match &program.get(function).kind {
        NodeKind::Function(FunctionData { body, .. }) => body.clone(),
        _ => Vec::new(),
    };
    let mut statements = Vec::new();
    ordered_statements(program, &body, &mut statements);

    let mut engine = Engine { program, source_text: pu.source_text, language, ruleset, vars: HashMap::new() };
    for stmt in &statements {
        if let NodeKind::Assignment(data) = &program.get(*stmt).kind {
            engine.visit_assignment(*stmt, data);
        }
        if *stmt == call_node || program.children(*stmt).contains(&call_node) {
            break;
        }
    }

    let NodeKind::Call(CallData { positional_args, keyword_args, .. }) = &program.get(call_node).kind else {
        return HashSet::new();
    };
    let mut names = Vec::new();
    for &a in positional_args {
        collect_name_identifiers(program, a, &mut names);
    }
    for (_, a) in keyword_args {
        collect_name_identifiers(program, *a, &mut names);
    }
    names.into_iter().filter(|n| engine.vars.contains_key(n)).collect()
}

fn enclosing_function(program: &Program, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(id) = current {
        if matches!(program.get(id).kind, NodeKind::Function(_)) {
            return Some(id);
        }
        current = program.get(id).parent;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir_generation::python;
    use crate::features::parsing::python::PythonFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};

    fn lower(src: &str) -> Program {
        let fe = PythonFrontEnd;
        let native = fe.parse(src, ParseOptions::default()).unwrap();
        python::lower(&native, crate::shared::models::SourceUnitId(0))
    }

    #[test]
    fn unsanitized_source_reaches_sql_sink() {
        let src = "def handler(request, db):\n    query = request.args\n    db.execute(query)\n";
        let program = lower(src);
        let ruleset = Ruleset::default_builtin();
        let f = program.function_nodes()[0];
        let findings = scan_function(&program, src, Language::Python, &ruleset, f);
        assert!(findings.iter().any(|x| x.cwe == "CWE-89"));
    }

    #[test]
    fn sanitizer_blocks_the_cwe_it_covers() {
        let src = "def handler(request):\n    value = request.args\n    safe = escape(value)\n    render_template_string(safe)\n";
        let program = lower(src);
        let ruleset = Ruleset::default_builtin();
        let f = program.function_nodes()[0];
        let findings = scan_function(&program, src, Language::Python, &ruleset, f);
        assert!(findings.is_empty());
    }

    #[test]
    fn sanitizer_does_not_block_a_different_sink_family() {
        let src = "def handler(request, db):\n    value = request.args\n    safe = escape(value)\n    db.execute(safe)\n";
        let program = lower(src);
        let ruleset = Ruleset::default_builtin();
        let f = program.function_nodes()[0];
        let findings = scan_function(&program, src, Language::Python, &ruleset, f);
        assert!(findings.iter().any(|x| x.cwe == "CWE-89"));
    }

    #[test]
    fn clean_value_reaching_a_sink_is_not_flagged() {
        let src = "def handler(db):\n    query = \"select 1\"\n    db.execute(query)\n";
        let program = lower(src);
        let ruleset = Ruleset::default_builtin();
        let f = program.function_nodes()[0];
        let findings = scan_function(&program, src, Language::Python, &ruleset, f);
        assert!(findings.is_empty());
    }
}
