//! `get_call_graph`, `get_graph_neighborhood`, `get_symbol_references`,
//! `get_cross_file_dependencies`, `validate_paths` (spec §6): everything
//! that answers a question about the shape of a project rather than the
//! content of one file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::dispatcher::{load_project, validate_path, OpExtras, RequestContext, ToolDispatcher, ToolResponse};
use crate::features::cross_file::{ImportGraph, SourceUnit};
use crate::features::pdg::call_graph::{build_call_graph, CallGraph};
use crate::features::query_engine::{find_references, k_hop_neighborhood, Direction, GraphNodeRef, LimitKind};
use crate::shared::models::pir::{NodeId, NodeKind};
use crate::shared::models::symbol::SymbolKind;
use crate::shared::models::{CodegraphError, Result, Span};

#[derive(Debug, Clone, Serialize)]
pub struct CallGraphNodeData {
    pub id: String,
    pub file: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallGraphEdgeData {
    pub from: String,
    pub to: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallGraphData {
    pub nodes: Vec<CallGraphNodeData>,
    pub edges: Vec<CallGraphEdgeData>,
    pub diagram: String,
    pub dynamic_calls: Vec<String>,
}

fn node_ref_id(r: GraphNodeRef) -> String {
    format!("{}:{}", r.unit, r.node.0)
}

fn function_name(units: &[SourceUnit], r: GraphNodeRef) -> Option<String> {
    let unit = units.get(r.unit)?;
    match &unit.program.get(r.node).kind {
        NodeKind::Function(f) => Some(f.name.clone()),
        _ => None,
    }
}

fn node_data(units: &[SourceUnit], r: GraphNodeRef) -> CallGraphNodeData {
    let file = units.get(r.unit).map(|u| u.path.display().to_string()).unwrap_or_default();
    let name = function_name(units, r).unwrap_or_else(|| "<unknown>".to_string());
    CallGraphNodeData { id: node_ref_id(r), file, name }
}

fn diagram_for(units: &[SourceUnit], edges: &[(GraphNodeRef, GraphNodeRef, f32)]) -> String {
    edges
        .iter()
        .map(|(from, to, confidence)| {
            let from_name = function_name(units, *from).unwrap_or_else(|| node_ref_id(*from));
            let to_name = function_name(units, *to).unwrap_or_else(|| node_ref_id(*to));
            format!("{from_name} -> {to_name} [{confidence:.2}]")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(super) fn locate_function_node(units: &[SourceUnit], file: Option<&Path>, symbol_name: &str) -> Result<GraphNodeRef> {
    for (unit_idx, unit) in units.iter().enumerate() {
        if let Some(file) = file {
            if unit.path != file {
                continue;
            }
        }
        for symbol in &unit.table.symbols {
            if !symbol.kind.is_callable() {
                continue;
            }
            let matches = symbol.qualified_name == symbol_name
                || symbol.qualified_name.ends_with(&format!("::{symbol_name}"));
            if matches {
                if let Some(node) = symbol.declaring_node {
                    return Ok(GraphNodeRef { unit: unit_idx, node });
                }
            }
        }
    }
    Err(CodegraphError::symbol_not_found(format!("no callable symbol named '{symbol_name}' found")))
}

impl ToolDispatcher {
    /// `get_call_graph` (spec §6): the project-wide call graph, optionally
    /// rooted at `entry_point` and bounded to `depth` hops from it.
    pub fn get_call_graph(
        &self,
        ctx: &RequestContext,
        project_root: &Path,
        entry_point: Option<&str>,
        depth: usize,
    ) -> ToolResponse {
        self.run("get_call_graph", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<CallGraphData> = (|| {
                let root = validate_path(project_root, &self.config.allowed_roots, false)?;
                let (units, _graph, warnings) = load_project(&root, &self.config.sanitizer_policy, limits.max_files)?;
                extras.warnings = warnings;
                let call_graph = build_call_graph(&units);

                let (node_refs, edges): (Vec<GraphNodeRef>, Vec<(GraphNodeRef, GraphNodeRef, f32)>) =
                    if let Some(entry) = entry_point {
                        let center = locate_function_node(&units, None, entry)?;
                        let subgraph = k_hop_neighborhood(&call_graph, center, depth.max(1), Direction::Out, limits.max_nodes, 0.0);
                        if subgraph.truncated {
                            extras.truncated_by_limit = Some(LimitKind::MaxNodes);
                        }
                        (subgraph.nodes, subgraph.edges)
                    } else {
                        let mut seen = HashSet::new();
                        let mut nodes = Vec::new();
                        let mut edges = Vec::new();
                        for e in &call_graph.edges {
                            let from = GraphNodeRef { unit: e.caller_unit, node: e.caller };
                            let to = GraphNodeRef { unit: e.callee_unit, node: e.callee };
                            edges.push((from, to, e.confidence));
                            if seen.insert(from) {
                                nodes.push(from);
                            }
                            if seen.insert(to) {
                                nodes.push(to);
                            }
                        }
                        nodes.sort_by_key(|n| (n.unit, n.node.0));
                        let truncated = nodes.len() > limits.max_nodes;
                        if truncated {
                            nodes.truncate(limits.max_nodes);
                            let retained: HashSet<_> = nodes.iter().copied().collect();
                            edges.retain(|(f, t, _)| retained.contains(f) && retained.contains(t));
                            extras.truncated_by_limit = Some(LimitKind::MaxNodes);
                        }
                        (nodes, edges)
                    };

                Ok(CallGraphData {
                    nodes: node_refs.iter().map(|r| node_data(&units, *r)).collect(),
                    edges: edges
                        .iter()
                        .map(|(from, to, confidence)| CallGraphEdgeData {
                            from: node_ref_id(*from),
                            to: node_ref_id(*to),
                            confidence: *confidence,
                        })
                        .collect(),
                    diagram: diagram_for(&units, &edges),
                    dynamic_calls: call_graph.dynamic_calls.iter().map(|d| d.reason.clone()).collect(),
                })
            })();
            (result, extras)
        })
    }

    /// `get_graph_neighborhood` (spec §6): BFS k-hop neighborhood of a
    /// named function/method within the project call graph.
    pub fn get_graph_neighborhood(
        &self,
        ctx: &RequestContext,
        project_root: &Path,
        center_symbol: &str,
        k: usize,
        direction: &str,
        max_nodes: Option<usize>,
    ) -> ToolResponse {
        self.run("get_graph_neighborhood", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let cap = max_nodes.unwrap_or(limits.max_nodes).min(limits.max_nodes);
            let result: Result<CallGraphData> = (|| {
                let root = validate_path(project_root, &self.config.allowed_roots, false)?;
                let (units, _graph, warnings) = load_project(&root, &self.config.sanitizer_policy, limits.max_files)?;
                extras.warnings = warnings;
                let call_graph = build_call_graph(&units);
                let center = locate_function_node(&units, None, center_symbol)?;
                let direction = match direction {
                    "in" => Direction::In,
                    "out" => Direction::Out,
                    _ => Direction::Both,
                };
                let subgraph = k_hop_neighborhood(&call_graph, center, k, direction, cap, 0.0);
                if subgraph.truncated {
                    extras.truncated_by_limit = Some(LimitKind::MaxNodes);
                }
                Ok(CallGraphData {
                    nodes: subgraph.nodes.iter().map(|r| node_data(&units, *r)).collect(),
                    edges: subgraph
                        .edges
                        .iter()
                        .map(|(from, to, confidence)| CallGraphEdgeData {
                            from: node_ref_id(*from),
                            to: node_ref_id(*to),
                            confidence: *confidence,
                        })
                        .collect(),
                    diagram: diagram_for(&units, &subgraph.edges),
                    dynamic_calls: Vec::new(),
                })
            })();
            (result, extras)
        })
    }

    /// `get_symbol_references` (spec §6): every `Name` node across the
    /// project bound to `qualified_name`, optionally restricted to a
    /// module-path `scope` prefix.
    pub fn get_symbol_references(
        &self,
        ctx: &RequestContext,
        project_root: &Path,
        qualified_name: &str,
        scope: Option<&str>,
    ) -> ToolResponse {
        self.run("get_symbol_references", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<Vec<SymbolReferenceData>> = (|| {
                let root = validate_path(project_root, &self.config.allowed_roots, false)?;
                let (units, _graph, warnings) = load_project(&root, &self.config.sanitizer_policy, limits.max_files)?;
                extras.warnings = warnings;
                let mut refs: Vec<SymbolReferenceData> = find_references(&units, qualified_name, scope)
                    .into_iter()
                    .map(|r| SymbolReferenceData {
                        file: units[r.unit].path.display().to_string(),
                        span: r.span,
                    })
                    .collect();
                if refs.len() > limits.max_findings {
                    refs.truncate(limits.max_findings);
                    extras.truncated_by_limit = Some(LimitKind::MaxFindings);
                }
                Ok(refs)
            })();
            (result, extras)
        })
    }

    /// `get_cross_file_dependencies` (spec §6): the declarations
    /// `target_symbol` in `target_file` depends on, chased across import
    /// boundaries up to `max_depth` hops.
    pub fn get_cross_file_dependencies(
        &self,
        ctx: &RequestContext,
        project_root: &Path,
        target_file: &Path,
        target_symbol: &str,
        max_depth: usize,
    ) -> ToolResponse {
        self.run("get_cross_file_dependencies", ctx, || {
            let mut extras = OpExtras::default();
            let limits = self.resolve_limits(ctx);
            let result: Result<Vec<DependencyEntryData>> = (|| {
                let root = validate_path(project_root, &self.config.allowed_roots, false)?;
                let (units, import_graph, warnings) =
                    load_project(&root, &self.config.sanitizer_policy, limits.max_files)?;
                extras.warnings = warnings;
                let target_file = validate_path(target_file, &self.config.allowed_roots, false)?;
                let start = locate_function_node(&units, Some(&target_file), target_symbol)?;
                let start_symbol = units[start.unit]
                    .table
                    .symbols
                    .iter()
                    .find(|s| s.declaring_node == Some(start.node))
                    .map(|s| s.id)
                    .ok_or_else(|| CodegraphError::symbol_not_found("resolved node has no symbol entry".to_string()))?;
                let (entries, truncated) =
                    cross_file_dependencies(&units, &import_graph, start.unit, start_symbol, max_depth.max(1));
                if truncated {
                    extras.truncated_by_limit = Some(LimitKind::MaxDepth);
                }
                Ok(entries)
            })();
            (result, extras)
        })
    }

    /// `validate_paths` (spec §6): per-path safety check against the
    /// engine's allowed roots plus the caller-supplied `project_root`.
    pub fn validate_paths(&self, ctx: &RequestContext, paths: &[PathBuf], project_root: &Path) -> ToolResponse {
        self.run("validate_paths", ctx, || {
            let extras = OpExtras::default();
            let mut roots = self.config.allowed_roots.clone();
            roots.push(project_root.to_path_buf());
            let results: Vec<PathValidityData> = paths
                .iter()
                .map(|p| match validate_path(p, &roots, false) {
                    Ok(resolved) => PathValidityData { path: p.display().to_string(), valid: true, reason: None, resolved: Some(resolved.display().to_string()) },
                    Err(err) => PathValidityData { path: p.display().to_string(), valid: false, reason: Some(err.message), resolved: None },
                })
                .collect();
            (Ok(results), extras)
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolReferenceData {
    pub file: String,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyEntryData {
    pub qualified_name: String,
    pub file: String,
    pub code: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathValidityData {
    pub path: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

fn collect_bound_names(program: &crate::shared::models::pir::Program, root: NodeId, out: &mut Vec<NodeId>) {
    if matches!(program.get(root).kind, NodeKind::Name(_)) {
        out.push(root);
    }
    for child in program.children(root) {
        collect_bound_names(program, child, out);
    }
}

/// BFS over symbol bindings reachable from `(start_unit, start_symbol)`,
/// following `Import`-kind bindings across unit boundaries through
/// `import_graph` (spec §4.8 "cross-file dependency chasing" generalized
/// to whole-project scope instead of one already-parsed unit).
fn cross_file_dependencies(
    units: &[SourceUnit],
    import_graph: &ImportGraph,
    start_unit: usize,
    start_symbol: crate::shared::models::pir::SymbolId,
    max_depth: usize,
) -> (Vec<DependencyEntryData>, bool) {
    let mut seen: HashSet<(usize, crate::shared::models::pir::SymbolId)> = HashSet::new();
    seen.insert((start_unit, start_symbol));
    let mut frontier = vec![(start_unit, start_symbol, 0usize)];
    let mut out = Vec::new();
    let mut truncated = false;

    while let Some((unit_idx, sym_id, depth)) = frontier.pop() {
        let unit = &units[unit_idx];
        let symbol = unit.table.get(sym_id);
        let Some(decl_node) = symbol.declaring_node else { continue };

        if (unit_idx, sym_id) != (start_unit, start_symbol) {
            let span = unit.program.get(decl_node).span;
            let text = std::fs::read_to_string(&unit.path).unwrap_or_default();
            out.push(DependencyEntryData {
                qualified_name: symbol.qualified_name.clone(),
                file: unit.path.display().to_string(),
                code: span.slice(&text).to_string(),
                start_line: span.start_line,
                end_line: span.end_line,
            });
        }

        if depth >= max_depth {
            truncated = true;
            continue;
        }

        let mut names = Vec::new();
        collect_bound_names(&unit.program, decl_node, &mut names);
        for name_id in names {
            let NodeKind::Name(n) = &unit.program.get(name_id).kind else { continue };
            let Some(bound) = n.binding else { continue };
            let bound_symbol = unit.table.get(bound);
            match bound_symbol.kind {
                SymbolKind::Import => {
                    let Some(import_node) = bound_symbol.declaring_node else { continue };
                    if let Some(&global) = import_graph.resolved.get(&(unit_idx, import_node)) {
                        if seen.insert((global.unit, global.symbol)) {
                            frontier.push((global.unit, global.symbol, depth + 1));
                        }
                    }
                }
                SymbolKind::Function | SymbolKind::Class | SymbolKind::Method => {
                    if seen.insert((unit_idx, bound)) {
                        frontier.push((unit_idx, bound, depth + 1));
                    }
                }
                _ => {}
            }
        }
    }

    out.sort_by(|a, b| a.file.cmp(&b.file).then(a.qualified_name.cmp(&b.qualified_name)));
    (out, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalpelConfig;

    #[test]
    fn validate_paths_reports_outside_root_without_failing_the_call() {
        let tmp = tempfile::tempdir().unwrap();
        let allowed = tmp.path().join("allowed");
        std::fs::create_dir_all(&allowed).unwrap();
        let outside = tmp.path().join("outside.py");
        std::fs::write(&outside, "x = 1\n").unwrap();

        let dispatcher = ToolDispatcher::new(ScalpelConfig::default());
        let ctx = RequestContext::new("community");
        let response = dispatcher.validate_paths(&ctx, &[outside.clone()], &allowed);
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data[0]["valid"], false);
    }
}
