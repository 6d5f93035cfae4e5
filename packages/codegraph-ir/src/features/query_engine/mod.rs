//! Graph Query Engine (spec §4.6, component C6): slicing, k-hop
//! neighborhood, paths, and symbol references over the call graph and
//! per-file PDGs. Project-map statistics live in [`project_map`] since
//! they operate over the whole project rather than a single graph.

pub mod project_map;

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::features::cross_file::SourceUnit;
use crate::features::pdg::call_graph::CallGraph;
use crate::shared::models::pir::NodeId;
use crate::shared::models::span::Span;

/// Per-call result-size caps (spec §6 "Limits struct"). `None` in any
/// field means "use the engine default for this tier"; callers never see
/// raw defaults, only the resolved struct for their tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierLimits {
    pub max_findings: usize,
    pub max_files: usize,
    pub max_nodes: usize,
    pub max_depth: usize,
    pub max_paths: usize,
    pub max_loop_unroll: usize,
}

impl TierLimits {
    pub const fn community() -> Self {
        Self { max_findings: 50, max_files: 200, max_nodes: 500, max_depth: 5, max_paths: 10, max_loop_unroll: 4 }
    }

    pub const fn pro() -> Self {
        Self { max_findings: 500, max_files: 5_000, max_nodes: 10_000, max_depth: 20, max_paths: 100, max_loop_unroll: 16 }
    }

    pub const fn enterprise() -> Self {
        Self { max_findings: 5_000, max_files: 100_000, max_nodes: 200_000, max_depth: 64, max_paths: 1_000, max_loop_unroll: 64 }
    }

    /// Clamps a caller-supplied partial override against this tier's
    /// ceiling — a caller may ask for *less* than their tier allows but
    /// never more (spec §6: "values exceeding the caller's tier are
    /// clamped").
    pub fn clamp(&self, requested: &PartialLimits) -> Self {
        Self {
            max_findings: clamp_opt(requested.max_findings, self.max_findings),
            max_files: clamp_opt(requested.max_files, self.max_files),
            max_nodes: clamp_opt(requested.max_nodes, self.max_nodes),
            max_depth: clamp_opt(requested.max_depth, self.max_depth),
            max_paths: clamp_opt(requested.max_paths, self.max_paths),
            max_loop_unroll: clamp_opt(requested.max_loop_unroll, self.max_loop_unroll),
        }
    }
}

fn clamp_opt(requested: Option<usize>, ceiling: usize) -> usize {
    requested.map(|r| r.min(ceiling)).unwrap_or(ceiling)
}

/// Caller-supplied `limits` argument (spec §6): every field optional,
/// unset fields take the tier's default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PartialLimits {
    pub max_findings: Option<usize>,
    pub max_files: Option<usize>,
    pub max_nodes: Option<usize>,
    pub max_depth: Option<usize>,
    pub max_paths: Option<usize>,
    pub max_loop_unroll: Option<usize>,
}

/// Names which field of [`TierLimits`] truncated a response, mirrored into
/// `metadata.truncated_by_limit` at the dispatcher boundary (spec §6, §8
/// testable property 7 "truncation honesty").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    MaxFindings,
    MaxFiles,
    MaxNodes,
    MaxDepth,
    MaxPaths,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

/// A node identified by (unit index, PIR node) — the call graph's
/// addressing scheme (spec §3 "Call graph": nodes are function/method
/// symbols; here we key directly off the declaring PIR node since that is
/// what `build_call_graph` emits edges between).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphNodeRef {
    pub unit: usize,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct Subgraph {
    pub nodes: Vec<GraphNodeRef>,
    pub edges: Vec<(GraphNodeRef, GraphNodeRef, f32)>,
    pub truncated: bool,
    pub limit_applied: Option<LimitKind>,
}

/// BFS k-hop neighborhood of `center` in the call graph (spec §4.6
/// "k-hop neighborhood"). When `max_nodes` is reached, the returned graph
/// is a proper subset of the true neighborhood, and `truncated=true`.
pub fn k_hop_neighborhood(
    graph: &CallGraph,
    center: GraphNodeRef,
    k: usize,
    direction: Direction,
    max_nodes: usize,
    min_confidence: f32,
) -> Subgraph {
    let mut visited = HashSet::new();
    visited.insert(center);
    let mut frontier = vec![center];
    let mut edges = Vec::new();
    let mut truncated = false;

    for _ in 0..k {
        if visited.len() >= max_nodes {
            truncated = true;
            break;
        }
        let mut next = Vec::new();
        for &node in &frontier {
            for e in &graph.edges {
                if e.confidence < min_confidence {
                    continue;
                }
                let from = GraphNodeRef { unit: e.caller_unit, node: e.caller };
                let to = GraphNodeRef { unit: e.callee_unit, node: e.callee };
                let hit = match direction {
                    Direction::Out => from == node,
                    Direction::In => to == node,
                    Direction::Both => from == node || to == node,
                };
                if !hit {
                    continue;
                }
                let other = if from == node { to } else { from };
                edges.push((from, to, e.confidence));
                if visited.len() >= max_nodes {
                    truncated = true;
                    continue;
                }
                if visited.insert(other) {
                    next.push(other);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    edges.sort_by(|a, b| (a.0.unit, a.0.node.0, a.1.unit, a.1.node.0).cmp(&(b.0.unit, b.0.node.0, b.1.unit, b.1.node.0)));
    edges.dedup();

    let mut nodes: Vec<GraphNodeRef> = visited.into_iter().collect();
    nodes.sort_by_key(|n| (n.unit, n.node.0));

    Subgraph {
        nodes,
        edges,
        truncated,
        limit_applied: if truncated { Some(LimitKind::MaxNodes) } else { None },
    }
}

#[derive(Debug, Clone)]
pub struct PathsResult {
    pub paths: Vec<Vec<GraphNodeRef>>,
    pub truncated: bool,
}

/// Up to `max_paths` simple paths from `from` to `to` in the call graph,
/// no longer than `max_depth` hops (spec §4.6 "Paths"). DFS with a
/// visited-on-current-path set keeps paths simple; `truncated=true` when
/// more paths exist than `max_paths` allows.
pub fn find_paths(
    graph: &CallGraph,
    from: GraphNodeRef,
    to: GraphNodeRef,
    max_depth: usize,
    max_paths: usize,
) -> PathsResult {
    let mut adjacency: std::collections::HashMap<GraphNodeRef, Vec<GraphNodeRef>> = std::collections::HashMap::new();
    for e in &graph.edges {
        let from_ref = GraphNodeRef { unit: e.caller_unit, node: e.caller };
        let to_ref = GraphNodeRef { unit: e.callee_unit, node: e.callee };
        adjacency.entry(from_ref).or_default().push(to_ref);
    }

    let mut paths = Vec::new();
    let mut truncated = false;
    let mut stack_path = vec![from];
    let mut on_path = HashSet::new();
    on_path.insert(from);

    fn dfs(
        current: GraphNodeRef,
        target: GraphNodeRef,
        adjacency: &std::collections::HashMap<GraphNodeRef, Vec<GraphNodeRef>>,
        depth_left: usize,
        path: &mut Vec<GraphNodeRef>,
        on_path: &mut HashSet<GraphNodeRef>,
        paths: &mut Vec<Vec<GraphNodeRef>>,
        max_paths: usize,
        truncated: &mut bool,
    ) {
        if paths.len() >= max_paths {
            *truncated = true;
            return;
        }
        if current == target && path.len() > 1 {
            paths.push(path.clone());
            return;
        }
        if depth_left == 0 {
            return;
        }
        if let Some(neighbors) = adjacency.get(&current) {
            let mut sorted = neighbors.clone();
            sorted.sort_by_key(|n| (n.unit, n.node.0));
            for next in sorted {
                if on_path.contains(&next) {
                    continue;
                }
                path.push(next);
                on_path.insert(next);
                dfs(next, target, adjacency, depth_left - 1, path, on_path, paths, max_paths, truncated);
                on_path.remove(&next);
                path.pop();
                if paths.len() >= max_paths {
                    *truncated = true;
                    return;
                }
            }
        }
    }

    dfs(from, to, &adjacency, max_depth, &mut stack_path, &mut on_path, &mut paths, max_paths, &mut truncated);

    // A path count at exactly the cap with more neighbors left unexplored
    // is also a truncation; the recursive search already flags that case
    // whenever it hits `max_paths` mid-exploration.
    PathsResult { paths, truncated }
}

#[derive(Debug, Clone)]
pub struct SymbolReference {
    pub unit: usize,
    pub node: NodeId,
    pub span: Span,
}

/// All `Name` nodes across every unit whose resolved binding's qualified
/// name equals `qualified_name` (spec §4.6 "Symbol references"). `scope`
/// optionally restricts to references within a given module path prefix.
pub fn find_references(units: &[SourceUnit], qualified_name: &str, scope: Option<&str>) -> Vec<SymbolReference> {
    let mut out = Vec::new();
    for (unit_idx, unit) in units.iter().enumerate() {
        if let Some(prefix) = scope {
            if !unit.module_path.starts_with(prefix) {
                continue;
            }
        }
        for node_id in unit.program.name_nodes() {
            if let crate::shared::models::pir::NodeKind::Name(n) = &unit.program.get(node_id).kind {
                if let Some(sym_id) = n.binding {
                    if unit.table.get(sym_id).qualified_name == qualified_name {
                        out.push(SymbolReference { unit: unit_idx, node: node_id, span: unit.program.get(node_id).span });
                    }
                }
            }
        }
    }
    out.sort_by_key(|r| (r.unit, r.span));
    out
}

/// Drains `queue` breadth-first and whether it was truncated by `cap`;
/// shared by any future BFS-shaped query that needs the same honesty
/// contract as [`k_hop_neighborhood`] without duplicating the bookkeeping.
pub(crate) fn bounded_bfs_order<T: Copy + Eq + std::hash::Hash>(
    start: T,
    mut neighbors: impl FnMut(T) -> Vec<T>,
    cap: usize,
) -> (Vec<T>, bool) {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut order = Vec::new();
    visited.insert(start);
    queue.push_back(start);
    let mut truncated = false;

    while let Some(node) = queue.pop_front() {
        order.push(node);
        if order.len() >= cap {
            truncated = !queue.is_empty();
            break;
        }
        for n in neighbors(node) {
            if visited.insert(n) {
                queue.push_back(n);
            }
        }
    }
    (order, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_tier_is_most_restrictive() {
        assert!(TierLimits::community().max_nodes < TierLimits::pro().max_nodes);
        assert!(TierLimits::pro().max_nodes < TierLimits::enterprise().max_nodes);
    }

    #[test]
    fn clamp_never_exceeds_tier_ceiling() {
        let tier = TierLimits::community();
        let requested = PartialLimits { max_nodes: Some(999_999), ..Default::default() };
        let resolved = tier.clamp(&requested);
        assert_eq!(resolved.max_nodes, tier.max_nodes);
    }

    #[test]
    fn clamp_honors_a_smaller_request() {
        let tier = TierLimits::enterprise();
        let requested = PartialLimits { max_nodes: Some(5), ..Default::default() };
        let resolved = tier.clamp(&requested);
        assert_eq!(resolved.max_nodes, 5);
    }
}
