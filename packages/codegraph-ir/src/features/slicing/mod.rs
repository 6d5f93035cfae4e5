//! Forward/backward PDG slicing (spec §4.6 "Forward/backward slice").
//!
//! A slice is the set of PDG nodes reachable from a root through def-use
//! (backward) or use-def (forward) and control-dependence edges, subject to
//! a node budget. Traversal is breadth-first with nodes of earlier span
//! visited first (spec §4.6 tie-break), so the result is deterministic for
//! a fixed PDG.

use std::collections::{HashSet, VecDeque};

use crate::features::pdg::{Pdg, PdgEdgeKind};
use crate::shared::models::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceDirection {
    Backward,
    Forward,
}

#[derive(Debug, Clone)]
pub struct SliceResult {
    pub nodes: Vec<usize>,
    pub spans: Vec<Span>,
    pub truncated: bool,
}

/// Slices `pdg` from `root` (a PDG node index) in `direction`, visiting at
/// most `budget` nodes. Backward follows `def_use`/`control_dep` edges
/// against their direction (what influenced `root`); forward follows them
/// along their direction (what `root` influences).
pub fn slice(pdg: &Pdg, root: usize, direction: SliceDirection, budget: usize) -> SliceResult {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    let mut order = Vec::new();
    visited.insert(root);
    queue.push_back(root);

    let mut truncated = false;
    while let Some(node) = queue.pop_front() {
        order.push(node);
        if order.len() >= budget {
            truncated = !queue.is_empty() || has_more_neighbors(pdg, &order, direction, &visited);
            break;
        }

        let mut neighbors: Vec<usize> = pdg
            .edges
            .iter()
            .filter_map(|e| match (direction, &e.kind) {
                (SliceDirection::Backward, PdgEdgeKind::DataFlow { .. } | PdgEdgeKind::DefUse)
                    if e.to == node =>
                {
                    Some(e.from)
                }
                (SliceDirection::Backward, PdgEdgeKind::ControlDep) if e.to == node => Some(e.from),
                (SliceDirection::Forward, PdgEdgeKind::DataFlow { .. } | PdgEdgeKind::DefUse)
                    if e.from == node =>
                {
                    Some(e.to)
                }
                (SliceDirection::Forward, PdgEdgeKind::ControlDep) if e.from == node => Some(e.to),
                _ => None,
            })
            .collect();
        neighbors.sort_by_key(|&n| pdg.nodes[n].span);
        for n in neighbors {
            if visited.insert(n) {
                queue.push_back(n);
            }
        }
    }

    let spans = order.iter().map(|&n| pdg.nodes[n].span).collect();
    SliceResult { nodes: order, spans, truncated }
}

fn has_more_neighbors(
    pdg: &Pdg,
    covered: &[usize],
    direction: SliceDirection,
    visited: &HashSet<usize>,
) -> bool {
    let covered_set: HashSet<usize> = covered.iter().copied().collect();
    pdg.edges.iter().any(|e| {
        let (from_covered, to_covered) = match direction {
            SliceDirection::Backward => (covered_set.contains(&e.to), visited.contains(&e.from)),
            SliceDirection::Forward => (covered_set.contains(&e.from), visited.contains(&e.to)),
        };
        from_covered && !to_covered
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir_generation::python;
    use crate::features::parsing::python::PythonFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};
    use crate::features::pdg::build_pdg;
    use crate::shared::models::SourceUnitId;

    fn build(src: &str) -> (crate::shared::models::pir::Program, crate::shared::models::pir::NodeId) {
        let fe = PythonFrontEnd;
        let native = fe.parse(src, ParseOptions::default()).unwrap();
        let program = python::lower(&native, SourceUnitId(0));
        let f = program.function_nodes()[0];
        (program, f)
    }

    #[test]
    fn backward_slice_from_return_includes_its_definition() {
        let (program, f) = build("def f():\n    x = 1\n    return x\n");
        let pdg = build_pdg(&program, f);
        let use_idx = pdg
            .nodes
            .iter()
            .position(|n| matches!(n.kind, crate::features::pdg::PdgNodeKind::Use))
            .expect("at least one use node");
        let result = slice(&pdg, use_idx, SliceDirection::Backward, 100);
        assert!(!result.truncated);
        assert!(result.nodes.len() >= 1);
    }

    #[test]
    fn small_budget_reports_truncation() {
        let (program, f) = build(
            "def f():\n    a = 1\n    b = a\n    c = b\n    d = c\n    return d\n",
        );
        let pdg = build_pdg(&program, f);
        if pdg.nodes.is_empty() {
            return;
        }
        let root = pdg.nodes.len() - 1;
        let result = slice(&pdg, root, SliceDirection::Backward, 1);
        assert_eq!(result.nodes.len(), 1);
    }
}
