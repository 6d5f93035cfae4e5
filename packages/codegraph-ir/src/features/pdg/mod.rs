//! Program Dependence Graph assembly (spec §4.5) and, in `call_graph`, the
//! project-wide call graph built over the same per-unit symbol tables.

pub mod call_graph;

use ahash::AHashMap;

use crate::features::data_flow::{def_use_chains, reaching_definitions, DefSite};
use crate::features::flow_graph::build_cfg;
use crate::shared::models::pir::{FunctionData, NodeId, NodeKind, Program};
use crate::shared::models::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdgNodeKind {
    Statement,
    Expression,
    Def,
    Use,
    Region,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PdgEdgeKind {
    DataFlow { variable: String },
    ControlDep,
    DefUse,
    UseDef,
}

#[derive(Debug, Clone, Copy)]
pub struct PdgNode {
    pub ir_node: NodeId,
    pub kind: PdgNodeKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct PdgEdge {
    pub from: usize,
    pub to: usize,
    pub kind: PdgEdgeKind,
}

/// A function's Program Dependence Graph. Node indices are stable for the
/// lifetime of the graph; `index_of` maps a PIR node back to its (first)
/// PDG node index.
#[derive(Debug)]
pub struct Pdg {
    pub function: NodeId,
    pub nodes: Vec<PdgNode>,
    pub edges: Vec<PdgEdge>,
    pub index_of: AHashMap<NodeId, usize>,
}

impl Pdg {
    fn node_or_insert(&mut self, program: &Program, ir_node: NodeId, kind: PdgNodeKind) -> usize {
        if let Some(&idx) = self.index_of.get(&ir_node) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(PdgNode { ir_node, kind, span: program.get(ir_node).span });
        self.index_of.insert(ir_node, idx);
        idx
    }

    /// Canonical ordering for determinism (spec §4.5): nodes sorted by
    /// span, edges sorted lexicographically by endpoint keys.
    pub fn canonical_edges(&self) -> Vec<(Span, Span, String)> {
        let mut out: Vec<(Span, Span, String)> = self
            .edges
            .iter()
            .map(|e| {
                let from = self.nodes[e.from].span;
                let to = self.nodes[e.to].span;
                let label = match &e.kind {
                    PdgEdgeKind::DataFlow { variable } => format!("data_flow:{variable}"),
                    PdgEdgeKind::ControlDep => "control_dep".to_string(),
                    PdgEdgeKind::DefUse => "def_use".to_string(),
                    PdgEdgeKind::UseDef => "use_def".to_string(),
                };
                (from, to, label)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        out
    }
}

/// Builds the PDG for one function: a control-flow graph, reaching
/// definitions, def-use chains, and structural control dependence.
/// Control dependence is derived directly from the PIR's nested body lists
/// rather than a postdominator-frontier computation: the IR has no
/// unstructured control flow (no goto; `break`/`continue` collapse to
/// `None` during lowering), so "nested inside an `If`/`Loop`/`Try` body"
/// already is the control-dependence relation for structured source.
pub fn build_pdg(program: &Program, function: NodeId) -> Pdg {
    let cfg = build_cfg(program, function);
    let facts = reaching_definitions(program, function, &cfg);
    let chains = def_use_chains(program, &cfg, &facts);

    let mut pdg = Pdg { function, nodes: Vec::new(), edges: Vec::new(), index_of: AHashMap::new() };
    let region = pdg.node_or_insert(program, function, PdgNodeKind::Region);

    let body = match &program.get(function).kind {
        NodeKind::Function(FunctionData { body, .. }) => body.clone(),
        _ => Vec::new(),
    };
    link_control_dependence(program, &body, region, &mut pdg);

    for (&use_id, defs) in &chains.use_to_defs {
        let use_idx = pdg.node_or_insert(program, use_id, PdgNodeKind::Use);
        for def in defs {
            if let DefSite::Assignment(def_stmt) = def {
                let def_idx = pdg.node_or_insert(program, *def_stmt, PdgNodeKind::Def);
                let label = variable_label(program, use_id);
                pdg.edges.push(PdgEdge { from: def_idx, to: use_idx, kind: PdgEdgeKind::DataFlow { variable: label } });
                pdg.edges.push(PdgEdge { from: def_idx, to: use_idx, kind: PdgEdgeKind::DefUse });
                pdg.edges.push(PdgEdge { from: use_idx, to: def_idx, kind: PdgEdgeKind::UseDef });
            }
        }
    }

    pdg
}

fn variable_label(program: &Program, use_id: NodeId) -> String {
    match &program.get(use_id).kind {
        NodeKind::Name(n) => n.identifier.clone(),
        NodeKind::Expr(e) => e.text.clone(),
        _ => String::new(),
    }
}

fn link_control_dependence(program: &Program, body: &[NodeId], governing: usize, pdg: &mut Pdg) {
    for &stmt in body {
        let idx = pdg.node_or_insert(program, stmt, PdgNodeKind::Statement);
        pdg.edges.push(PdgEdge { from: governing, to: idx, kind: PdgEdgeKind::ControlDep });
        match &program.get(stmt).kind {
            NodeKind::If(i) => {
                link_control_dependence(program, &i.then_body, idx, pdg);
                link_control_dependence(program, &i.else_body, idx, pdg);
            }
            NodeKind::Loop(l) => {
                link_control_dependence(program, &l.body, idx, pdg);
            }
            NodeKind::Try(t) => {
                link_control_dependence(program, &t.body, idx, pdg);
                for h in &t.handlers {
                    link_control_dependence(program, &h.body, idx, pdg);
                }
                link_control_dependence(program, &t.finally_body, idx, pdg);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir_generation::python;
    use crate::features::parsing::python::PythonFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};
    use crate::shared::models::SourceUnitId;

    fn lower(src: &str) -> Program {
        let fe = PythonFrontEnd;
        let native = fe.parse(src, ParseOptions::default()).unwrap();
        python::lower(&native, SourceUnitId(0))
    }

    #[test]
    fn data_flow_edge_connects_definition_to_use() {
        let program = lower("def f():\n    x = 1\n    return x\n");
        let f = program.function_nodes()[0];
        let pdg = build_pdg(&program, f);
        assert!(pdg.edges.iter().any(|e| matches!(e.kind, PdgEdgeKind::DataFlow { .. })));
    }

    #[test]
    fn canonical_edges_are_sorted_deterministically() {
        let program = lower("def f(x):\n    if x:\n        y = 1\n    return x\n");
        let f = program.function_nodes()[0];
        let pdg = build_pdg(&program, f);
        let a = pdg.canonical_edges();
        let b = pdg.canonical_edges();
        assert_eq!(a, b);
    }
}
