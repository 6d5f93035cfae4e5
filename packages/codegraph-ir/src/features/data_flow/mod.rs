//! Reaching definitions and def-use chains over a function's CFG (spec
//! §4.5: "compute reaching definitions to derive data-flow edges; compute
//! def-use chains for each variable").

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use petgraph::Direction;

use crate::features::flow_graph::{Cfg, CfgNode};
use crate::shared::models::pir::{ExprTag, FunctionData, NodeId, NodeKind, Program};

/// The origin of a reaching definition: either an assignment statement or
/// a function parameter (spec §4.5: "function parameters are treated as
/// initial definitions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefSite {
    Assignment(NodeId),
    Parameter { function: NodeId, index: usize },
}

/// Per-CFG-node reaching-definition facts, keyed by variable name. Attribute
/// writes (`self.x = 1`) are keyed by the attribute name alone (spec §4.5:
/// "aliased definitions reachable through the attribute name only"), which
/// is the conservative approximation the spec calls for rather than a
/// receiver-sensitive points-to analysis.
pub type FactSet = HashMap<String, HashSet<DefSite>>;

pub struct DataFlowFacts {
    pub in_facts: HashMap<NodeIndex, FactSet>,
    pub out_facts: HashMap<NodeIndex, FactSet>,
}

/// Def-use chains derived from `DataFlowFacts`: which `Name` read nodes
/// each definition reaches, and vice versa.
#[derive(Debug, Default)]
pub struct DefUseChains {
    pub def_to_uses: HashMap<DefSite, Vec<NodeId>>,
    pub use_to_defs: HashMap<NodeId, Vec<DefSite>>,
}

fn var_key(program: &Program, node: NodeId) -> Option<String> {
    match &program.get(node).kind {
        NodeKind::Name(n) => Some(n.identifier.clone()),
        NodeKind::Expr(e) => match &e.tag {
            ExprTag::Attribute { attr } => Some(attr.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn gen_for_statement(program: &Program, stmt: NodeId) -> Vec<(String, DefSite)> {
    match &program.get(stmt).kind {
        NodeKind::Assignment(a) => a
            .targets
            .iter()
            .filter_map(|&t| var_key(program, t).map(|k| (k, DefSite::Assignment(stmt))))
            .collect(),
        _ => Vec::new(),
    }
}

/// Computes reaching-definition IN/OUT sets for every CFG node via the
/// standard forward fixed-point. Bounded by `O(nodes^2)` iterations before
/// giving up (spec §4.5 "Bounds and termination"); a per-function CFG this
/// small always converges well inside that bound.
pub fn reaching_definitions(program: &Program, function: NodeId, cfg: &Cfg) -> DataFlowFacts {
    let params = match &program.get(function).kind {
        NodeKind::Function(FunctionData { params, .. }) => params.clone(),
        _ => Vec::new(),
    };

    let mut in_facts: HashMap<NodeIndex, FactSet> = HashMap::new();
    let mut out_facts: HashMap<NodeIndex, FactSet> = HashMap::new();

    let mut entry_gen = FactSet::new();
    for (i, p) in params.iter().enumerate() {
        entry_gen
            .entry(p.name.clone())
            .or_default()
            .insert(DefSite::Parameter { function, index: i });
    }
    out_facts.insert(cfg.entry, entry_gen);

    let order: Vec<NodeIndex> = cfg.graph.node_indices().collect();
    let bound = order.len() * order.len() + 4;
    let mut changed = true;
    let mut iterations = 0;

    while changed && iterations < bound {
        changed = false;
        iterations += 1;
        for &node in &order {
            if node == cfg.entry {
                continue;
            }
            let mut incoming = FactSet::new();
            for pred in cfg.graph.neighbors_directed(node, Direction::Incoming) {
                if let Some(pred_out) = out_facts.get(&pred) {
                    for (k, sites) in pred_out {
                        incoming.entry(k.clone()).or_default().extend(sites.iter().copied());
                    }
                }
            }
            in_facts.insert(node, incoming.clone());

            let gen = match cfg.graph[node] {
                CfgNode::Statement(id) => gen_for_statement(program, id),
                _ => Vec::new(),
            };
            let mut out = incoming;
            for (key, site) in &gen {
                let set = out.entry(key.clone()).or_default();
                set.clear();
                set.insert(*site);
            }

            let prev = out_facts.get(&node);
            if prev != Some(&out) {
                out_facts.insert(node, out);
                changed = true;
            }
        }
    }

    DataFlowFacts { in_facts, out_facts }
}

/// Builds def-use chains: for every statement that reads a variable (a
/// `Name` or attribute-access node not itself an assignment target), binds
/// it to whichever definitions reach that statement.
pub fn def_use_chains(program: &Program, cfg: &Cfg, facts: &DataFlowFacts) -> DefUseChains {
    let mut chains = DefUseChains::default();

    for (&node_idx, stmt_id) in &cfg.index_of {
        let in_set = match facts.in_facts.get(&node_idx) {
            Some(s) => s,
            None => continue,
        };
        let assignment_targets: HashSet<NodeId> = match &program.get(*stmt_id).kind {
            NodeKind::Assignment(a) => a.targets.iter().copied().collect(),
            _ => HashSet::new(),
        };

        for used in collect_reads(program, *stmt_id, &assignment_targets) {
            if let Some(key) = var_key(program, used) {
                if let Some(sites) = in_set.get(&key) {
                    let mut site_list: Vec<DefSite> = sites.iter().copied().collect();
                    site_list.sort_by_key(|s| match s {
                        DefSite::Assignment(id) => (0u8, id.0),
                        DefSite::Parameter { index, .. } => (1u8, *index as u32),
                    });
                    for site in &site_list {
                        chains.def_to_uses.entry(*site).or_default().push(used);
                    }
                    chains.use_to_defs.insert(used, site_list);
                }
            }
        }
    }

    chains
}

fn collect_reads(program: &Program, stmt: NodeId, exclude: &HashSet<NodeId>) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = program.children(stmt);
    while let Some(id) = stack.pop() {
        if exclude.contains(&id) {
            continue;
        }
        match &program.get(id).kind {
            NodeKind::Name(_) => out.push(id),
            NodeKind::Expr(e) if matches!(e.tag, ExprTag::Attribute { .. }) => {
                out.push(id);
                stack.extend(program.children(id));
            }
            _ => stack.extend(program.children(id)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::build_cfg;
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
    fn use_of_assigned_variable_chains_to_its_definition() {
        let program = lower("def f():\n    x = 1\n    return x\n");
        let f = program.function_nodes()[0];
        let cfg = build_cfg(&program, f);
        let facts = reaching_definitions(&program, f, &cfg);
        let chains = def_use_chains(&program, &cfg, &facts);
        assert!(!chains.use_to_defs.is_empty());
    }

    #[test]
    fn parameter_reaches_its_uses() {
        let program = lower("def f(x):\n    return x\n");
        let f = program.function_nodes()[0];
        let cfg = build_cfg(&program, f);
        let facts = reaching_definitions(&program, f, &cfg);
        let chains = def_use_chains(&program, &cfg, &facts);
        assert!(chains
            .use_to_defs
            .values()
            .any(|defs| defs.iter().any(|d| matches!(d, DefSite::Parameter { .. }))));
    }
}
