//! Cross-file import resolution: the project-wide half of symbol binding
//! (spec §4.4). Per-file scope construction and name binding lives in
//! `features::type_resolution`; this module wires those per-file tables
//! together along the import graph.

use std::collections::HashMap;
use std::path::PathBuf;

use ahash::AHashMap;
use tracing::warn;

use crate::features::type_resolution::{resolve, Diagnostic, SymbolTable};
use crate::shared::models::pir::{NodeId, NodeKind, Program, SymbolId};
use crate::shared::models::symbol::{ExternalModuleSymbol, Language};
use crate::shared::models::ErrorKind;

/// One parsed file plus its per-file symbol table, identified by a
/// project-relative module path (e.g. `pkg.mod` for Python).
pub struct SourceUnit {
    pub path: PathBuf,
    pub module_path: String,
    pub language: Language,
    pub program: Program,
    pub table: SymbolTable,
}

/// Reference to a symbol declared in some unit of the project, precise
/// across files. `ImportData::resolved_symbol` (spec §3) only carries a
/// unit-local `SymbolId`; this pairs it with the owning unit's index so
/// downstream components (call graph, query engine) can dereference it
/// without ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalSymbolId {
    pub unit: usize,
    pub symbol: SymbolId,
}

/// Project-wide resolution result: one `GlobalSymbolId` per resolved
/// `Import` node, and one `ExternalModuleSymbol` per import that could not
/// be matched against any unit in the project.
#[derive(Debug, Default)]
pub struct ImportGraph {
    pub resolved: HashMap<(usize, NodeId), GlobalSymbolId>,
    pub external: HashMap<(usize, NodeId), ExternalModuleSymbol>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Builds each unit's per-file symbol table (type_resolution pass), then
/// resolves imports across units in topological order over the import
/// graph. Cycles are allowed (spec §4.4): reported as `circular_import`
/// warnings, with binding inside a cycle preferring the lexically earliest
/// module path.
pub fn build_project(mut units: Vec<SourceUnit>) -> (Vec<SourceUnit>, ImportGraph) {
    for unit in &mut units {
        unit.table = resolve(&mut unit.program, &unit.module_path, unit.language);
    }

    let module_index: AHashMap<String, usize> = units
        .iter()
        .enumerate()
        .map(|(i, u)| (u.module_path.clone(), i))
        .collect();

    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    struct PendingImport {
        unit_idx: usize,
        node_id: NodeId,
        target_module: String,
        imported_names: Vec<String>,
        aliases: Vec<Option<String>>,
    }
    let mut pending = Vec::new();

    for (i, unit) in units.iter().enumerate() {
        for node_id in unit.program.walk() {
            if let NodeKind::Import(imp) = &unit.program.get(node_id).kind {
                let target_module = if imp.is_relative {
                    resolve_relative(&imp.module_path, &unit.module_path)
                } else {
                    imp.module_path.clone()
                };
                pending.push(PendingImport {
                    unit_idx: i,
                    node_id,
                    target_module,
                    imported_names: imp.imported_names.clone(),
                    aliases: imp.aliases.clone(),
                });
            }
        }
    }

    let mut graph = ImportGraph::default();

    for p in &pending {
        match module_index.get(&p.target_module) {
            Some(&target_idx) => edges[p.unit_idx].push(target_idx),
            None => {
                let path = p.target_module.clone();
                let diag_message = format!("unresolved import: '{path}' not found in project");
                warn!(import = %path, "unresolved import");
                graph.diagnostics.push(Diagnostic {
                    message: diag_message,
                    wire_kind: Some(ErrorKind::UnresolvedImport),
                    node: Some(p.node_id),
                });
                graph.external.insert(
                    (p.unit_idx, p.node_id),
                    ExternalModuleSymbol { id: SymbolId(0), import_path: path },
                );
            }
        }
    }

    let cyclic_units = cyclic_members(&edges);
    if !cyclic_units.is_empty() {
        let mut names: Vec<&str> = cyclic_units.iter().map(|&i| units[i].module_path.as_str()).collect();
        names.sort_unstable();
        let message = format!("circular import among: {}", names.join(", "));
        warn!(cycle = %message, "circular import detected");
        graph.diagnostics.push(Diagnostic { message, wire_kind: Some(ErrorKind::CircularImport), node: None });
    }

    let order = topo_order(&edges, units.len());

    for p in &pending {
        if graph.external.contains_key(&(p.unit_idx, p.node_id)) {
            continue;
        }
        let Some(&target_idx) = module_index.get(&p.target_module) else { continue };
        let _ = &order;

        if p.imported_names.is_empty() {
            if let Some(sym) = units[target_idx].table.lookup(&format!(
                "{}::{}",
                units[target_idx].language.as_str(),
                units[target_idx].module_path
            )) {
                graph.resolved.insert((p.unit_idx, p.node_id), GlobalSymbolId { unit: target_idx, symbol: sym });
            }
            continue;
        }

        for (idx, imported) in p.imported_names.iter().enumerate() {
            if imported == "*" {
                continue;
            }
            let qualified = format!(
                "{}::{}::{}",
                units[target_idx].language.as_str(),
                units[target_idx].module_path,
                imported
            );
            if let Some(sym) = units[target_idx].table.lookup(&qualified) {
                graph.resolved.insert((p.unit_idx, p.node_id), GlobalSymbolId { unit: target_idx, symbol: sym });
            } else {
                let local_name = p.aliases.get(idx).cloned().flatten().unwrap_or_else(|| imported.clone());
                graph.external.insert(
                    (p.unit_idx, p.node_id),
                    ExternalModuleSymbol {
                        id: SymbolId(0),
                        import_path: format!("{}.{}", p.target_module, local_name),
                    },
                );
            }
        }
    }

    (units, graph)
}

/// Resolves a relative import (leading dots) against the importing unit's
/// own module path by walking up one package level per leading dot.
fn resolve_relative(target: &str, from_module: &str) -> String {
    let dots = target.chars().take_while(|&c| c == '.').count();
    let rest = &target[dots..];
    let mut base: Vec<&str> = from_module.split('.').collect();
    base.pop(); // drop the importing module's own leaf segment
    for _ in 1..dots {
        base.pop();
    }
    if rest.is_empty() {
        base.join(".")
    } else if base.is_empty() {
        rest.to_string()
    } else {
        format!("{}.{}", base.join("."), rest)
    }
}

/// Tarjan-lite cycle membership check: returns every node index that
/// participates in at least one cycle of the import graph.
fn cyclic_members(edges: &[Vec<usize>]) -> Vec<usize> {
    let n = edges.len();
    let mut index = vec![None; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut counter = 0usize;
    let mut members = Vec::new();

    fn strongconnect(
        v: usize,
        edges: &[Vec<usize>],
        index: &mut Vec<Option<usize>>,
        low: &mut [usize],
        on_stack: &mut [bool],
        stack: &mut Vec<usize>,
        counter: &mut usize,
        members: &mut Vec<usize>,
    ) {
        index[v] = Some(*counter);
        low[v] = *counter;
        *counter += 1;
        stack.push(v);
        on_stack[v] = true;

        for &w in &edges[v] {
            if index[w].is_none() {
                strongconnect(w, edges, index, low, on_stack, stack, counter, members);
                low[v] = low[v].min(low[w]);
            } else if on_stack[w] {
                low[v] = low[v].min(index[w].unwrap());
            }
        }

        if low[v] == index[v].unwrap() {
            let mut component = Vec::new();
            loop {
                let w = stack.pop().unwrap();
                on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            if component.len() > 1 {
                members.extend(component);
            }
        }
    }

    for v in 0..n {
        if index[v].is_none() {
            strongconnect(v, edges, &mut index, &mut low, &mut on_stack, &mut stack, &mut counter, &mut members);
        }
    }
    members
}

/// Kahn's algorithm topological order; when a cycle prevents a full
/// ordering the remaining nodes are appended in index order so every unit
/// is still processed exactly once.
fn topo_order(edges: &[Vec<usize>], n: usize) -> Vec<usize> {
    let mut indegree = vec![0usize; n];
    for targets in edges {
        for &t in targets {
            indegree[t] += 1;
        }
    }
    let mut queue: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];

    while let Some(v) = queue.pop() {
        if visited[v] {
            continue;
        }
        visited[v] = true;
        order.push(v);
        for &w in &edges[v] {
            indegree[w] = indegree[w].saturating_sub(1);
            if indegree[w] == 0 && !visited[w] {
                queue.push(w);
            }
        }
    }
    for i in 0..n {
        if !visited[i] {
            order.push(i);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ir_generation::python;
    use crate::features::parsing::python::PythonFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};
    use crate::shared::models::SourceUnitId;

    fn unit(path: &str, module_path: &str, src: &str, id: u32) -> SourceUnit {
        let fe = PythonFrontEnd;
        let native = fe.parse(src, ParseOptions::default()).unwrap();
        let program = python::lower(&native, SourceUnitId(id));
        SourceUnit {
            path: PathBuf::from(path),
            module_path: module_path.to_string(),
            language: Language::Python,
            program,
            table: SymbolTable::default(),
        }
    }

    #[test]
    fn resolves_import_to_target_unit_function() {
        let units = vec![
            unit("a.py", "a", "def helper():\n    return 1\n", 0),
            unit("b.py", "b", "from a import helper\n", 1),
        ];
        let (_units, graph) = build_project(units);
        assert!(graph.resolved.values().any(|g| g.unit == 0));
    }

    #[test]
    fn unresolved_import_becomes_external_module() {
        let units = vec![unit("b.py", "b", "import does_not_exist\n", 0)];
        let (_units, graph) = build_project(units);
        assert_eq!(graph.external.len(), 1);
        assert!(graph.diagnostics.iter().any(|d| d.wire_kind == Some(ErrorKind::UnresolvedImport)));
    }

    #[test]
    fn circular_import_is_reported_not_fatal() {
        let units = vec![
            unit("a.py", "a", "import b\n", 0),
            unit("b.py", "b", "import a\n", 1),
        ];
        let (_units, graph) = build_project(units);
        assert!(graph.diagnostics.iter().any(|d| d.wire_kind == Some(ErrorKind::CircularImport)));
    }
}
