//! Project-wide call graph (spec §3 "Call graph", §4.5 "Call graph").
//!
//! Built directly over the per-unit symbol tables `features::cross_file`
//! assembles; does not require a PDG per function, only resolved `Call`
//! sites and the project's symbol index.

use ahash::AHashMap;

use crate::features::cross_file::SourceUnit;
use crate::shared::models::pir::{ClassData, NodeId, NodeKind};
use crate::shared::models::span::Span;
use crate::shared::models::symbol::SymbolKind;

#[derive(Debug, Clone)]
pub struct CallSite {
    pub caller_unit: usize,
    pub caller: NodeId,
    pub callee_unit: usize,
    pub callee: NodeId,
    pub call_span: Span,
    /// In `[0, 1]`. `1.0` when the callee resolves unambiguously; `1/n`
    /// when it was inferred by matching a method name across `n`
    /// candidate classes (spec §4.5 "dynamic dispatch").
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct DynamicCallDiagnostic {
    pub unit: usize,
    pub call_span: Span,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct CallGraph {
    pub edges: Vec<CallSite>,
    pub dynamic_calls: Vec<DynamicCallDiagnostic>,
}

impl CallGraph {
    /// Canonical edge ordering for determinism (spec §4.5): lexicographic
    /// by endpoint keys.
    pub fn canonical(&self) -> Vec<(Span, Span)> {
        let mut out: Vec<(Span, Span)> = self.edges.iter().map(|e| (e.call_span, e.call_span)).collect();
        out.sort();
        out
    }
}

/// Scans every `Call` node across every unit and resolves its callee
/// against the project's symbol tables. Direct calls to a `Name` bound to
/// a function/method symbol get confidence `1.0`. Attribute calls
/// (`obj.method()`) with no static type information fan out to every
/// method of that name declared anywhere in the project, confidence
/// `1/n`. Calls through an `Opaque` barrier, or with no resolvable
/// callee at all, produce a `dynamic_call` diagnostic and no edge.
pub fn build_call_graph(units: &[SourceUnit]) -> CallGraph {
    let mut by_method_name: AHashMap<String, Vec<(usize, NodeId)>> = AHashMap::new();
    for (unit_idx, unit) in units.iter().enumerate() {
        for class_id in unit.program.class_nodes() {
            if let NodeKind::Class(ClassData { members, .. }) = &unit.program.get(class_id).kind {
                for &member in members {
                    if let NodeKind::Function(f) = &unit.program.get(member).kind {
                        if f.is_method {
                            by_method_name.entry(f.name.clone()).or_default().push((unit_idx, member));
                        }
                    }
                }
            }
        }
    }

    let mut graph = CallGraph::default();

    for (unit_idx, unit) in units.iter().enumerate() {
        for node_id in unit.program.walk() {
            let call = match &unit.program.get(node_id).kind {
                NodeKind::Call(c) => c.clone(),
                _ => continue,
            };
            let call_span = unit.program.get(node_id).span;
            let callee_kind = &unit.program.get(call.callee).kind;

            match callee_kind {
                NodeKind::Name(n) => match n.binding {
                    Some(sym_id) => {
                        let sym = unit.table.get(sym_id);
                        if sym.kind.is_callable() {
                            if let Some(declaring) = sym.declaring_node {
                                graph.edges.push(CallSite {
                                    caller_unit: unit_idx,
                                    caller: node_id,
                                    callee_unit: unit_idx,
                                    callee: declaring,
                                    call_span,
                                    confidence: 1.0,
                                });
                                continue;
                            }
                        }
                        graph.dynamic_calls.push(DynamicCallDiagnostic {
                            unit: unit_idx,
                            call_span,
                            reason: "callee symbol is not a function/method".to_string(),
                        });
                    }
                    None => {
                        graph.dynamic_calls.push(DynamicCallDiagnostic {
                            unit: unit_idx,
                            call_span,
                            reason: "unresolved callee name".to_string(),
                        });
                    }
                },
                NodeKind::Expr(e) => {
                    if let crate::shared::models::pir::ExprTag::Attribute { attr } = &e.tag {
                        match by_method_name.get(attr) {
                            Some(candidates) if !candidates.is_empty() => {
                                let confidence = 1.0 / candidates.len() as f32;
                                for &(cand_unit, cand_node) in candidates {
                                    graph.edges.push(CallSite {
                                        caller_unit: unit_idx,
                                        caller: node_id,
                                        callee_unit: cand_unit,
                                        callee: cand_node,
                                        call_span,
                                        confidence,
                                    });
                                }
                            }
                            _ => {
                                graph.dynamic_calls.push(DynamicCallDiagnostic {
                                    unit: unit_idx,
                                    call_span,
                                    reason: format!("no method named '{attr}' found in project"),
                                });
                            }
                        }
                    } else {
                        graph.dynamic_calls.push(DynamicCallDiagnostic {
                            unit: unit_idx,
                            call_span,
                            reason: "callee is not a name or attribute access".to_string(),
                        });
                    }
                }
                NodeKind::Opaque(_) => {
                    graph.dynamic_calls.push(DynamicCallDiagnostic {
                        unit: unit_idx,
                        call_span,
                        reason: "call through an opaque barrier".to_string(),
                    });
                }
                _ => {
                    graph.dynamic_calls.push(DynamicCallDiagnostic {
                        unit: unit_idx,
                        call_span,
                        reason: "unsupported callee expression".to_string(),
                    });
                }
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::cross_file::build_project;
    use crate::features::ir_generation::python;
    use crate::features::parsing::python::PythonFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};
    use crate::features::type_resolution::SymbolTable;
    use crate::shared::models::{Language, SourceUnitId};
    use std::path::PathBuf;

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
    fn direct_call_resolves_with_full_confidence() {
        let units = vec![unit(
            "a.py",
            "a",
            "def helper():\n    return 1\n\ndef main():\n    return helper()\n",
            0,
        )];
        let (units, _graph) = build_project(units);
        let call_graph = build_call_graph(&units);
        assert!(call_graph.edges.iter().any(|e| (e.confidence - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn dynamic_method_dispatch_gets_fractional_confidence() {
        let units = vec![unit(
            "a.py",
            "a",
            "class A:\n    def run(self):\n        return 1\n\nclass B:\n    def run(self):\n        return 2\n\ndef call_it(x):\n    return x.run()\n",
            0,
        )];
        let (units, _graph) = build_project(units);
        let call_graph = build_call_graph(&units);
        assert!(call_graph.edges.iter().any(|e| e.confidence < 1.0));
    }
}
