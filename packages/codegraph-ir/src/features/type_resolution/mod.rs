//! Symbol table construction and name binding, per source unit.
//!
//! Two passes over a single `Program`: scope construction (collect every
//! declaration with a stable qualified name) followed by binding (resolve
//! every `Name` node to the innermost scope that declares it). Cross-file
//! import resolution is a separate pass in `features::cross_file`, which
//! consumes the `external_module` placeholders this pass leaves behind.

use ahash::AHashMap;
use tracing::warn;

use crate::shared::models::pir::{NodeId, NodeKind, Program, SymbolId};
use crate::shared::models::symbol::{Language, Symbol, SymbolKind, Visibility};
use crate::shared::models::ErrorKind;

/// A warning surfaced during table construction. Not every diagnostic maps
/// onto the wire error taxonomy (`name_collision` does not appear in spec
/// §7); `wire_kind` is set only for the two kinds the dispatcher forwards
/// (`unresolved_import`, `circular_import`).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub wire_kind: Option<ErrorKind>,
    pub node: Option<NodeId>,
}

#[derive(Debug, Default)]
struct Scope {
    declarations: AHashMap<String, SymbolId>,
    parent: Option<usize>,
}

/// Per-file symbol table. Qualified names follow
/// `language::module_path::...::name` (spec §3).
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub symbols: Vec<Symbol>,
    pub by_qualified_name: AHashMap<String, SymbolId>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SymbolTable {
    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn lookup(&self, qualified_name: &str) -> Option<SymbolId> {
        self.by_qualified_name.get(qualified_name).copied()
    }

    fn intern(&mut self, symbol: Symbol) -> SymbolId {
        let id = symbol.id;
        self.by_qualified_name.insert(symbol.qualified_name.clone(), id);
        self.symbols.push(symbol);
        id
    }
}

struct Builder<'p> {
    program: &'p Program,
    module_path: String,
    language: Language,
    table: SymbolTable,
    scopes: Vec<Scope>,
    next_symbol: u32,
    /// Node id of the scope each Function/Class/Module node owns, keyed by
    /// node, so pass 2 can recover the binding context for any descendant.
    scope_of_node: AHashMap<u32, usize>,
}

impl<'p> Builder<'p> {
    fn new(program: &'p Program, module_path: &str, language: Language) -> Self {
        Self {
            program,
            module_path: module_path.to_string(),
            language,
            table: SymbolTable::default(),
            scopes: Vec::new(),
            next_symbol: 0,
            scope_of_node: AHashMap::new(),
        }
    }

    fn new_symbol_id(&mut self) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        id
    }

    fn push_scope(&mut self, parent: Option<usize>) -> usize {
        self.scopes.push(Scope { declarations: AHashMap::new(), parent });
        self.scopes.len() - 1
    }

    /// Declares `name` in `scope_idx`. Per spec §4.4: a second declaration in
    /// the same scope is a `name_collision` warning and the later
    /// declaration wins for binding.
    fn declare(
        &mut self,
        scope_idx: usize,
        name: &str,
        qualified_name: String,
        kind: SymbolKind,
        declaring_node: Option<NodeId>,
        node_for_diag: Option<NodeId>,
    ) -> SymbolId {
        let id = self.new_symbol_id();
        let symbol = Symbol {
            id,
            qualified_name,
            kind,
            declaring_node,
            declaring_source_unit: self.program.source_unit_id,
            visibility: Visibility::Public,
            language: self.language,
        };
        self.table.intern(symbol);

        if self.scopes[scope_idx].declarations.contains_key(name) {
            let message = format!("name collision: '{name}' redeclared in the same scope");
            warn!(%name, "name collision in scope");
            self.table.diagnostics.push(Diagnostic { message, wire_kind: None, node: node_for_diag });
        }
        self.scopes[scope_idx].declarations.insert(name.to_string(), id);
        id
    }

    fn resolve_in_scope(&self, mut scope_idx: usize, name: &str) -> Option<SymbolId> {
        loop {
            if let Some(&id) = self.scopes[scope_idx].declarations.get(name) {
                return Some(id);
            }
            match self.scopes[scope_idx].parent {
                Some(parent) => scope_idx = parent,
                None => return None,
            }
        }
    }

    fn qualify(&self, chain: &[&str], name: &str) -> String {
        let mut parts = vec![self.language.as_str().to_string(), self.module_path.clone()];
        parts.extend(chain.iter().map(|s| s.to_string()));
        parts.push(name.to_string());
        parts.join("::")
    }

    /// Pass 1: walk the tree declaring every name into the scope that owns
    /// it, recursing with an explicit chain of enclosing scope names (for
    /// qualified-name construction) and scope indices (for lookup).
    fn collect_scope(&mut self, node_id: NodeId, scope_idx: usize, chain: &mut Vec<String>) {
        self.scope_of_node.insert(node_id.0, scope_idx);
        let node = self.program.get(node_id);
        match &node.kind {
            NodeKind::Module { top_level } => {
                for &child in top_level {
                    self.declare_statement(child, scope_idx, chain);
                }
            }
            _ => {
                for child in self.program.children(node_id) {
                    self.declare_statement(child, scope_idx, chain);
                }
            }
        }
    }

    fn declare_statement(&mut self, node_id: NodeId, scope_idx: usize, chain: &mut Vec<String>) {
        let node = self.program.get(node_id);
        let span_node = node_id;
        match &node.kind {
            NodeKind::Function(f) => {
                let kind = if f.is_method { SymbolKind::Method } else { SymbolKind::Function };
                let chain_refs: Vec<&str> = chain.iter().map(|s| s.as_str()).collect();
                let qualified = self.qualify(&chain_refs, &f.name);
                self.declare(scope_idx, &f.name, qualified, kind, Some(node_id), Some(span_node));

                let fn_scope = self.push_scope(Some(scope_idx));
                for param in &f.params {
                    let pq = self.qualify(&chain_refs, &format!("{}::{}", f.name, param.name));
                    self.declare(fn_scope, &param.name, pq, SymbolKind::Parameter, Some(node_id), Some(span_node));
                }
                chain.push(f.name.clone());
                for &stmt in &f.body {
                    self.declare_statement(stmt, fn_scope, chain);
                }
                chain.pop();
                self.scope_of_node.insert(node_id.0, fn_scope);
            }
            NodeKind::Class(c) => {
                let chain_refs: Vec<&str> = chain.iter().map(|s| s.as_str()).collect();
                let qualified = self.qualify(&chain_refs, &c.name);
                self.declare(scope_idx, &c.name, qualified, SymbolKind::Class, Some(node_id), Some(span_node));

                let class_scope = self.push_scope(Some(scope_idx));
                chain.push(c.name.clone());
                for &member in &c.members {
                    self.declare_statement(member, class_scope, chain);
                }
                chain.pop();
                self.scope_of_node.insert(node_id.0, class_scope);
            }
            NodeKind::Assignment(a) => {
                let chain_refs: Vec<&str> = chain.iter().map(|s| s.as_str()).collect();
                for &target in &a.targets {
                    if let NodeKind::Name(n) = &self.program.get(target).kind {
                        let qualified = self.qualify(&chain_refs, &n.identifier);
                        self.declare(scope_idx, &n.identifier, qualified, SymbolKind::Variable, Some(target), Some(target));
                    }
                }
            }
            NodeKind::Import(imp) => {
                let chain_refs: Vec<&str> = chain.iter().map(|s| s.as_str()).collect();
                if imp.imported_names.is_empty() {
                    let local_name = imp.module_path.split('.').next_back().unwrap_or(&imp.module_path);
                    let qualified = self.qualify(&chain_refs, local_name);
                    self.declare(scope_idx, local_name, qualified, SymbolKind::Import, Some(node_id), Some(node_id));
                } else {
                    for (i, imported) in imp.imported_names.iter().enumerate() {
                        let local_name = imp
                            .aliases
                            .get(i)
                            .and_then(|a| a.clone())
                            .unwrap_or_else(|| imported.clone());
                        let qualified = self.qualify(&chain_refs, &local_name);
                        self.declare(scope_idx, &local_name, qualified, SymbolKind::Import, Some(node_id), Some(node_id));
                    }
                }
            }
            NodeKind::If(i) => {
                for &s in i.then_body.iter().chain(i.else_body.iter()) {
                    self.declare_statement(s, scope_idx, chain);
                }
            }
            NodeKind::Loop(l) => {
                for &s in &l.body {
                    self.declare_statement(s, scope_idx, chain);
                }
            }
            NodeKind::Try(t) => {
                for &s in &t.body {
                    self.declare_statement(s, scope_idx, chain);
                }
                for h in &t.handlers {
                    for &s in &h.body {
                        self.declare_statement(s, scope_idx, chain);
                    }
                }
                for &s in &t.finally_body {
                    self.declare_statement(s, scope_idx, chain);
                }
            }
            _ => {}
        }
    }

    /// Pass 2: rewalk the tree and bind every `Name` use to the symbol
    /// visible in its enclosing scope. Returns `(node_id, symbol_id)` pairs;
    /// the caller applies them to a mutable `Program`.
    fn bind_names(&self, node_id: NodeId, scope_idx: usize, out: &mut Vec<(NodeId, SymbolId)>) {
        let scope_idx = *self.scope_of_node.get(&node_id.0).unwrap_or(&scope_idx);
        let node = self.program.get(node_id);
        if let NodeKind::Name(n) = &node.kind {
            if let Some(sym) = self.resolve_in_scope(scope_idx, &n.identifier) {
                out.push((node_id, sym));
            }
        }
        for child in self.program.children(node_id) {
            self.bind_names(child, scope_idx, out);
        }
    }
}

/// Builds the symbol table for `program` and binds every `Name` node's
/// `binding` slot in place. `module_path` is the project-relative module
/// path used to build qualified names (e.g. `pkg.mod` for Python,
/// `src/pkg/mod` normalized for JS/TS/Java).
pub fn resolve(program: &mut Program, module_path: &str, language: Language) -> SymbolTable {
    let mut builder = Builder::new(program, module_path, language);
    let root_scope = builder.push_scope(None);
    let mut chain = Vec::new();
    builder.collect_scope(program.root, root_scope, &mut chain);

    let mut bindings = Vec::new();
    builder.bind_names(program.root, root_scope, &mut bindings);

    let table = std::mem::take(&mut builder.table);
    for (node_id, symbol_id) in bindings {
        if let NodeKind::Name(n) = &mut program.get_mut(node_id).kind {
            n.binding = Some(symbol_id);
        }
    }
    table
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
    fn binds_local_variable_reference() {
        let mut program = lower("def f():\n    x = 1\n    return x\n");
        let table = resolve(&mut program, "mod", Language::Python);
        assert!(table.lookup("python::mod::f").is_some());

        let bound = program
            .name_nodes()
            .into_iter()
            .filter_map(|id| match &program.get(id).kind {
                NodeKind::Name(n) if n.identifier == "x" => n.binding,
                _ => None,
            })
            .count();
        assert!(bound >= 1);
    }

    #[test]
    fn detects_name_collision_in_same_scope() {
        let mut program = lower("x = 1\nx = 2\n");
        let table = resolve(&mut program, "mod", Language::Python);
        assert!(table.diagnostics.iter().any(|d| d.message.contains("collision")));
    }

    #[test]
    fn method_gets_qualified_name_under_owning_class() {
        let mut program = lower("class C:\n    def m(self):\n        return 1\n");
        let table = resolve(&mut program, "mod", Language::Python);
        assert!(table.lookup("python::mod::C::m").is_some());
    }
}
