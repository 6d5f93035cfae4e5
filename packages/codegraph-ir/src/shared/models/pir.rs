//! Program IR (PIR) — the language-agnostic tagged-variant tree every
//! front end lowers into (spec §3). A [`Program`] is an arena of [`Node`]s;
//! graph structures elsewhere in the crate hold [`NodeId`] indices into this
//! arena, never raw pointers, so cloning a graph never duplicates the IR.

use super::span::Span;
use serde::{Deserialize, Serialize};

/// Index into a [`Program`]'s node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identifies the source unit (file) a node was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceUnitId(pub u32);

/// Stable key for a resolved symbol; see [`crate::shared::models::symbol::Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Positional,
    KeywordOnly,
    VarArgs,
    KwArgs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_hint: Option<String>,
    pub default: Option<NodeId>,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionData {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type_hint: Option<String>,
    pub is_async: bool,
    pub is_method: bool,
    pub owning_class: Option<NodeId>,
    pub body: Vec<NodeId>,
    /// Raw decorator/annotation text (Python `@decorator`), used by the
    /// project map's entry-point detection. Empty for languages with no
    /// decorator concept at the function level.
    pub decorators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassData {
    pub name: String,
    pub bases: Vec<String>,
    pub members: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallData {
    pub callee: NodeId,
    pub positional_args: Vec<NodeId>,
    pub keyword_args: Vec<(String, NodeId)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameData {
    pub identifier: String,
    /// Populated by the symbol table pass (C4); `None` until resolved.
    pub binding: Option<SymbolId>,
    /// Best-effort for dynamic languages, native-tree-derived for TS/Java.
    pub inferred_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentData {
    pub targets: Vec<NodeId>,
    pub value: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportData {
    pub module_path: String,
    pub imported_names: Vec<String>,
    pub aliases: Vec<Option<String>>,
    pub is_relative: bool,
    /// Populated once the import is resolved against the project.
    pub resolved_symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfData {
    pub condition: NodeId,
    pub then_body: Vec<NodeId>,
    pub else_body: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    For,
    While,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopData {
    pub kind: LoopKind,
    pub condition: Option<NodeId>,
    pub iterable: Option<NodeId>,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnData {
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptHandler {
    pub exception_type: Option<String>,
    pub binding_name: Option<String>,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TryData {
    pub body: Vec<NodeId>,
    pub handlers: Vec<ExceptHandler>,
    pub finally_body: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaiseData {
    pub exception: Option<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LiteralValue {
    Str(String),
    Number(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteralData {
    pub value: LiteralValue,
}

/// Tag distinguishing the shapes of expression the `Expr` kind wraps.
/// Attribute access and subscripting are represented explicitly (spec §4.3)
/// rather than as opaque text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprTag {
    BinaryOp { operator: String },
    UnaryOp { operator: String },
    Attribute { attr: String },
    Subscript,
    Tuple,
    ListLiteral,
    DictLiteral,
    Lambda,
    Await,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExprData {
    pub tag: ExprTag,
    pub operands: Vec<NodeId>,
    /// Raw source text, kept for display/extraction even though the
    /// structured tag+operands are what analyses consume.
    pub text: String,
}

/// Macros, eval, dynamically generated code, metaclass tricks: recorded
/// as an opaque barrier per spec §4.3. Downstream components must treat
/// `Opaque` as a barrier: no taint flow through, no resolved calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpaqueData {
    pub raw_text: String,
    pub diagnostic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Module { top_level: Vec<NodeId> },
    Function(FunctionData),
    Class(ClassData),
    Call(CallData),
    Name(NameData),
    Assignment(AssignmentData),
    Import(ImportData),
    If(IfData),
    Loop(LoopData),
    Return(ReturnData),
    Try(TryData),
    Raise(RaiseData),
    Literal(LiteralData),
    Expr(ExprData),
    Opaque(OpaqueData),
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Module { .. } => "Module",
            NodeKind::Function(_) => "Function",
            NodeKind::Class(_) => "Class",
            NodeKind::Call(_) => "Call",
            NodeKind::Name(_) => "Name",
            NodeKind::Assignment(_) => "Assignment",
            NodeKind::Import(_) => "Import",
            NodeKind::If(_) => "If",
            NodeKind::Loop(_) => "Loop",
            NodeKind::Return(_) => "Return",
            NodeKind::Try(_) => "Try",
            NodeKind::Raise(_) => "Raise",
            NodeKind::Literal(_) => "Literal",
            NodeKind::Expr(_) => "Expr",
            NodeKind::Opaque(_) => "Opaque",
        }
    }
}

/// One node in the PIR tree. Every child's span is contained in its
/// parent's span (invariant checked by `Program::check_invariants`), and
/// children are ordered to match source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub span: Span,
    pub source_unit_id: SourceUnitId,
    pub parent: Option<NodeId>,
}

/// An arena-owned PIR tree for a single source unit. Owns its nodes
/// exclusively; nothing outside holds a `&Node` past the `Program`'s
/// lifetime, satisfying the ownership model in spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub source_unit_id: SourceUnitId,
    pub nodes: Vec<Node>,
    pub root: NodeId,
}

impl Program {
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn root_node(&self) -> &Node {
        self.get(self.root)
    }

    /// Direct children of `id`, derived from the node's own kind-specific
    /// child lists (the PIR has no separate edge table for tree structure).
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.get(id);
        match &node.kind {
            NodeKind::Module { top_level } => top_level.clone(),
            NodeKind::Function(f) => f.body.clone(),
            NodeKind::Class(c) => c.members.clone(),
            NodeKind::Call(c) => {
                let mut kids = vec![c.callee];
                kids.extend(c.positional_args.iter().copied());
                kids.extend(c.keyword_args.iter().map(|(_, v)| *v));
                kids
            }
            NodeKind::Name(_) => vec![],
            NodeKind::Assignment(a) => {
                let mut kids = a.targets.clone();
                kids.push(a.value);
                kids
            }
            NodeKind::Import(_) => vec![],
            NodeKind::If(i) => {
                let mut kids = vec![i.condition];
                kids.extend(i.then_body.iter().copied());
                kids.extend(i.else_body.iter().copied());
                kids
            }
            NodeKind::Loop(l) => {
                let mut kids = vec![];
                kids.extend(l.condition);
                kids.extend(l.iterable);
                kids.extend(l.body.iter().copied());
                kids
            }
            NodeKind::Return(r) => r.value.into_iter().collect(),
            NodeKind::Try(t) => {
                let mut kids = t.body.clone();
                for h in &t.handlers {
                    kids.extend(h.body.iter().copied());
                }
                kids.extend(t.finally_body.iter().copied());
                kids
            }
            NodeKind::Raise(r) => r.exception.into_iter().collect(),
            NodeKind::Literal(_) => vec![],
            NodeKind::Expr(e) => e.operands.clone(),
            NodeKind::Opaque(_) => vec![],
        }
    }

    /// Depth-first pre-order walk over every node reachable from `root`.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let mut kids = self.children(id);
            kids.reverse();
            stack.extend(kids);
        }
        order
    }

    /// Verifies the span-containment and source-order invariants (spec §8
    /// testable property 2). Returns the first violation found, if any.
    pub fn check_invariants(&self) -> Option<String> {
        for id in self.walk() {
            let node = self.get(id);
            for child_id in self.children(id) {
                let child = self.get(child_id);
                if !node.span.contains(&child.span) {
                    return Some(format!(
                        "node {:?} ({}) span {:?} does not contain child {:?} ({}) span {:?}",
                        id,
                        node.kind.tag(),
                        node.span,
                        child_id,
                        child.kind.tag(),
                        child.span
                    ));
                }
            }
        }
        None
    }

    pub fn name_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| matches!(self.get(*id).kind, NodeKind::Name(_)))
            .collect()
    }

    pub fn function_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| matches!(self.get(*id).kind, NodeKind::Function(_)))
            .collect()
    }

    pub fn class_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| matches!(self.get(*id).kind, NodeKind::Class(_)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::span::Span;

    fn leaf(id: u32, span: Span) -> Node {
        Node {
            id: NodeId(id),
            kind: NodeKind::Literal(LiteralData {
                value: LiteralValue::Null,
            }),
            span,
            source_unit_id: SourceUnitId(0),
            parent: Some(NodeId(0)),
        }
    }

    #[test]
    fn invariants_catch_span_escape() {
        let module_span = Span::new(0, 10, 1, 0, 1, 10);
        let bad_child_span = Span::new(5, 20, 1, 5, 1, 20); // escapes end_byte=10
        let program = Program {
            source_unit_id: SourceUnitId(0),
            root: NodeId(0),
            nodes: vec![
                Node {
                    id: NodeId(0),
                    kind: NodeKind::Module {
                        top_level: vec![NodeId(1)],
                    },
                    span: module_span,
                    source_unit_id: SourceUnitId(0),
                    parent: None,
                },
                leaf(1, bad_child_span),
            ],
        };
        assert!(program.check_invariants().is_some());
    }

    #[test]
    fn walk_is_preorder() {
        let program = Program {
            source_unit_id: SourceUnitId(0),
            root: NodeId(0),
            nodes: vec![
                Node {
                    id: NodeId(0),
                    kind: NodeKind::Module {
                        top_level: vec![NodeId(1), NodeId(2)],
                    },
                    span: Span::new(0, 10, 1, 0, 1, 10),
                    source_unit_id: SourceUnitId(0),
                    parent: None,
                },
                leaf(1, Span::new(0, 4, 1, 0, 1, 4)),
                leaf(2, Span::new(4, 8, 1, 4, 1, 8)),
            ],
        };
        assert_eq!(program.walk(), vec![NodeId(0), NodeId(1), NodeId(2)]);
    }
}
