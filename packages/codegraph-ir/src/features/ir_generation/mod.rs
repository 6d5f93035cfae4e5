//! IR Normalizer (spec §4.3, component C3).
//!
//! Lowers each language's native tree-sitter tree into the uniform Program
//! IR (`shared::models::pir`). Each per-language lowering function is a
//! recursive descent over the native tree, not a visitor class (spec §9:
//! "Deep inheritance hierarchies over AST visitors... structured as
//! recursive descent... into PIR, not as visitor classes").

pub mod java;
pub mod javascript;
pub mod python;

use crate::features::parsing::NativeTree;
use crate::shared::models::{Language, Node, NodeId, NodeKind, Program, SourceUnitId, Span};
use crate::shared::utils::tree_sitter::node_to_span;

/// Arena builder shared by every per-language lowering pass. Owns the node
/// vector; lowering functions push children before parents so the parent's
/// span (computed last, from the native node) safely contains them.
pub struct IrBuilder {
    source_unit_id: SourceUnitId,
    nodes: Vec<Node>,
}

impl IrBuilder {
    pub fn new(source_unit_id: SourceUnitId) -> Self {
        Self {
            source_unit_id,
            nodes: Vec::new(),
        }
    }

    /// Reserve a slot; returns the id that will hold this node once
    /// `finish_node` is called. Lets a parent with self-referential
    /// children (none in this PIR, kept for symmetry with push) do a single
    /// pass. In practice all lowering here pushes children first.
    pub fn push_node(&mut self, kind: NodeKind, span: Span, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            span,
            source_unit_id: self.source_unit_id,
            parent,
        });
        id
    }

    /// Macros, eval, metaclasses, and other unsupported constructs become
    /// an `Opaque` barrier carrying the raw text (spec §4.3).
    pub fn push_opaque(
        &mut self,
        raw_text: String,
        diagnostic: &str,
        span: Span,
        parent: Option<NodeId>,
    ) -> NodeId {
        self.push_node(
            NodeKind::Opaque(crate::shared::models::pir::OpaqueData {
                raw_text,
                diagnostic: diagnostic.to_string(),
            }),
            span,
            parent,
        )
    }

    pub fn span_of(&self, node: &tree_sitter::Node) -> Span {
        node_to_span(node)
    }

    fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.nodes[id.0 as usize].parent = Some(parent);
    }

    /// Crate-visible escape hatch for the rare post-hoc patch (e.g. marking
    /// a class's direct function members as methods once the class node
    /// exists). Lowering passes should prefer building data correctly the
    /// first time; this exists because method-ness depends on the parent
    /// class, which isn't known until after the body is already lowered.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Pushes `kind` as a node, then back-patches every id in `children` to
    /// point its `parent` field at the new node. Children are always
    /// lowered (and therefore pushed) before their parent, since a parent's
    /// span is only known once its native counterpart is fully walked.
    pub fn push_parent(
        &mut self,
        kind: NodeKind,
        span: Span,
        parent: Option<NodeId>,
        children: &[NodeId],
    ) -> NodeId {
        let id = self.push_node(kind, span, parent);
        for &child in children {
            self.set_parent(child, id);
        }
        id
    }

    pub fn finish(self, root: NodeId) -> Program {
        Program {
            source_unit_id: self.source_unit_id,
            nodes: self.nodes,
            root,
        }
    }
}

/// Dispatches to the per-language lowering pass (spec §9: one configurable
/// normalize step, not per-tool entry points).
pub fn normalize(native: &NativeTree, source_unit_id: SourceUnitId) -> Program {
    match native.language {
        Language::Python => python::lower(native, source_unit_id),
        Language::JavaScript | Language::TypeScript => javascript::lower(native, source_unit_id),
        Language::Java => java::lower(native, source_unit_id),
    }
}
