//! Lowers a `tree-sitter-javascript`/`tree-sitter-typescript` native tree
//! into PIR. Covers the constructs spec §4.3 enumerates explicitly;
//! anything this incremental grammar emits that isn't one of those becomes
//! an `Expr::Other` or `Opaque` node rather than a best-effort guess.

use super::IrBuilder;
use crate::features::parsing::NativeTree;
use crate::shared::models::pir::*;
use crate::shared::models::SourceUnitId;
use tree_sitter::Node as TsNode;

pub fn lower(native: &NativeTree, source_unit_id: SourceUnitId) -> Program {
    let mut b = IrBuilder::new(source_unit_id);
    let src = native.source.as_str();
    let root_ts = native.root();

    let mut top_level = Vec::new();
    let mut cursor = root_ts.walk();
    for child in root_ts.named_children(&mut cursor) {
        if let Some(id) = lower_stmt(&mut b, &child, src) {
            top_level.push(id);
        }
    }

    let span = b.span_of(&root_ts);
    let root_id = b.push_parent(NodeKind::Module { top_level: top_level.clone() }, span, None, &top_level);
    b.finish(root_id)
}

fn text<'a>(node: &TsNode, src: &'a str) -> &'a str {
    &src[node.start_byte()..node.end_byte()]
}

fn lower_stmt(b: &mut IrBuilder, node: &TsNode, src: &str) -> Option<NodeId> {
    let span = b.span_of(node);
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => Some(lower_function(b, node, src)),
        "class_declaration" | "abstract_class_declaration" => Some(lower_class(b, node, src)),
        "lexical_declaration" | "variable_declaration" => Some(lower_var_declaration(b, node, src)),
        "expression_statement" => {
            let inner = node.named_child(0)?;
            Some(lower_expr(b, &inner, src))
        }
        "import_statement" => Some(lower_import(b, node, src)),
        "if_statement" => Some(lower_if(b, node, src)),
        "for_statement" | "for_in_statement" | "for_of_statement" => Some(lower_for(b, node, src)),
        "while_statement" | "do_statement" => Some(lower_while(b, node, src)),
        "return_statement" => Some(lower_return(b, node, src)),
        "try_statement" => Some(lower_try(b, node, src)),
        "throw_statement" => Some(lower_raise(b, node, src)),
        "comment" | "empty_statement" => None,
        "export_statement" => {
            let inner = node.named_child(0)?;
            lower_stmt(b, &inner, src)
        }
        _ => Some(b.push_opaque(text(node, src).to_string(), "unrecognized js/ts construct", span, None)),
    }
}

fn lower_function(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let name = node
        .child_by_field_name("name")
        .map(|n| text(&n, src).to_string())
        .unwrap_or_default();

    let mut params = Vec::new();
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut cursor = params_node.walk();
        for p in params_node.named_children(&mut cursor) {
            let pname = p
                .child_by_field_name("pattern")
                .or(Some(p))
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default();
            let type_hint = p
                .child_by_field_name("type")
                .map(|n| text(&n, src).to_string());
            params.push(Parameter {
                name: pname,
                type_hint,
                default: None,
                kind: ParamKind::Positional,
            });
        }
    }

    let return_type_hint = node
        .child_by_field_name("return_type")
        .map(|n| text(&n, src).to_string());

    let mut body = Vec::new();
    if let Some(body_node) = node.child_by_field_name("body") {
        let mut cursor = body_node.walk();
        for stmt in body_node.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                body.push(id);
            }
        }
    }

    let is_async = node
        .child(0)
        .map(|c| text(&c, src) == "async")
        .unwrap_or(false);

    b.push_parent(
        NodeKind::Function(FunctionData {
            name,
            params,
            return_type_hint,
            is_async,
            is_method: false,
            owning_class: None,
            body: body.clone(),
            decorators: Vec::new(),
        }),
        span,
        None,
        &body,
    )
}

fn lower_class(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let name = node
        .child_by_field_name("name")
        .map(|n| text(&n, src).to_string())
        .unwrap_or_default();

    let mut bases = Vec::new();
    if let Some(heritage) = node.child_by_field_name("heritage") {
        bases.push(text(&heritage, src).trim_start_matches("extends").trim().to_string());
    }

    let mut members = Vec::new();
    if let Some(body_node) = node.child_by_field_name("body") {
        let mut cursor = body_node.walk();
        for member in body_node.named_children(&mut cursor) {
            match member.kind() {
                "method_definition" => members.push(lower_function(b, &member, src)),
                _ => {
                    let span = b.span_of(&member);
                    members.push(b.push_opaque(text(&member, src).to_string(), "class field not lowered", span, None));
                }
            }
        }
    }

    let class_id = b.push_parent(
        NodeKind::Class(ClassData { name, bases, members: members.clone() }),
        span,
        None,
        &members,
    );

    for &member in &members {
        if let NodeKind::Function(f) = &mut b.node_mut(member).kind {
            f.is_method = true;
            f.owning_class = Some(class_id);
        }
    }

    class_id
}

fn lower_var_declaration(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let mut targets = Vec::new();
    let mut value = None;
    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        if let Some(name_node) = declarator.child_by_field_name("name") {
            targets.push(lower_expr(b, &name_node, src));
        }
        if let Some(value_node) = declarator.child_by_field_name("value") {
            value = Some(lower_expr(b, &value_node, src));
        }
    }
    let value = value.unwrap_or_else(|| b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Null }), span, None));
    let mut children = targets.clone();
    children.push(value);
    b.push_parent(NodeKind::Assignment(AssignmentData { targets, value }), span, None, &children)
}

fn lower_import(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let module_path = node
        .child_by_field_name("source")
        .map(|n| text(&n, src).trim_matches('"').trim_matches('\'').to_string())
        .unwrap_or_default();

    let mut imported_names = Vec::new();
    let mut aliases = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_clause" => {
                let mut cc = child.walk();
                for spec in child.named_children(&mut cc) {
                    match spec.kind() {
                        "identifier" => {
                            imported_names.push(text(&spec, src).to_string());
                            aliases.push(None);
                        }
                        "named_imports" => {
                            let mut sc = spec.walk();
                            for named in spec.named_children(&mut sc) {
                                if named.kind() == "import_specifier" {
                                    let orig = named
                                        .child_by_field_name("name")
                                        .map(|n| text(&n, src).to_string())
                                        .unwrap_or_default();
                                    let alias = named
                                        .child_by_field_name("alias")
                                        .map(|n| text(&n, src).to_string());
                                    imported_names.push(orig);
                                    aliases.push(alias);
                                }
                            }
                        }
                        "namespace_import" => {
                            imported_names.push("*".to_string());
                            aliases.push(None);
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    b.push_node(
        NodeKind::Import(ImportData {
            module_path: module_path.clone(),
            imported_names,
            aliases,
            is_relative: module_path.starts_with('.'),
            resolved_symbol: None,
        }),
        span,
        None,
    )
}

fn block_children(b: &mut IrBuilder, node: Option<TsNode>, src: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    if let Some(body) = node {
        let mut cursor = body.walk();
        for stmt in body.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                out.push(id);
            }
        }
    }
    out
}

fn lower_if(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let condition = node
        .child_by_field_name("condition")
        .map(|c| lower_expr(b, &c, src))
        .unwrap_or_else(|| b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(true) }), span, None));
    let then_body = block_children(b, node.child_by_field_name("consequence"), src);
    let else_body = match node.child_by_field_name("alternative") {
        Some(alt) if alt.kind() == "else_clause" => block_children(b, alt.named_child(0), src),
        Some(alt) => vec![lower_stmt(b, &alt, src)].into_iter().flatten().collect(),
        None => vec![],
    };
    let mut children = vec![condition];
    children.extend(then_body.iter().copied());
    children.extend(else_body.iter().copied());
    b.push_parent(NodeKind::If(IfData { condition, then_body, else_body }), span, None, &children)
}

fn lower_for(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let iterable = node
        .child_by_field_name("right")
        .or_else(|| node.child_by_field_name("value"))
        .map(|n| lower_expr(b, &n, src));
    let body = block_children(b, node.child_by_field_name("body"), src);
    let mut children: Vec<NodeId> = iterable.into_iter().collect();
    children.extend(body.iter().copied());
    b.push_parent(
        NodeKind::Loop(LoopData { kind: LoopKind::For, condition: None, iterable, body }),
        span,
        None,
        &children,
    )
}

fn lower_while(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let condition = node.child_by_field_name("condition").map(|n| lower_expr(b, &n, src));
    let body = block_children(b, node.child_by_field_name("body"), src);
    let mut children: Vec<NodeId> = condition.into_iter().collect();
    children.extend(body.iter().copied());
    b.push_parent(
        NodeKind::Loop(LoopData { kind: LoopKind::While, condition, iterable: None, body }),
        span,
        None,
        &children,
    )
}

fn lower_return(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let value = node.named_child(0).map(|n| lower_expr(b, &n, src));
    let children: Vec<NodeId> = value.into_iter().collect();
    b.push_parent(NodeKind::Return(ReturnData { value }), span, None, &children)
}

fn lower_try(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let body = block_children(b, node.child_by_field_name("body"), src);

    let mut handlers = Vec::new();
    if let Some(handler) = node.child_by_field_name("handler") {
        let binding_name = handler
            .child_by_field_name("parameter")
            .map(|n| text(&n, src).to_string());
        let handler_body = block_children(b, handler.child_by_field_name("body"), src);
        handlers.push(ExceptHandler { exception_type: None, binding_name, body: handler_body });
    }

    let finally_body = node
        .child_by_field_name("finalizer")
        .map(|f| block_children(b, Some(f), src))
        .unwrap_or_default();

    let mut children = body.clone();
    for h in &handlers {
        children.extend(h.body.iter().copied());
    }
    children.extend(finally_body.iter().copied());

    b.push_parent(NodeKind::Try(TryData { body, handlers, finally_body }), span, None, &children)
}

fn lower_raise(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let exception = node.named_child(0).map(|n| lower_expr(b, &n, src));
    let children: Vec<NodeId> = exception.into_iter().collect();
    b.push_parent(NodeKind::Raise(RaiseData { exception }), span, None, &children)
}

fn lower_expr(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    match node.kind() {
        "identifier" | "property_identifier" | "shorthand_property_identifier" => b.push_node(
            NodeKind::Name(NameData { identifier: text(node, src).to_string(), binding: None, inferred_type: None }),
            span,
            None,
        ),
        "string" | "template_string" => b.push_node(
            NodeKind::Literal(LiteralData { value: LiteralValue::Str(text(node, src).to_string()) }),
            span,
            None,
        ),
        "number" => b.push_node(
            NodeKind::Literal(LiteralData { value: LiteralValue::Number(text(node, src).to_string()) }),
            span,
            None,
        ),
        "true" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(true) }), span, None),
        "false" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(false) }), span, None),
        "null" | "undefined" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Null }), span, None),
        "call_expression" => {
            let callee = node
                .child_by_field_name("function")
                .map(|c| lower_expr(b, &c, src))
                .unwrap_or_else(|| b.push_opaque(String::new(), "call missing callee", span, None));

            let mut positional_args = Vec::new();
            if let Some(args) = node.child_by_field_name("arguments") {
                let mut cursor = args.walk();
                for arg in args.named_children(&mut cursor) {
                    positional_args.push(lower_expr(b, &arg, src));
                }
            }
            let mut children = vec![callee];
            children.extend(positional_args.iter().copied());
            b.push_parent(
                NodeKind::Call(CallData { callee, positional_args, keyword_args: vec![] }),
                span,
                None,
                &children,
            )
        }
        "member_expression" => {
            let object = node.child_by_field_name("object").map(|o| lower_expr(b, &o, src));
            let attr = node
                .child_by_field_name("property")
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default();
            let operands: Vec<NodeId> = object.into_iter().collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::Attribute { attr }, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "subscript_expression" => {
            let object = node.child_by_field_name("object").map(|o| lower_expr(b, &o, src));
            let index = node.child_by_field_name("index").map(|i| lower_expr(b, &i, src));
            let operands: Vec<NodeId> = object.into_iter().chain(index).collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::Subscript, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "binary_expression" => {
            let left = node.child_by_field_name("left").map(|n| lower_expr(b, &n, src));
            let right = node.child_by_field_name("right").map(|n| lower_expr(b, &n, src));
            let operator = node
                .child_by_field_name("operator")
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default();
            let operands: Vec<NodeId> = left.into_iter().chain(right).collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::BinaryOp { operator }, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "unary_expression" => {
            let argument = node.child_by_field_name("argument").map(|n| lower_expr(b, &n, src));
            let operator = node
                .child_by_field_name("operator")
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default();
            let operands: Vec<NodeId> = argument.into_iter().collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::UnaryOp { operator }, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "array" => lower_collection(b, node, src, ExprTag::ListLiteral),
        "object" => lower_collection(b, node, src, ExprTag::DictLiteral),
        "arrow_function" => {
            let body = node.child_by_field_name("body").map(|n| lower_expr(b, &n, src));
            let operands: Vec<NodeId> = body.into_iter().collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::Lambda, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "await_expression" => {
            let inner = node.named_child(0).map(|n| lower_expr(b, &n, src));
            let operands: Vec<NodeId> = inner.into_iter().collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::Await, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "parenthesized_expression" => node
            .named_child(0)
            .map(|inner| lower_expr(b, &inner, src))
            .unwrap_or_else(|| b.push_opaque(text(node, src).to_string(), "empty parenthesized expression", span, None)),
        "assignment_expression" => {
            let left = node.child_by_field_name("left").map(|n| lower_expr(b, &n, src));
            let right = node.child_by_field_name("right").map(|n| lower_expr(b, &n, src));
            let targets: Vec<NodeId> = left.into_iter().collect();
            let value = right.unwrap_or_else(|| b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Null }), span, None));
            let mut children = targets.clone();
            children.push(value);
            b.push_parent(NodeKind::Assignment(AssignmentData { targets, value }), span, None, &children)
        }
        _ => b.push_node(
            NodeKind::Expr(ExprData { tag: ExprTag::Other, operands: vec![], text: text(node, src).to_string() }),
            span,
            None,
        ),
    }
}

fn lower_collection(b: &mut IrBuilder, node: &TsNode, src: &str, tag: ExprTag) -> NodeId {
    let span = b.span_of(node);
    let mut operands = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        operands.push(lower_expr(b, &child, src));
    }
    b.push_parent(
        NodeKind::Expr(ExprData { tag, operands: operands.clone(), text: text(node, src).to_string() }),
        span,
        None,
        &operands,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::javascript::JavaScriptFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};

    #[test]
    fn lowers_js_function_and_call() {
        let fe = JavaScriptFrontEnd::javascript();
        let native = fe
            .parse("function add(a, b) { return a + b; }\nadd(1, 2);", ParseOptions::default())
            .unwrap();
        let program = lower(&native, SourceUnitId(0));
        assert_eq!(program.function_nodes().len(), 1);
        assert!(program.check_invariants().is_none());
    }
}
