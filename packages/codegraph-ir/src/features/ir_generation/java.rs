//! Lowers a `tree-sitter-java` native tree into PIR.

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
        "class_declaration" | "interface_declaration" => Some(lower_class(b, node, src)),
        "method_declaration" | "constructor_declaration" => Some(lower_method(b, node, src)),
        "local_variable_declaration" | "field_declaration" => Some(lower_var_declaration(b, node, src)),
        "expression_statement" => {
            let inner = node.named_child(0)?;
            Some(lower_expr(b, &inner, src))
        }
        "import_declaration" => Some(lower_import(b, node, src)),
        "if_statement" => Some(lower_if(b, node, src)),
        "for_statement" | "enhanced_for_statement" => Some(lower_for(b, node, src)),
        "while_statement" | "do_statement" => Some(lower_while(b, node, src)),
        "return_statement" => Some(lower_return(b, node, src)),
        "try_statement" => Some(lower_try(b, node, src)),
        "throw_statement" => Some(lower_raise(b, node, src)),
        "line_comment" | "block_comment" | "package_declaration" => None,
        _ => Some(b.push_opaque(text(node, src).to_string(), "unrecognized java construct", span, None)),
    }
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

fn lower_method(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let name = node
        .child_by_field_name("name")
        .map(|n| text(&n, src).to_string())
        .unwrap_or_default();

    let mut params = Vec::new();
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut cursor = params_node.walk();
        for p in params_node.named_children(&mut cursor) {
            if p.kind() != "formal_parameter" {
                continue;
            }
            let pname = p
                .child_by_field_name("name")
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default();
            let type_hint = p
                .child_by_field_name("type")
                .map(|n| text(&n, src).to_string());
            params.push(Parameter { name: pname, type_hint, default: None, kind: ParamKind::Positional });
        }
    }

    let return_type_hint = node
        .child_by_field_name("type")
        .map(|n| text(&n, src).to_string());

    let body = block_children(b, node.child_by_field_name("body"), src);

    b.push_parent(
        NodeKind::Function(FunctionData {
            name,
            params,
            return_type_hint,
            is_async: false,
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
    if let Some(superclass) = node.child_by_field_name("superclass") {
        bases.push(text(&superclass, src).trim_start_matches("extends").trim().to_string());
    }
    if let Some(interfaces) = node.child_by_field_name("interfaces") {
        bases.push(text(&interfaces, src).trim_start_matches("implements").trim().to_string());
    }

    let mut members = Vec::new();
    if let Some(body_node) = node.child_by_field_name("body") {
        let mut cursor = body_node.walk();
        for member in body_node.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &member, src) {
                members.push(id);
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
    let raw = text(node, src)
        .trim_start_matches("import")
        .trim_end_matches(';')
        .trim()
        .to_string();
    let path = raw.trim_start_matches("static").trim().to_string();
    let wildcard = path.ends_with(".*");
    b.push_node(
        NodeKind::Import(ImportData {
            module_path: path.trim_end_matches(".*").to_string(),
            imported_names: if wildcard { vec!["*".to_string()] } else { vec![] },
            aliases: if wildcard { vec![None] } else { vec![] },
            is_relative: false,
            resolved_symbol: None,
        }),
        span,
        None,
    )
}

fn lower_if(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let condition = node
        .child_by_field_name("condition")
        .map(|c| lower_expr(b, &c, src))
        .unwrap_or_else(|| b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(true) }), span, None));
    let then_body = block_children(b, node.child_by_field_name("consequence"), src);
    let else_body = match node.child_by_field_name("alternative") {
        Some(alt) if alt.kind() == "if_statement" => vec![lower_if(b, &alt, src)],
        Some(alt) => block_children(b, Some(alt), src),
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
        .child_by_field_name("value")
        .or_else(|| node.child_by_field_name("condition"))
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
    let mut finally_body = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "catch_clause" => {
                let exception_type = child
                    .child_by_field_name("parameter")
                    .and_then(|p| p.child_by_field_name("type"))
                    .map(|n| text(&n, src).to_string());
                let binding_name = child
                    .child_by_field_name("parameter")
                    .and_then(|p| p.child_by_field_name("name"))
                    .map(|n| text(&n, src).to_string());
                let handler_body = block_children(b, child.child_by_field_name("body"), src);
                handlers.push(ExceptHandler { exception_type, binding_name, body: handler_body });
            }
            "finally_clause" => {
                finally_body = block_children(b, child.child_by_field_name("body"), src);
            }
            _ => {}
        }
    }

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
        "identifier" => b.push_node(
            NodeKind::Name(NameData { identifier: text(node, src).to_string(), binding: None, inferred_type: None }),
            span,
            None,
        ),
        "string_literal" => b.push_node(
            NodeKind::Literal(LiteralData { value: LiteralValue::Str(text(node, src).to_string()) }),
            span,
            None,
        ),
        "decimal_integer_literal" | "decimal_floating_point_literal" => b.push_node(
            NodeKind::Literal(LiteralData { value: LiteralValue::Number(text(node, src).to_string()) }),
            span,
            None,
        ),
        "true" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(true) }), span, None),
        "false" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(false) }), span, None),
        "null_literal" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Null }), span, None),
        "method_invocation" => {
            let callee = node
                .child_by_field_name("name")
                .map(|n| lower_expr(b, &n, src))
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
        "field_access" => {
            let object = node.child_by_field_name("object").map(|o| lower_expr(b, &o, src));
            let attr = node
                .child_by_field_name("field")
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
        "array_access" => {
            let array = node.child_by_field_name("array").map(|o| lower_expr(b, &o, src));
            let index = node.child_by_field_name("index").map(|i| lower_expr(b, &i, src));
            let operands: Vec<NodeId> = array.into_iter().chain(index).collect();
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
            let argument = node.named_child(0).map(|n| lower_expr(b, &n, src));
            let operands: Vec<NodeId> = argument.into_iter().collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::UnaryOp { operator: "?".to_string() }, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "assignment_expression" => {
            let left = node.child_by_field_name("left").map(|n| lower_expr(b, &n, src));
            let right = node.child_by_field_name("right").map(|n| lower_expr(b, &n, src));
            let targets: Vec<NodeId> = left.into_iter().collect();
            let value = right.unwrap_or_else(|| b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Null }), span, None));
            let mut children = targets.clone();
            children.push(value);
            b.push_parent(NodeKind::Assignment(AssignmentData { targets, value }), span, None, &children)
        }
        "parenthesized_expression" => node
            .named_child(0)
            .map(|inner| lower_expr(b, &inner, src))
            .unwrap_or_else(|| b.push_opaque(text(node, src).to_string(), "empty parenthesized expression", span, None)),
        _ => b.push_node(
            NodeKind::Expr(ExprData { tag: ExprTag::Other, operands: vec![], text: text(node, src).to_string() }),
            span,
            None,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::java::JavaFrontEnd;
    use crate::features::parsing::{FrontEnd, ParseOptions};

    #[test]
    fn lowers_class_with_method() {
        let fe = JavaFrontEnd;
        let native = fe
            .parse(
                "public class Main { public int add(int a, int b) { return a + b; } }",
                ParseOptions::default(),
            )
            .unwrap();
        let program = lower(&native, SourceUnitId(0));
        assert_eq!(program.class_nodes().len(), 1);
        assert_eq!(program.function_nodes().len(), 1);
        assert!(program.check_invariants().is_none());
    }
}
