//! Lowers a `tree-sitter-python` native tree into PIR.

use super::IrBuilder;
use crate::features::parsing::NativeTree;
use crate::shared::models::pir::*;
use crate::shared::models::{SourceUnitId, Span};
use tree_sitter::Node as TsNode;

pub fn lower(native: &NativeTree, source_unit_id: SourceUnitId) -> Program {
    let mut b = IrBuilder::new(source_unit_id);
    let src = native.source.as_str();
    let root_ts = native.root();

    let mut top_level = Vec::new();
    let mut cursor = root_ts.walk();
    for child in root_ts.children(&mut cursor) {
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

/// Lowers one statement-position node. Returns `None` for syntax the PIR
/// has no statement representation for (comments, blank markers).
fn lower_stmt(b: &mut IrBuilder, node: &TsNode, src: &str) -> Option<NodeId> {
    let span = b.span_of(node);
    match node.kind() {
        "function_definition" => Some(lower_function(b, node, src, None)),
        "class_definition" => Some(lower_class(b, node, src)),
        "expression_statement" => {
            let inner = node.named_child(0)?;
            if inner.kind() == "assignment" {
                Some(lower_assignment(b, &inner, src))
            } else {
                Some(lower_expr(b, &inner, src))
            }
        }
        "import_statement" | "import_from_statement" => Some(lower_import(b, node, src)),
        "if_statement" => Some(lower_if(b, node, src)),
        "for_statement" => Some(lower_for(b, node, src)),
        "while_statement" => Some(lower_while(b, node, src)),
        "return_statement" => Some(lower_return(b, node, src)),
        "try_statement" => Some(lower_try(b, node, src)),
        "raise_statement" => Some(lower_raise(b, node, src)),
        "pass_statement" | "comment" | "break_statement" | "continue_statement" => None,
        "decorated_definition" => {
            let def = node.named_child(node.named_child_count() - 1)?;
            let decorators: Vec<String> = (0..node.named_child_count().saturating_sub(1))
                .filter_map(|i| node.named_child(i))
                .map(|d| text(&d, src).to_string())
                .collect();
            match def.kind() {
                "function_definition" => Some(lower_function(b, &def, src, Some(decorators))),
                "class_definition" => Some(lower_class(b, &def, src)),
                _ => Some(b.push_opaque(text(node, src).to_string(), "unsupported decorated construct", span, None)),
            }
        }
        "exec_statement" | "global_statement" | "nonlocal_statement" | "delete_statement" | "assert_statement" | "with_statement" => {
            Some(b.push_opaque(text(node, src).to_string(), "statement not lowered into a typed PIR kind", span, None))
        }
        _ => {
            // Metaclass tricks, eval-like calls, or anything else the
            // grammar emits that this normalizer has no typed shape for.
            Some(b.push_opaque(text(node, src).to_string(), "unrecognized python construct", span, None))
        }
    }
}

fn is_async(node: &TsNode) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == "async")
}

fn lower_function(b: &mut IrBuilder, node: &TsNode, src: &str, decorators: Option<Vec<String>>) -> NodeId {
    let span = b.span_of(node);
    let name = node
        .child_by_field_name("name")
        .map(|n| text(&n, src).to_string())
        .unwrap_or_default();

    let mut params = Vec::new();
    if let Some(params_node) = node.child_by_field_name("parameters") {
        let mut cursor = params_node.walk();
        for p in params_node.named_children(&mut cursor) {
            params.push(lower_parameter(&p, src));
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

    b.push_parent(
        NodeKind::Function(FunctionData {
            name,
            params,
            return_type_hint,
            is_async: is_async(node),
            is_method: false, // patched by the symbol table pass when nested in a class
            owning_class: None,
            body: body.clone(),
            decorators: decorators.unwrap_or_default(),
        }),
        span,
        None,
        &body,
    )
}

fn lower_parameter(node: &TsNode, src: &str) -> Parameter {
    match node.kind() {
        "identifier" => Parameter {
            name: text(node, src).to_string(),
            type_hint: None,
            default: None,
            kind: ParamKind::Positional,
        },
        "typed_parameter" => {
            let name = node
                .named_child(0)
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default();
            let type_hint = node
                .child_by_field_name("type")
                .map(|n| text(&n, src).to_string());
            Parameter {
                name,
                type_hint,
                default: None,
                kind: ParamKind::Positional,
            }
        }
        "default_parameter" | "typed_default_parameter" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default();
            let type_hint = node
                .child_by_field_name("type")
                .map(|n| text(&n, src).to_string());
            Parameter {
                name,
                type_hint,
                default: None, // default expr id wired in by a later pass if needed
                kind: ParamKind::Positional,
            }
        }
        "list_splat_pattern" => Parameter {
            name: node
                .named_child(0)
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default(),
            type_hint: None,
            default: None,
            kind: ParamKind::VarArgs,
        },
        "dictionary_splat_pattern" => Parameter {
            name: node
                .named_child(0)
                .map(|n| text(&n, src).to_string())
                .unwrap_or_default(),
            type_hint: None,
            default: None,
            kind: ParamKind::KwArgs,
        },
        _ => Parameter {
            name: text(node, src).to_string(),
            type_hint: None,
            default: None,
            kind: ParamKind::Positional,
        },
    }
}

fn lower_class(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let name = node
        .child_by_field_name("name")
        .map(|n| text(&n, src).to_string())
        .unwrap_or_default();

    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for arg in superclasses.named_children(&mut cursor) {
            bases.push(text(&arg, src).to_string());
        }
    }

    let mut members = Vec::new();
    if let Some(body_node) = node.child_by_field_name("body") {
        let mut cursor = body_node.walk();
        for stmt in body_node.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                members.push(id);
            }
        }
    }

    let class_id = b.push_parent(
        NodeKind::Class(ClassData {
            name,
            bases,
            members: members.clone(),
        }),
        span,
        None,
        &members,
    );

    // Mark direct method members as methods owned by this class.
    for &member in &members {
        if let NodeKind::Function(f) = &mut b_get_mut(b, member).kind {
            f.is_method = true;
            f.owning_class = Some(class_id);
        }
    }

    class_id
}

// `IrBuilder` keeps its node arena private; lowering needs mutable access
// to patch method ownership after the fact, so this reaches through a
// crate-visible accessor rather than widening the public API.
fn b_get_mut<'a>(b: &'a mut IrBuilder, id: NodeId) -> &'a mut Node {
    b.node_mut(id)
}

fn lower_assignment(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let left = node.child_by_field_name("left");
    let right = node.child_by_field_name("right");

    let mut targets = Vec::new();
    if let Some(left) = left {
        targets.push(lower_expr(b, &left, src));
    }
    let value = right
        .map(|r| lower_expr(b, &r, src))
        .unwrap_or_else(|| b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Null }), span, None));

    let mut children = targets.clone();
    children.push(value);
    b.push_parent(
        NodeKind::Assignment(AssignmentData { targets, value }),
        span,
        None,
        &children,
    )
}

fn lower_import(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let is_relative = node.kind() == "import_from_statement"
        && node
            .child_by_field_name("module_name")
            .map(|n| text(&n, src).starts_with('.'))
            .unwrap_or(false);

    let module_path = node
        .child_by_field_name("module_name")
        .map(|n| text(&n, src).to_string())
        .unwrap_or_default();

    let mut imported_names = Vec::new();
    let mut aliases = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "dotted_name" if child != node.child_by_field_name("module_name").unwrap_or(child) => {
                imported_names.push(text(&child, src).to_string());
                aliases.push(None);
            }
            "aliased_import" => {
                let name = child
                    .child_by_field_name("name")
                    .map(|n| text(&n, src).to_string())
                    .unwrap_or_default();
                let alias = child
                    .child_by_field_name("alias")
                    .map(|n| text(&n, src).to_string());
                imported_names.push(name);
                aliases.push(alias);
            }
            "wildcard_import" => {
                imported_names.push("*".to_string());
                aliases.push(None);
            }
            _ => {}
        }
    }

    if node.kind() == "import_statement" {
        // Plain `import a.b.c` puts the module path(s) as named children.
        imported_names.clear();
        aliases.clear();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    imported_names.push(text(&child, src).to_string());
                    aliases.push(None);
                }
                "aliased_import" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| text(&n, src).to_string())
                        .unwrap_or_default();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| text(&n, src).to_string());
                    imported_names.push(name);
                    aliases.push(alias);
                }
                _ => {}
            }
        }
    }

    b.push_node(
        NodeKind::Import(ImportData {
            module_path,
            imported_names,
            aliases,
            is_relative,
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

    let mut then_body = Vec::new();
    if let Some(consequence) = node.child_by_field_name("consequence") {
        let mut cursor = consequence.walk();
        for stmt in consequence.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                then_body.push(id);
            }
        }
    }

    let mut else_body = Vec::new();
    let mut cursor = node.walk();
    for alt in node.children_by_field_name("alternative", &mut cursor) {
        match alt.kind() {
            "elif_clause" => {
                // Represent elif as a nested If inside the else branch.
                let nested = lower_if_from_elif(b, &alt, src);
                else_body.push(nested);
            }
            "else_clause" => {
                if let Some(body) = alt.child_by_field_name("body") {
                    let mut bc = body.walk();
                    for stmt in body.named_children(&mut bc) {
                        if let Some(id) = lower_stmt(b, &stmt, src) {
                            else_body.push(id);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let mut children = vec![condition];
    children.extend(then_body.iter().copied());
    children.extend(else_body.iter().copied());
    b.push_parent(
        NodeKind::If(IfData {
            condition,
            then_body,
            else_body,
        }),
        span,
        None,
        &children,
    )
}

fn lower_if_from_elif(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let condition = node
        .child_by_field_name("condition")
        .map(|c| lower_expr(b, &c, src))
        .unwrap_or_else(|| b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(true) }), span, None));

    let mut then_body = Vec::new();
    if let Some(consequence) = node.child_by_field_name("consequence") {
        let mut cursor = consequence.walk();
        for stmt in consequence.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                then_body.push(id);
            }
        }
    }

    let mut else_body = Vec::new();
    let mut cursor = node.walk();
    for alt in node.children_by_field_name("alternative", &mut cursor) {
        match alt.kind() {
            "elif_clause" => else_body.push(lower_if_from_elif(b, &alt, src)),
            "else_clause" => {
                if let Some(body) = alt.child_by_field_name("body") {
                    let mut bc = body.walk();
                    for stmt in body.named_children(&mut bc) {
                        if let Some(id) = lower_stmt(b, &stmt, src) {
                            else_body.push(id);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let mut children = vec![condition];
    children.extend(then_body.iter().copied());
    children.extend(else_body.iter().copied());
    b.push_parent(
        NodeKind::If(IfData { condition, then_body, else_body }),
        span,
        None,
        &children,
    )
}

fn lower_for(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let iterable = node.child_by_field_name("right").map(|n| lower_expr(b, &n, src));
    let mut body = Vec::new();
    if let Some(body_node) = node.child_by_field_name("body") {
        let mut cursor = body_node.walk();
        for stmt in body_node.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                body.push(id);
            }
        }
    }
    let mut children: Vec<NodeId> = iterable.into_iter().collect();
    children.extend(body.iter().copied());
    b.push_parent(
        NodeKind::Loop(LoopData {
            kind: LoopKind::For,
            condition: None,
            iterable,
            body,
        }),
        span,
        None,
        &children,
    )
}

fn lower_while(b: &mut IrBuilder, node: &TsNode, src: &str) -> NodeId {
    let span = b.span_of(node);
    let condition = node.child_by_field_name("condition").map(|n| lower_expr(b, &n, src));
    let mut body = Vec::new();
    if let Some(body_node) = node.child_by_field_name("body") {
        let mut cursor = body_node.walk();
        for stmt in body_node.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                body.push(id);
            }
        }
    }
    let mut children: Vec<NodeId> = condition.into_iter().collect();
    children.extend(body.iter().copied());
    b.push_parent(
        NodeKind::Loop(LoopData {
            kind: LoopKind::While,
            condition,
            iterable: None,
            body,
        }),
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
    let mut body = Vec::new();
    if let Some(body_node) = node.child_by_field_name("body") {
        let mut cursor = body_node.walk();
        for stmt in body_node.named_children(&mut cursor) {
            if let Some(id) = lower_stmt(b, &stmt, src) {
                body.push(id);
            }
        }
    }

    let mut handlers = Vec::new();
    let mut finally_body = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "except_clause" => {
                let exception_type = child
                    .named_child(0)
                    .filter(|n| n.kind() != "block")
                    .map(|n| text(&n, src).to_string());
                let binding_name = None; // `except E as e` binding wired by symbol pass
                let mut handler_body = Vec::new();
                if let Some(block) = child.child_by_field_name("value").or_else(|| {
                    let mut c2 = child.walk();
                    child.named_children(&mut c2).find(|n| n.kind() == "block")
                }) {
                    let mut bc = block.walk();
                    for stmt in block.named_children(&mut bc) {
                        if let Some(id) = lower_stmt(b, &stmt, src) {
                            handler_body.push(id);
                        }
                    }
                }
                handlers.push(ExceptHandler {
                    exception_type,
                    binding_name,
                    body: handler_body,
                });
            }
            "finally_clause" => {
                if let Some(block) = child.named_child(0) {
                    let mut bc = block.walk();
                    for stmt in block.named_children(&mut bc) {
                        if let Some(id) = lower_stmt(b, &stmt, src) {
                            finally_body.push(id);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let mut children = body.clone();
    for h in &handlers {
        children.extend(h.body.iter().copied());
    }
    children.extend(finally_body.iter().copied());

    b.push_parent(
        NodeKind::Try(TryData {
            body,
            handlers,
            finally_body,
        }),
        span,
        None,
        &children,
    )
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
            NodeKind::Name(NameData {
                identifier: text(node, src).to_string(),
                binding: None,
                inferred_type: None,
            }),
            span,
            None,
        ),
        "string" | "concatenated_string" => b.push_node(
            NodeKind::Literal(LiteralData { value: LiteralValue::Str(text(node, src).to_string()) }),
            span,
            None,
        ),
        "integer" | "float" => b.push_node(
            NodeKind::Literal(LiteralData { value: LiteralValue::Number(text(node, src).to_string()) }),
            span,
            None,
        ),
        "true" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(true) }), span, None),
        "false" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Bool(false) }), span, None),
        "none" => b.push_node(NodeKind::Literal(LiteralData { value: LiteralValue::Null }), span, None),
        "call" => {
            let callee_ts = node.child_by_field_name("function");
            let callee = callee_ts
                .map(|c| lower_expr(b, &c, src))
                .unwrap_or_else(|| b.push_opaque(String::new(), "call missing callee", span, None));

            let mut positional_args = Vec::new();
            let mut keyword_args = Vec::new();
            if let Some(args) = node.child_by_field_name("arguments") {
                let mut cursor = args.walk();
                for arg in args.named_children(&mut cursor) {
                    if arg.kind() == "keyword_argument" {
                        let name = arg
                            .child_by_field_name("name")
                            .map(|n| text(&n, src).to_string())
                            .unwrap_or_default();
                        if let Some(value) = arg.child_by_field_name("value") {
                            let value_id = lower_expr(b, &value, src);
                            keyword_args.push((name, value_id));
                        }
                    } else {
                        positional_args.push(lower_expr(b, &arg, src));
                    }
                }
            }

            let mut children = vec![callee];
            children.extend(positional_args.iter().copied());
            children.extend(keyword_args.iter().map(|(_, v)| *v));
            b.push_parent(
                NodeKind::Call(CallData { callee, positional_args, keyword_args }),
                span,
                None,
                &children,
            )
        }
        "attribute" => {
            let object = node.child_by_field_name("object").map(|o| lower_expr(b, &o, src));
            let attr = node
                .child_by_field_name("attribute")
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
        "subscript" => {
            let value = node.child_by_field_name("value").map(|v| lower_expr(b, &v, src));
            let mut operands: Vec<NodeId> = value.into_iter().collect();
            let mut cursor = node.walk();
            for sub in node.children_by_field_name("subscript", &mut cursor) {
                operands.push(lower_expr(b, &sub, src));
            }
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::Subscript, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "binary_operator" | "boolean_operator" | "comparison_operator" => {
            let left = node.child_by_field_name("left").map(|n| lower_expr(b, &n, src));
            let right = node.child_by_field_name("right").map(|n| lower_expr(b, &n, src));
            let operator = node
                .child_by_field_name("operator")
                .map(|n| text(&n, src).to_string())
                .unwrap_or_else(|| "?".to_string());
            let operands: Vec<NodeId> = left.into_iter().chain(right).collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::BinaryOp { operator }, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "unary_operator" | "not_operator" => {
            let argument = node.named_child(0).map(|n| lower_expr(b, &n, src));
            let operator = node
                .child(0)
                .map(|n| text(&n, src).to_string())
                .unwrap_or_else(|| "not".to_string());
            let operands: Vec<NodeId> = argument.into_iter().collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::UnaryOp { operator }, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "list" | "list_comprehension" => lower_collection(b, node, src, ExprTag::ListLiteral),
        "dictionary" | "dictionary_comprehension" => lower_collection(b, node, src, ExprTag::DictLiteral),
        "tuple" => lower_collection(b, node, src, ExprTag::Tuple),
        "lambda" => {
            let body = node.child_by_field_name("body").map(|n| lower_expr(b, &n, src));
            let operands: Vec<NodeId> = body.into_iter().collect();
            b.push_parent(
                NodeKind::Expr(ExprData { tag: ExprTag::Lambda, operands: operands.clone(), text: text(node, src).to_string() }),
                span,
                None,
                &operands,
            )
        }
        "await" => {
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
        "eval" | "call_eval" => b.push_opaque(text(node, src).to_string(), "eval call treated as opaque barrier", span, None),
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
    use crate::features::parsing::{FrontEnd, ParseOptions};
    use crate::shared::models::NodeKind as NK;

    fn lower_src(src: &str) -> Program {
        let fe = crate::features::parsing::python::PythonFrontEnd;
        let native = fe.parse(src, ParseOptions::default()).unwrap();
        lower(&native, SourceUnitId(0))
    }

    #[test]
    fn lowers_function_with_params_and_return() {
        let program = lower_src("def add(a, b):\n    return a + b\n");
        let funcs = program.function_nodes();
        assert_eq!(funcs.len(), 1);
        if let NK::Function(f) = &program.get(funcs[0]).kind {
            assert_eq!(f.name, "add");
            assert_eq!(f.params.len(), 2);
        } else {
            panic!("expected function node");
        }
    }

    #[test]
    fn lowers_class_with_method() {
        let program = lower_src("class Foo:\n    def bar(self):\n        return 1\n");
        let classes = program.class_nodes();
        assert_eq!(classes.len(), 1);
        let funcs = program.function_nodes();
        assert_eq!(funcs.len(), 1);
        if let NK::Function(f) = &program.get(funcs[0]).kind {
            assert!(f.is_method);
            assert!(f.owning_class.is_some());
        }
    }

    #[test]
    fn invariants_hold_for_nontrivial_program() {
        let program = lower_src(
            "import os\ndef f(x):\n    if x > 0:\n        return x\n    else:\n        return -x\n",
        );
        assert!(program.check_invariants().is_none());
    }
}
