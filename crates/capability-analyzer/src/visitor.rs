//! The AST walker (spec §4.1): turns a `tree-sitter-javascript` parse tree into the flat
//! `Node` list a [`capability_core::types::StaticStructure`] carries, stamping `parent_scope`
//! and `nesting_level` as it descends into branches, fork blocks, and loop bodies.

use crate::context::AnalysisContext;
use crate::purity;
use crate::pseudo_tools;
use crate::refexpr::{node_text, resolve_arg_value};
use capability_core::types::{ArgMap, ArgValue, LoopKind, Node as SNode, NodeKind, NodeMeta, ParentScope};
use tree_sitter::Node;

/// Depth-first search for the first `statement_block`, i.e. the body of the async IIFE
/// [`crate::wrapper::wrap_for_parsing`] produces.
pub fn find_body_block<'a>(root: Node<'a>) -> Option<Node<'a>> {
    if root.kind() == "statement_block" {
        return Some(root);
    }
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if let Some(found) = find_body_block(child) {
            return Some(found);
        }
    }
    None
}

pub fn walk_block(block: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let mut cursor = block.walk();
    for stmt in block.named_children(&mut cursor) {
        walk_statement(stmt, source, ctx, nodes);
    }
}

fn walk_statement_or_block(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    if node.kind() == "statement_block" {
        walk_block(node, source, ctx, nodes);
    } else {
        walk_statement(node, source, ctx, nodes);
    }
}

fn walk_statement(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    match node.kind() {
        "expression_statement" => {
            if let Some(expr) = node.named_child(0) {
                handle_expression(expr, source, ctx, nodes);
            }
        }
        "variable_declaration" | "lexical_declaration" => {
            let mut cursor = node.walk();
            for declarator in node.named_children(&mut cursor) {
                if declarator.kind() == "variable_declarator" {
                    handle_declarator(declarator, source, ctx, nodes);
                }
            }
        }
        "if_statement" => handle_if(node, source, ctx, nodes),
        "switch_statement" => handle_switch(node, source, ctx, nodes),
        "for_statement" => handle_for(node, source, ctx, nodes),
        "for_in_statement" => handle_for_in_of(node, source, ctx, nodes),
        "while_statement" => handle_while(node, source, ctx, nodes),
        "do_statement" => handle_do_while(node, source, ctx, nodes),
        "return_statement" => {
            if let Some(arg) = node.named_child(0) {
                handle_expression(arg, source, ctx, nodes);
            }
        }
        "statement_block" => walk_block(node, source, ctx, nodes),
        _ => {}
    }
}

fn handle_expression(
    node: Node,
    source: &str,
    ctx: &mut AnalysisContext,
    nodes: &mut Vec<SNode>,
) -> Option<capability_core::types::NodeId> {
    match node.kind() {
        "call_expression" => handle_call(node, source, ctx, nodes),
        "await_expression" => node.named_child(0).and_then(|inner| handle_expression(inner, source, ctx, nodes)),
        "assignment_expression" => {
            let right = node.child_by_field_name("right")?;
            let id = handle_expression(right, source, ctx, nodes);
            if let (Some(id), Some(left)) = (&id, node.child_by_field_name("left")) {
                if left.kind() == "identifier" {
                    ctx.variable_bindings.insert(node_text(&left, source).to_string(), id.clone());
                }
            }
            id
        }
        "ternary_expression" => handle_ternary(node, source, ctx, nodes),
        "binary_expression" => handle_binary(node, source, ctx, nodes),
        "parenthesized_expression" => node.named_child(0).and_then(|inner| handle_expression(inner, source, ctx, nodes)),
        _ => None,
    }
}

/// Flattens a statically-dotted member expression (`a.b.c`) into its root identifier and the
/// segments after it (`["b", "c"]`). Returns `None` as soon as the chain bottoms out in
/// something other than an `identifier` (a call, a subscript, ...): those chains are not a
/// `mcp.*` / pseudo-tool reference and are handled as method-chain continuations instead.
fn flatten_static_path(node: &Node, source: &str) -> Option<(String, Vec<String>)> {
    let mut segments = Vec::new();
    let mut current = *node;
    loop {
        match current.kind() {
            "member_expression" => {
                let prop = current.child_by_field_name("property")?;
                segments.push(node_text(&prop, source).to_string());
                current = current.child_by_field_name("object")?;
            }
            "identifier" => {
                segments.push(node_text(&current, source).to_string());
                break;
            }
            _ => return None,
        }
    }
    segments.reverse();
    let root = segments.remove(0);
    Some((root, segments))
}

fn extract_object_arguments(call_node: Node, source: &str, ctx: &AnalysisContext) -> Option<ArgMap> {
    let args_node = call_node.child_by_field_name("arguments")?;
    let first = args_node.named_child(0)?;
    if first.kind() != "object" {
        return None;
    }
    let mut map = ArgMap::new();
    let mut cursor = first.walk();
    for pair in first.named_children(&mut cursor) {
        if pair.kind() != "pair" {
            continue;
        }
        let key_node = pair.child_by_field_name("key")?;
        let key = node_text(&key_node, source).trim_matches(['"', '\'']).to_string();
        let value_node = pair.child_by_field_name("value")?;
        map.insert(key, resolve_arg_value(&value_node, source, &ctx.variable_bindings));
    }
    Some(map)
}

fn push_task(
    nodes: &mut Vec<SNode>,
    ctx: &mut AnalysisContext,
    tool: String,
    arguments: Option<ArgMap>,
    code: Option<String>,
) -> capability_core::types::NodeId {
    push_task_chained(nodes, ctx, tool, arguments, code, None)
}

fn push_task_chained(
    nodes: &mut Vec<SNode>,
    ctx: &mut AnalysisContext,
    tool: String,
    arguments: Option<ArgMap>,
    code: Option<String>,
    chained_from: Option<capability_core::types::NodeId>,
) -> capability_core::types::NodeId {
    let id = ctx.next_task_id();
    let pure = code.as_deref().map(purity::is_pure);
    let mut meta = NodeMeta::new(ctx.nesting_level());
    if let Some(op) = ctx.current_parent_operation() {
        meta = meta.with_parent_operation(op);
    }
    if let Some(pure) = pure {
        meta = meta.with_pure(pure);
    }
    if let Some(chained_from) = chained_from {
        meta = meta.with_chained_from(chained_from);
    }
    nodes.push(SNode {
        id: id.clone(),
        kind: NodeKind::Task { tool, arguments, code },
        position: ctx.next_position(),
        parent_scope: ctx.current_scope(),
        meta,
    });
    id
}

/// Recognizes the capability-reference call shape `mcp["$cap:<uuid>"](...)` the Code
/// Transformer's `cap_ref` pass rewrites a resolved `mcp.<ns>.<action>` call into (spec §4.3,
/// §6). Returns the `$cap:<uuid>` tool id unchanged so the Edge Builder's `contains`-edge step
/// (spec §4.4 step 8) can strip the prefix back into a capability id.
fn capability_reference_tool_id(callee: &Node, source: &str) -> Option<String> {
    if callee.kind() != "subscript_expression" {
        return None;
    }
    let object = callee.child_by_field_name("object")?;
    if object.kind() != "identifier" || node_text(&object, source) != "mcp" {
        return None;
    }
    let index = callee.child_by_field_name("index")?;
    let raw = node_text(&index, source);
    let trimmed = raw.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    trimmed.starts_with("$cap:").then(|| trimmed.to_string())
}

fn handle_call(
    node: Node,
    source: &str,
    ctx: &mut AnalysisContext,
    nodes: &mut Vec<SNode>,
) -> Option<capability_core::types::NodeId> {
    let callee = node.child_by_field_name("function")?;
    if callee.kind() == "identifier" {
        return None;
    }
    if let Some(tool) = capability_reference_tool_id(&callee, source) {
        let args = extract_object_arguments(node, source, ctx);
        return Some(push_task(nodes, ctx, tool, args, None));
    }
    if callee.kind() != "member_expression" {
        return None;
    }
    let object = callee.child_by_field_name("object")?;
    let property = callee.child_by_field_name("property")?;
    let method = node_text(&property, source).to_string();

    // Method-chain continuation: `<expr>.filter(...)` where `<expr>` is itself a call.
    if object.kind() == "call_expression" {
        let inner_id = handle_call(object, source, ctx, nodes)?;
        if pseudo_tools::is_array_method(&method) || pseudo_tools::is_string_method(&method) {
            let tool = pseudo_tools::pseudo_tool_id(&method);
            let code = Some(node_text(&node, source).to_string());
            let args = extract_object_arguments(node, source, ctx);
            let id = push_task_chained(nodes, ctx, tool.clone(), args, code, Some(inner_id));
            walk_pseudo_tool_callback(node, source, ctx, nodes, &tool);
            return Some(id);
        }
        return Some(inner_id);
    }

    // `mcp.<ns...>.<action>(...)` and `Promise.all/allSettled(...)` need the whole dotted chain
    // after the root, so they go through the full flatten rather than looking only one level
    // down from the call (spec §4.1 "mcp namespace", "Parallel blocks").
    if let Some((root, segments)) = flatten_static_path(&callee, source) {
        if root == "mcp" && !segments.is_empty() {
            let tool = segments.join(".");
            let args = extract_object_arguments(node, source, ctx);
            return Some(push_task(nodes, ctx, tool, args, None));
        }
        if root == "Promise" && segments.len() == 1 && (segments[0] == "all" || segments[0] == "allSettled") {
            return handle_fork_join(node, source, ctx, nodes);
        }
    }

    // `Math.max(...)`, `Object.keys(...)`, `JSON.parse(...)` (spec §6 static namespaces).
    if object.kind() == "identifier" {
        let obj_name = node_text(&object, source);
        if let Some(tool) = pseudo_tools::static_namespace_method(obj_name, &method) {
            let code = Some(node_text(&node, source).to_string());
            let args = extract_object_arguments(node, source, ctx);
            return Some(push_task(nodes, ctx, tool, args, code));
        }
    }

    // Array/string instance methods on any receiver expression, whether a bare tracked
    // variable (`items.filter(...)`) or a deeper path (`args.items.filter(...)`).
    if pseudo_tools::is_array_method(&method) || pseudo_tools::is_string_method(&method) {
        let tool = pseudo_tools::pseudo_tool_id(&method);
        let code = Some(node_text(&node, source).to_string());
        let args = extract_object_arguments(node, source, ctx);
        let chained_from = if object.kind() == "identifier" {
            ctx.variable_bindings.get(node_text(&object, source)).cloned()
        } else {
            None
        };
        let id = push_task_chained(nodes, ctx, tool.clone(), args, code, chained_from);
        walk_pseudo_tool_callback(node, source, ctx, nodes, &tool);
        return Some(id);
    }

    None
}

/// Walks the callback argument of a pseudo-tool call (`items.filter(x => x > 0)`) one level
/// deeper than its caller (spec §4.1 "tasks inside a callback body of an array operation"):
/// the callback's own task nodes (here, the `x > 0` binary-op) are emitted at
/// `nestingLevel = parent + 1` and `executable = false`, without pushing a new `parent_scope` --
/// a callback body is not a branch/fork/loop containment scope, just a deeper non-executable
/// level (spec §3 `NodeMeta`).
///
/// No-op when the call has no function-valued first argument (e.g. `arr.sort()`).
fn walk_pseudo_tool_callback(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>, tool: &str) {
    let Some(args_node) = node.child_by_field_name("arguments") else { return };
    let Some(first_arg) = args_node.named_child(0) else { return };
    if !matches!(first_arg.kind(), "arrow_function" | "function_expression") {
        return;
    }
    let Some(body) = first_arg.child_by_field_name("body") else { return };

    ctx.push_parent_operation(tool.to_string());
    ctx.enter_callback();
    if body.kind() == "statement_block" {
        walk_block(body, source, ctx, nodes);
    } else {
        handle_expression(body, source, ctx, nodes);
    }
    ctx.exit_callback();
    ctx.pop_parent_operation();
}

fn handle_binary(
    node: Node,
    source: &str,
    ctx: &mut AnalysisContext,
    nodes: &mut Vec<SNode>,
) -> Option<capability_core::types::NodeId> {
    let op_node = node.child_by_field_name("operator")?;
    let op = node_text(&op_node, source);
    let op_name = pseudo_tools::binary_operator_name(op)?;
    let left = node.child_by_field_name("left")?;
    let right = node.child_by_field_name("right")?;
    let mut args = ArgMap::new();
    args.insert("left".to_string(), resolve_arg_value(&left, source, &ctx.variable_bindings));
    args.insert("right".to_string(), resolve_arg_value(&right, source, &ctx.variable_bindings));
    let tool = pseudo_tools::pseudo_tool_id(op_name);
    let code = Some(node_text(&node, source).to_string());
    Some(push_task(nodes, ctx, tool, Some(args), code))
}

fn handle_declarator(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    if name_node.kind() != "identifier" {
        return;
    }
    let name = node_text(&name_node, source).to_string();
    let Some(value_node) = node.child_by_field_name("value") else { return };

    match value_node.kind() {
        "call_expression" | "await_expression" | "binary_expression" | "ternary_expression" => {
            if let Some(id) = handle_expression(value_node, source, ctx, nodes) {
                ctx.variable_bindings.insert(name, id);
            }
        }
        "identifier" => {
            // A plain re-binding (`const copy = original;`) aliases the same producing node,
            // so later references through either name still resolve to it.
            let aliased = node_text(&value_node, source).to_string();
            if let Some(id) = ctx.variable_bindings.get(&aliased).cloned() {
                ctx.variable_bindings.insert(name, id);
            }
        }
        _ => {
            if let ArgValue::Literal(v) = resolve_arg_value(&value_node, source, &ctx.variable_bindings) {
                ctx.literal_bindings.insert(name, v);
            }
        }
    }
}

fn handle_if(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let Some(condition) = node.child_by_field_name("condition") else { return };
    let condition_text = node_text(&condition, source).to_string();
    let id = ctx.next_decision_id();
    nodes.push(SNode {
        id: id.clone(),
        kind: NodeKind::Decision { condition: condition_text },
        position: ctx.next_position(),
        parent_scope: ctx.current_scope(),
        meta: NodeMeta::new(ctx.nesting_level()),
    });

    if let Some(consequence) = node.child_by_field_name("consequence") {
        ctx.push_scope(ParentScope::DecisionTrue(id.clone()));
        walk_statement_or_block(consequence, source, ctx, nodes);
        ctx.pop_scope();
    }
    if let Some(alt) = node.child_by_field_name("alternative") {
        let alt_body = if alt.kind() == "else_clause" {
            alt.named_child(0).unwrap_or(alt)
        } else {
            alt
        };
        ctx.push_scope(ParentScope::DecisionFalse(id.clone()));
        walk_statement_or_block(alt_body, source, ctx, nodes);
        ctx.pop_scope();
    }
}

fn handle_ternary(
    node: Node,
    source: &str,
    ctx: &mut AnalysisContext,
    nodes: &mut Vec<SNode>,
) -> Option<capability_core::types::NodeId> {
    let condition = node.child_by_field_name("condition")?;
    let consequence = node.child_by_field_name("consequence")?;
    let alternative = node.child_by_field_name("alternative")?;
    let id = ctx.next_decision_id();
    nodes.push(SNode {
        id: id.clone(),
        kind: NodeKind::Decision {
            condition: node_text(&condition, source).to_string(),
        },
        position: ctx.next_position(),
        parent_scope: ctx.current_scope(),
        meta: NodeMeta::new(ctx.nesting_level()),
    });

    ctx.push_scope(ParentScope::DecisionTrue(id.clone()));
    handle_expression(consequence, source, ctx, nodes);
    ctx.pop_scope();

    ctx.push_scope(ParentScope::DecisionFalse(id.clone()));
    handle_expression(alternative, source, ctx, nodes);
    ctx.pop_scope();

    Some(id)
}

fn handle_switch(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let Some(value) = node.child_by_field_name("value") else { return };
    let Some(body) = node.child_by_field_name("body") else { return };
    let id = ctx.next_decision_id();
    nodes.push(SNode {
        id: id.clone(),
        kind: NodeKind::Decision {
            condition: node_text(&value, source).to_string(),
        },
        position: ctx.next_position(),
        parent_scope: ctx.current_scope(),
        meta: NodeMeta::new(ctx.nesting_level()),
    });

    let mut cursor = body.walk();
    for case_node in body.named_children(&mut cursor) {
        let label = match case_node.kind() {
            "switch_case" => case_node
                .child_by_field_name("value")
                .map(|v| node_text(&v, source).to_string())
                .unwrap_or_default(),
            "switch_default" => "default".to_string(),
            _ => continue,
        };
        ctx.push_scope(ParentScope::DecisionCase(id.clone(), label));
        let value_start = case_node.child_by_field_name("value").map(|v| v.start_byte());
        let mut case_cursor = case_node.walk();
        for stmt in case_node.named_children(&mut case_cursor) {
            if Some(stmt.start_byte()) == value_start {
                continue;
            }
            walk_statement(stmt, source, ctx, nodes);
        }
        ctx.pop_scope();
    }
}

fn handle_for(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let condition = node
        .child_by_field_name("condition")
        .map(|n| node_text(&n, source).to_string())
        .unwrap_or_default();
    push_loop_and_walk_body(node, LoopKind::For, condition, source, ctx, nodes);
}

fn handle_while(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let Some(condition_node) = node.child_by_field_name("condition") else { return };
    let condition = node_text(&condition_node, source).to_string();
    push_loop_and_walk_body(node, LoopKind::While, condition, source, ctx, nodes);
}

fn handle_do_while(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let condition = node
        .child_by_field_name("condition")
        .map(|n| node_text(&n, source).to_string())
        .unwrap_or_default();
    push_loop_and_walk_body(node, LoopKind::DoWhile, condition, source, ctx, nodes);
}

fn handle_for_in_of(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    let Some(left) = node.child_by_field_name("left") else { return };
    let Some(right) = node.child_by_field_name("right") else { return };
    let mut cursor = node.walk();
    let operator = node
        .children(&mut cursor)
        .find(|c| !c.is_named() && (c.kind() == "in" || c.kind() == "of"))
        .map(|c| c.kind().to_string())
        .unwrap_or_else(|| "of".to_string());
    let condition = format!("{} {} {}", node_text(&left, source), operator, node_text(&right, source));
    let kind = if operator == "in" { LoopKind::ForIn } else { LoopKind::ForOf };
    push_loop_and_walk_body(node, kind, condition, source, ctx, nodes);
}

fn push_loop_and_walk_body(
    node: Node,
    kind: LoopKind,
    condition: String,
    source: &str,
    ctx: &mut AnalysisContext,
    nodes: &mut Vec<SNode>,
) {
    let id = ctx.next_loop_id();
    nodes.push(SNode {
        id: id.clone(),
        kind: NodeKind::Loop { kind, condition, code: None },
        position: ctx.next_position(),
        parent_scope: ctx.current_scope(),
        meta: NodeMeta::new(ctx.nesting_level()),
    });
    if let Some(body) = node.child_by_field_name("body") {
        ctx.push_scope(ParentScope::Loop(id));
        walk_statement_or_block(body, source, ctx, nodes);
        ctx.pop_scope();
    }
}

/// `Promise.all([...])` / `Promise.allSettled([...])` (spec §4.1 "Parallel blocks"). Each
/// branch runs inside the same `Fork` scope; the returned id is the synthesized `Join` so
/// callers treating this expression's result like any other task output get a stable id.
fn handle_fork_join(
    node: Node,
    source: &str,
    ctx: &mut AnalysisContext,
    nodes: &mut Vec<SNode>,
) -> Option<capability_core::types::NodeId> {
    let fork_id = ctx.next_fork_id();
    nodes.push(SNode {
        id: fork_id.clone(),
        kind: NodeKind::Fork,
        position: ctx.next_position(),
        parent_scope: ctx.current_scope(),
        meta: NodeMeta::new(ctx.nesting_level()),
    });

    let args_node = node.child_by_field_name("arguments")?;
    let first_arg = args_node.named_child(0)?;

    ctx.push_scope(ParentScope::Fork(fork_id.clone()));
    if first_arg.kind() == "array" {
        let mut cursor = first_arg.walk();
        for branch in first_arg.named_children(&mut cursor) {
            handle_expression(branch, source, ctx, nodes);
        }
    } else {
        walk_for_nested_calls(first_arg, source, ctx, nodes);
    }
    ctx.pop_scope();

    let join_id = ctx.next_join_id();
    nodes.push(SNode {
        id: join_id.clone(),
        kind: NodeKind::Join,
        position: ctx.next_position(),
        parent_scope: ctx.current_scope(),
        meta: NodeMeta::new(ctx.nesting_level()),
    });
    Some(join_id)
}

/// Finds and processes call expressions nested inside an arrow-function/function body, for the
/// `items.map(item => mcp.ns.action(...))`-shaped fork branch.
fn walk_for_nested_calls(node: Node, source: &str, ctx: &mut AnalysisContext, nodes: &mut Vec<SNode>) {
    if node.kind() == "call_expression" {
        handle_call(node, source, ctx, nodes);
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_for_nested_calls(child, source, ctx, nodes);
    }
}
