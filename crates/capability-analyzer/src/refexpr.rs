//! Resolves a tree-sitter expression node into an [`ArgValue`] (spec §3/§4.1 argument
//! extraction): literal JSON, a `$capability`-input parameter (`args.x`, `params.x`, `input.x`),
//! or a reference expression rooted at a variable (tracked or free).

use capability_core::types::{ArgValue, NodeId};
use std::collections::HashMap;
use tree_sitter::Node;

const PARAMETER_ROOTS: &[&str] = &["args", "params", "input"];

pub fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 {
        let first = s.chars().next().unwrap();
        let last = s.chars().last().unwrap();
        if (first == '"' && last == '"') || (first == '\'' && last == '\'') || (first == '`' && last == '`') {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// The leftmost identifier of a member-expression chain (`a.b.c` -> `a`), and the dotted suffix
/// after it (`b.c`), read directly from source text rather than the tree, since `member_expression`
/// nesting is left-associative and a plain split is both simpler and equivalent for our subset.
fn split_root(expression: &str) -> (&str, &str) {
    match expression.split_once(['.', '[']) {
        Some((root, _)) => {
            let rest = expression[root.len()..].trim_start_matches('.');
            (root, rest)
        }
        None => (expression, ""),
    }
}

/// Attempts to build a fully-literal `serde_json::Value` from a node, failing (returning `None`)
/// as soon as it encounters an identifier or call it cannot reduce to a literal.
fn try_literal(node: &Node, source: &str) -> Option<serde_json::Value> {
    match node.kind() {
        "string" | "template_string" => Some(serde_json::Value::String(strip_quotes(node_text(node, source)))),
        "number" => node_text(node, source).parse::<f64>().ok().and_then(|n| {
            serde_json::Number::from_f64(n).map(serde_json::Value::Number)
        }),
        "true" => Some(serde_json::Value::Bool(true)),
        "false" => Some(serde_json::Value::Bool(false)),
        "null" | "undefined" => Some(serde_json::Value::Null),
        "array" => {
            let mut items = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                items.push(try_literal(&child, source)?);
            }
            Some(serde_json::Value::Array(items))
        }
        "object" => {
            let mut map = serde_json::Map::new();
            let mut cursor = node.walk();
            for pair in node.named_children(&mut cursor) {
                if pair.kind() != "pair" {
                    continue;
                }
                let key_node = pair.child_by_field_name("key")?;
                let key = strip_quotes(node_text(&key_node, source));
                let value_node = pair.child_by_field_name("value")?;
                map.insert(key, try_literal(&value_node, source)?);
            }
            Some(serde_json::Value::Object(map))
        }
        "unary_expression" => {
            let op = node.child(0).map(|n| node_text(&n, source).to_string())?;
            let operand = node.child_by_field_name("argument")?;
            let inner = try_literal(&operand, source)?;
            if op == "-" {
                inner.as_f64().and_then(|n| serde_json::Number::from_f64(-n)).map(serde_json::Value::Number)
            } else {
                None
            }
        }
        "parenthesized_expression" => {
            let inner = node.named_child(0)?;
            try_literal(&inner, source)
        }
        _ => None,
    }
}

/// Rewrites a reference expression's leading identifier into its producing node id when `root`
/// is a tracked variable (spec §9: "the leading identifier equals a node id exactly when the
/// source variable was a tracked binding; otherwise it is an external free name"). Without this
/// rewrite the Edge Builder would see variable names instead of node ids and could never match
/// a reference back to the node that produced it.
fn rewrite_root(root: &str, rest: &str, bindings: &HashMap<String, NodeId>) -> String {
    match bindings.get(root) {
        Some(id) if rest.is_empty() => id.0.clone(),
        Some(id) => format!("{}.{}", id.0, rest),
        None if rest.is_empty() => root.to_string(),
        None => format!("{root}.{rest}"),
    }
}

/// Resolves a single argument expression node into the `ArgValue` the spec's data model carries
/// (spec §3, §4.1). Falls back to `Reference { expression: <raw source text> }` for any
/// expression shape too dynamic to classify more precisely (nested calls, ternaries, binary
/// expressions used as a bare argument) -- the Edge Builder only needs the leading identifier.
pub fn resolve_arg_value(node: &Node, source: &str, bindings: &HashMap<String, NodeId>) -> ArgValue {
    if let Some(literal) = try_literal(node, source) {
        return ArgValue::Literal(literal);
    }
    match node.kind() {
        "identifier" => {
            let name = node_text(node, source).to_string();
            if PARAMETER_ROOTS.contains(&name.as_str()) {
                ArgValue::Parameter { name: String::new() }
            } else {
                ArgValue::Reference {
                    expression: rewrite_root(&name, "", bindings),
                }
            }
        }
        "member_expression" | "subscript_expression" => {
            let expression = node_text(node, source).to_string();
            let (root, rest) = split_root(&expression);
            if PARAMETER_ROOTS.contains(&root) {
                ArgValue::Parameter { name: rest.to_string() }
            } else {
                ArgValue::Reference {
                    expression: rewrite_root(root, rest, bindings),
                }
            }
        }
        _ => ArgValue::Reference {
            expression: node_text(node, source).to_string(),
        },
    }
}
