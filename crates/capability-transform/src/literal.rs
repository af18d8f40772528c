//! Literal parameterization (spec §4.3): lifts inlined literal values out of an observed
//! snippet into `args.<name>` references, and synthesizes a JSON Schema describing the lifted
//! parameters. Two independent sources of literals are lifted:
//!
//! - named local declarations the caller already flagged via `literal_bindings` (the analyzer's
//!   `StaticStructure::literal_bindings`, spec §3);
//! - inline literal arguments discovered directly at `mcp.*` call sites, including nested
//!   "looks like code" template literals that are parameterized recursively.

use crate::splice::{apply_edits, Edit};
use crate::wrap;
use capability_analyzer::refexpr::resolve_arg_value;
use capability_core::error::Warning;
use capability_core::types::ArgValue;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tree_sitter::{Node, Parser};

/// Heuristics for "this template literal's body is itself code, not data" (spec §4.3).
const CODE_LIKE_MARKERS: &[&str] = &[
    "await ", "=>", "page.", "document.", "window.", "console.", "return ", "if (", "for (",
    "while (", ".then(", "function",
];
const CODE_LIKE_MIN_LEN: usize = 20;

fn looks_like_code(body: &str) -> bool {
    body.len() >= CODE_LIKE_MIN_LEN && CODE_LIKE_MARKERS.iter().any(|marker| body.contains(marker))
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
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

/// Every name bound by a function parameter, loop variable, or `catch` clause anywhere in the
/// tree. Used as a blanket shadow check for pass 2 (spec §4.3 "shadowed scopes") -- a
/// simplification of true lexical scoping, but sufficient for the flat, shallow snippets this
/// transformer is meant to parameterize.
fn collect_shadowed_names(node: Node, source: &str, out: &mut HashSet<String>) {
    match node.kind() {
        "formal_parameters" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_pattern_names(&child, source, out);
            }
        }
        "catch_clause" => {
            if let Some(param) = node.child_by_field_name("parameter") {
                collect_pattern_names(&param, source, out);
            }
        }
        "for_in_statement" => {
            if let Some(left) = node.child_by_field_name("left") {
                collect_pattern_names(&left, source, out);
            }
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_shadowed_names(child, source, out);
    }
}

fn collect_pattern_names(node: &Node, source: &str, out: &mut HashSet<String>) {
    match node.kind() {
        "identifier" => {
            out.insert(node_text(node, source).to_string());
        }
        "variable_declarator" => {
            if let Some(name) = node.child_by_field_name("name") {
                collect_pattern_names(&name, source, out);
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                collect_pattern_names(&child, source, out);
            }
        }
    }
}

/// Pass 1 (spec §4.3): whole-statement removal spans for `var|let|const <name> = <literal>`
/// declarations naming a caller-supplied literal binding, skipping loop headers.
fn collect_declaration_removals(
    node: Node,
    source: &str,
    literal_bindings: &HashMap<String, Value>,
    removed_spans: &mut Vec<(usize, usize)>,
    edits: &mut Vec<Edit>,
) {
    if node.kind() == "variable_declaration" {
        let in_loop_header = node
            .parent()
            .map(|p| matches!(p.kind(), "for_statement" | "for_in_statement"))
            .unwrap_or(false);
        if !in_loop_header && node.named_child_count() == 1 {
            if let Some(declarator) = node.named_child(0) {
                if let (Some(name_node), Some(_value_node)) = (
                    declarator.child_by_field_name("name"),
                    declarator.child_by_field_name("value"),
                ) {
                    let name = node_text(&name_node, source);
                    if name_node.kind() == "identifier" && literal_bindings.contains_key(name) {
                        let mut end = node.end_byte();
                        if source.as_bytes().get(end) == Some(&b'\n') {
                            end += 1;
                        }
                        removed_spans.push((node.start_byte(), end));
                        edits.push(Edit {
                            start: node.start_byte(),
                            end,
                            replacement: String::new(),
                        });
                        return;
                    }
                }
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_declaration_removals(child, source, literal_bindings, removed_spans, edits);
    }
}

fn is_mcp_call_argument_list<'a>(node: &Node<'a>, source: &str) -> Option<Node<'a>> {
    if node.kind() != "call_expression" {
        return None;
    }
    let callee = node.child_by_field_name("function")?;
    let root = match callee.kind() {
        "member_expression" => {
            let mut current = callee;
            loop {
                let object = current.child_by_field_name("object")?;
                if object.kind() == "identifier" {
                    break object;
                }
                if object.kind() != "member_expression" {
                    return None;
                }
                current = object;
            }
        }
        "subscript_expression" => callee.child_by_field_name("object")?,
        _ => return None,
    };
    if root.kind() == "identifier" && node_text(&root, source) == "mcp" {
        node.child_by_field_name("arguments")
    } else {
        None
    }
}

fn unique_property_name(extracted: &Map<String, Value>, candidate: &str, value: &Value) -> String {
    if extracted.get(candidate).map(|v| v == value).unwrap_or(true) {
        return candidate.to_string();
    }
    let mut i = 2;
    loop {
        let renamed = format!("{candidate}_{i}");
        if extracted.get(&renamed).map(|v| v == value).unwrap_or(true) {
            return renamed;
        }
        i += 1;
    }
}

/// Inline-literal lifting at `mcp.*` call sites (spec §4.3), including nested code-template
/// extraction for template-literal arguments that "look like code".
fn lift_call_site_literals(node: Node, source: &str, extracted: &mut Map<String, Value>, edits: &mut Vec<Edit>) {
    if let Some(arguments) = is_mcp_call_argument_list(&node, source) {
        if arguments.named_child_count() == 1 {
            let object = arguments.named_child(0).unwrap();
            if object.kind() == "object" {
                let mut cursor = object.walk();
                for pair in object.named_children(&mut cursor) {
                    if pair.kind() != "pair" {
                        continue;
                    }
                    let Some(key_node) = pair.child_by_field_name("key") else { continue };
                    let Some(value_node) = pair.child_by_field_name("value") else { continue };
                    let property_name = strip_quotes(node_text(&key_node, source));

                    if value_node.kind() == "template_string" {
                        let body = strip_quotes(node_text(&value_node, source));
                        if looks_like_code(&body) {
                            let name = unique_property_name(extracted, &property_name, &json!(body));
                            let (inner_source, inner_schema) = parameterize_inner(&body);
                            merge_inner_schema(extracted, &name, &inner_schema);
                            extracted.insert(name.clone(), json!(inner_source));
                            edits.push(Edit {
                                start: value_node.start_byte(),
                                end: value_node.end_byte(),
                                replacement: format!("args.{name}"),
                            });
                            continue;
                        }
                    }

                    if let ArgValue::Literal(value) = resolve_arg_value(&value_node, source, &HashMap::new()) {
                        let name = unique_property_name(extracted, &property_name, &value);
                        extracted.insert(name.clone(), value);
                        edits.push(Edit {
                            start: value_node.start_byte(),
                            end: value_node.end_byte(),
                            replacement: format!("args.{name}"),
                        });
                    }
                }
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        lift_call_site_literals(child, source, extracted, edits);
    }
}

/// Recursively parameterizes a nested code template's body, returning its (possibly rewritten)
/// text and the schema of literals it lifted -- merged into the outer schema by the caller.
fn parameterize_inner(body: &str) -> (String, Value) {
    match try_parameterize(body, &HashMap::new()) {
        Ok((source, schema)) => (source, schema),
        Err(_) => (body.to_string(), json!({"type": "object", "properties": {}, "required": []})),
    }
}

/// Flattens `inner_schema`'s properties into `extracted`, prefixing with `outer_name_` only when
/// a name collision would otherwise occur (spec §4.3: "inner names are prefixed by the outer
/// property name on conflict").
fn merge_inner_schema(extracted: &mut Map<String, Value>, outer_name: &str, inner_schema: &Value) {
    let Some(properties) = inner_schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (inner_name, inner_property) in properties {
        let example = inner_property
            .get("examples")
            .and_then(Value::as_array)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or(Value::Null);
        let name = if extracted.contains_key(inner_name) {
            format!("{outer_name}_{inner_name}")
        } else {
            inner_name.clone()
        };
        extracted.insert(name, example);
    }
}

/// Pass 2 (spec §4.3): rewrites every free-standing `Identifier` use of a lifted local name to
/// `args.<name>`, skipping declaration spans, property-key/member-property positions, and names
/// shadowed by a parameter, loop variable, or `catch` binding.
fn rewrite_identifier_usages(
    node: Node,
    source: &str,
    literal_bindings: &HashMap<String, Value>,
    shadowed: &HashSet<String>,
    removed_spans: &[(usize, usize)],
    edits: &mut Vec<Edit>,
) {
    if node.kind() == "identifier" {
        let name = node_text(&node, source);
        if literal_bindings.contains_key(name) && !shadowed.contains(name) {
            let within_removed = removed_spans
                .iter()
                .any(|(start, end)| node.start_byte() >= *start && node.end_byte() <= *end);
            let is_key_position = node
                .parent()
                .map(|p| p.kind() == "pair" && p.child_by_field_name("key") == Some(node))
                .unwrap_or(false);
            let is_property_position = node
                .parent()
                .map(|p| p.kind() == "member_expression" && p.child_by_field_name("property") == Some(node))
                .unwrap_or(false);
            if !within_removed && !is_key_position && !is_property_position {
                edits.push(Edit {
                    start: node.start_byte(),
                    end: node.end_byte(),
                    replacement: format!("args.{name}"),
                });
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        rewrite_identifier_usages(child, source, literal_bindings, shadowed, removed_spans, edits);
    }
}

fn strip_empty_lines(source: &str) -> String {
    source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn schema_for_value(value: &Value) -> Value {
    match value {
        Value::String(s) => json!({"type": "string", "examples": [s]}),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                json!({"type": "integer", "examples": [n]})
            } else {
                json!({"type": "number", "examples": [n]})
            }
        }
        Value::Bool(b) => json!({"type": "boolean", "examples": [b], "default": b}),
        Value::Array(items) => {
            let item_schema = items.first().map(schema_for_value).unwrap_or_else(|| json!({}));
            json!({"type": "array", "items": item_schema})
        }
        Value::Object(fields) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for (key, field_value) in fields {
                properties.insert(key.clone(), schema_for_value(field_value));
                required.push(json!(key));
            }
            json!({"type": "object", "properties": properties, "required": required})
        }
        Value::Null => json!({"type": "null"}),
    }
}

fn synthesize_schema(extracted: &Map<String, Value>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (name, value) in extracted {
        properties.insert(name.clone(), schema_for_value(value));
        required.push(json!(name));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn try_parameterize(source: &str, literal_bindings: &HashMap<String, Value>) -> std::result::Result<(String, Value), String> {
    let wrapped = wrap::wrap(source);
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .map_err(|e| e.to_string())?;
    let tree = parser
        .parse(&wrapped.text, None)
        .ok_or_else(|| "tree-sitter produced no parse tree".to_string())?;
    if tree.root_node().has_error() {
        return Err("snippet contains a syntax error".to_string());
    }

    let mut shadowed = HashSet::new();
    collect_shadowed_names(tree.root_node(), &wrapped.text, &mut shadowed);

    let mut extracted: Map<String, Value> = Map::new();
    let mut edits: Vec<Edit> = Vec::new();
    let mut removed_spans: Vec<(usize, usize)> = Vec::new();

    collect_declaration_removals(tree.root_node(), &wrapped.text, literal_bindings, &mut removed_spans, &mut edits);
    lift_call_site_literals(tree.root_node(), &wrapped.text, &mut extracted, &mut edits);
    rewrite_identifier_usages(
        tree.root_node(),
        &wrapped.text,
        literal_bindings,
        &shadowed,
        &removed_spans,
        &mut edits,
    );

    let original_edits: Vec<Edit> = edits
        .into_iter()
        .map(|e| Edit {
            start: wrap::to_original(e.start, wrapped.offset),
            end: wrap::to_original(e.end, wrapped.offset),
            replacement: e.replacement,
        })
        .collect();

    let rewritten = strip_empty_lines(&apply_edits(source, original_edits));

    for (name, value) in literal_bindings {
        extracted.entry(name.clone()).or_insert_with(|| value.clone());
    }

    Ok((rewritten, synthesize_schema(&extracted)))
}

/// Lifts literal values out of `source` into `args.<name>` references (spec §4.3). A parse or
/// transform failure never propagates: the original source is kept and a warning is returned
/// (spec §7 `LiteralTransformError`).
pub fn parameterize(source: &str, literal_bindings: &HashMap<String, Value>) -> (String, Value, Vec<Warning>) {
    match try_parameterize(source, literal_bindings) {
        Ok((rewritten, schema)) => (rewritten, schema, Vec::new()),
        Err(message) => (
            source.to_string(),
            json!({"type": "object", "properties": {}, "required": []}),
            vec![Warning::LiteralTransform { message }],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifts_a_named_declaration_into_an_args_reference() {
        let mut bindings = HashMap::new();
        bindings.insert("threshold".to_string(), json!(10));
        let source = "const threshold = 10;\nawait mcp.orders.flagLarge({ min: threshold });";
        let (rewritten, schema, warnings) = parameterize(source, &bindings);
        assert!(warnings.is_empty());
        assert!(!rewritten.contains("const threshold"));
        assert!(rewritten.contains("args.threshold"));
        assert_eq!(schema["required"], json!(["threshold"]));
    }

    #[test]
    fn lifts_an_inline_call_site_literal() {
        let source = r#"await mcp.reports.generate({ scope: "daily" });"#;
        let (rewritten, schema, warnings) = parameterize(source, &HashMap::new());
        assert!(warnings.is_empty());
        assert!(rewritten.contains("args.scope"));
        assert_eq!(schema["properties"]["scope"]["type"], json!("string"));
    }

    #[test]
    fn leaves_a_parameter_reference_untouched() {
        let source = "await mcp.users.fetch({ id: args.userId });";
        let (rewritten, _schema, warnings) = parameterize(source, &HashMap::new());
        assert!(warnings.is_empty());
        assert_eq!(rewritten, source);
    }

    #[test]
    fn malformed_source_is_kept_unchanged_with_a_warning() {
        let (rewritten, _schema, warnings) = parameterize("not { valid ((( js", &HashMap::new());
        assert_eq!(rewritten, "not { valid ((( js");
        assert_eq!(warnings.len(), 1);
    }
}
