//! The Semantic Hasher (spec §4.4): a 256-bit content digest of a canonicalized structure, so
//! `const x = 1; use(x)` and `const y = 1; use(y)` hash identically. Falls back to a hash of the
//! normalized source text when the analyzed structure is empty (e.g. a pure pseudo-code snippet
//! with no task nodes).

use capability_core::types::{Node, NodeId, NodeKind, StaticStructure};
use sha2::{Digest, Sha256};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Orders node ids so that every edge's source precedes its target, breaking ties (and cycles)
/// by the node's original AST position (spec §4.4 "position-in-topological-order").
///
/// A genuine dependency cycle cannot occur among `Sequence`/`Conditional`/`LoopBody`/`Provides`
/// edges in a well-formed analysis, but a malformed one is handled by falling back to position
/// order for whatever nodes never reach zero indegree, rather than panicking or truncating.
pub fn topological_order(structure: &StaticStructure) -> Vec<NodeId> {
    let position_of: HashMap<&NodeId, u32> = structure.nodes.iter().map(|n| (&n.id, n.position)).collect();
    let mut indegree: HashMap<&NodeId, usize> = structure.nodes.iter().map(|n| (&n.id, 0)).collect();
    let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for edge in &structure.edges {
        if let Some(entry) = indegree.get_mut(&edge.to) {
            *entry += 1;
        }
        adjacency.entry(&edge.from).or_default().push(&edge.to);
    }

    let mut ready: BinaryHeap<Reverse<(u32, &NodeId)>> = BinaryHeap::new();
    for node in &structure.nodes {
        if indegree[&node.id] == 0 {
            ready.push(Reverse((node.position, &node.id)));
        }
    }

    let mut order: Vec<NodeId> = Vec::with_capacity(structure.nodes.len());
    while let Some(Reverse((_, id))) = ready.pop() {
        order.push(id.clone());
        if let Some(children) = adjacency.get(id) {
            for &child in children {
                if let Some(entry) = indegree.get_mut(child) {
                    *entry -= 1;
                    if *entry == 0 {
                        ready.push(Reverse((position_of[child], child)));
                    }
                }
            }
        }
    }

    if order.len() < structure.nodes.len() {
        let mut remaining: Vec<&Node> = structure
            .nodes
            .iter()
            .filter(|n| !order.contains(&n.id))
            .collect();
        remaining.sort_by_key(|n| n.position);
        order.extend(remaining.into_iter().map(|n| n.id.clone()));
    }
    order
}

/// Rewrites every node-id-shaped identifier token in free text (a `Decision`/`Loop` condition)
/// using `remap`, leaving everything else untouched.
fn remap_token_text(text: &str, remap: &HashMap<String, usize>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_alphabetic() || c == '_' {
            let start = i;
            let mut end = i + c.len_utf8();
            while let Some(&(j, c2)) = chars.peek() {
                if c2.is_alphanumeric() || c2 == '_' {
                    end = j + c2.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let token = &text[start..end];
            match remap.get(token) {
                Some(idx) => out.push_str(&format!("#{idx}")),
                None => out.push_str(token),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Rewrites the leading node-id root of a `Reference` expression (`n1.items[0]` -> `#2.items[0]`),
/// leaving an unresolved (external) root untouched.
fn remap_reference_expression(expression: &str, remap: &HashMap<String, usize>) -> String {
    let root_end = expression
        .find(|c: char| c == '.' || c == '[')
        .unwrap_or(expression.len());
    let root = &expression[..root_end];
    match remap.get(root) {
        Some(idx) => format!("#{idx}{}", &expression[root_end..]),
        None => expression.to_string(),
    }
}

/// One node's contribution to the canonical structure, with node-id references replaced by
/// topological position so that two structures differing only in id assignment (e.g. variable
/// naming) canonicalize identically (spec §4.4).
fn canonical_kind(kind: &NodeKind, remap: &HashMap<String, usize>) -> serde_json::Value {
    match kind {
        NodeKind::Task { tool, arguments, code } => {
            let args = arguments.as_ref().map(|map| {
                let mut canonical = serde_json::Map::new();
                for (name, value) in map {
                    let canonical_value = match value {
                        capability_core::types::ArgValue::Literal(v) => {
                            serde_json::json!({"strategy": "literal", "value": v})
                        }
                        capability_core::types::ArgValue::Reference { expression } => {
                            serde_json::json!({
                                "strategy": "reference",
                                "expression": remap_reference_expression(expression, remap),
                            })
                        }
                        capability_core::types::ArgValue::Parameter { name } => {
                            serde_json::json!({"strategy": "parameter", "name": name})
                        }
                    };
                    canonical.insert(name.clone(), canonical_value);
                }
                serde_json::Value::Object(canonical)
            });
            serde_json::json!({
                "kind": "task",
                "tool": tool,
                "arguments": args,
                "code": code,
            })
        }
        NodeKind::Decision { condition } => serde_json::json!({
            "kind": "decision",
            "condition": remap_token_text(condition, remap),
        }),
        NodeKind::Fork => serde_json::json!({"kind": "fork"}),
        NodeKind::Join => serde_json::json!({"kind": "join"}),
        NodeKind::Loop { kind, condition, code } => serde_json::json!({
            "kind": "loop",
            "loop_kind": kind.to_string(),
            "condition": remap_token_text(condition, remap),
            "code": code,
        }),
        NodeKind::Capability { capability_id } => serde_json::json!({
            "kind": "capability",
            "capability_id": capability_id,
        }),
    }
}

/// Canonicalizes `structure` per spec §4.4: nodes in topological order with ids replaced by
/// position, edges remapped accordingly. `serde_json::Value::Object` canonicalizes key order
/// (this workspace never enables `serde_json`'s `preserve_order` feature), so the resulting JSON
/// string is deterministic across runs and across equivalent structures.
pub fn canonicalize(structure: &StaticStructure) -> serde_json::Value {
    let order = topological_order(structure);
    let remap: HashMap<String, usize> = order.iter().enumerate().map(|(i, id)| (id.0.clone(), i)).collect();

    let nodes: Vec<serde_json::Value> = order
        .iter()
        .filter_map(|id| structure.node(id))
        .enumerate()
        .map(|(i, node)| {
            let mut value = canonical_kind(&node.kind, &remap);
            value["index"] = serde_json::json!(i);
            value["parent_scope"] = match &node.parent_scope {
                Some(scope) => serde_json::json!(remap_token_text(&scope.to_string(), &remap)),
                None => serde_json::Value::Null,
            };
            value
        })
        .collect();

    let mut edges: Vec<serde_json::Value> = structure
        .edges
        .iter()
        .map(|edge| {
            let from = *remap.get(&edge.from.0).unwrap_or(&usize::MAX);
            let to = *remap.get(&edge.to.0).unwrap_or(&usize::MAX);
            serde_json::json!({"from": from, "to": to, "edge": edge.kind})
        })
        .collect();
    edges.sort_by_key(|e| e.to_string());

    serde_json::json!({"nodes": nodes, "edges": edges})
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The capability's `codeHash` (spec §4.4): a canonical-structure hash when `structure` has any
/// nodes, otherwise a hash of the normalized source text.
pub fn semantic_hash(normalized_source: &str, structure: &StaticStructure) -> String {
    if structure.is_empty() {
        return hex_digest(normalized_source.as_bytes());
    }
    let canonical = canonicalize(structure);
    hex_digest(canonical.to_string().as_bytes())
}
