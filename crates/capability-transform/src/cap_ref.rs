//! Capability-reference rewrite (spec §4.3): every `mcp.<ns>.<action>(...)` call site is
//! resolved against the capability registry for the caller's `(org, project)` scope and, if
//! resolved, replaced with `mcp["$cap:<uuid>"]` (spec §6 reference format). An already-rewritten
//! reference (the index string already starts with `$cap:`) is left alone.

use crate::splice::{apply_edits, Edit};
use crate::wrap;
use capability_core::error::{CoreError, Result};
use capability_core::traits::CapabilityResolver;
use tree_sitter::{Node, Parser};

struct Candidate {
    ns: String,
    action: String,
    start: usize,
    end: usize,
}

fn node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

fn is_already_transformed(callee: &Node, source: &str) -> bool {
    if callee.kind() != "subscript_expression" {
        return false;
    }
    let Some(object) = callee.child_by_field_name("object") else { return false };
    if object.kind() != "identifier" || node_text(&object, source) != "mcp" {
        return false;
    }
    let Some(index) = callee.child_by_field_name("index") else { return false };
    strip_quotes(node_text(&index, source)).starts_with("$cap:")
}

/// Matches the two-level `mcp.<ns>.<action>` member-expression shape, returning `(ns, action)`.
fn match_mcp_member(callee: &Node, source: &str) -> Option<(String, String)> {
    if callee.kind() != "member_expression" {
        return None;
    }
    let action = callee.child_by_field_name("property")?;
    let inner = callee.child_by_field_name("object")?;
    if inner.kind() != "member_expression" {
        return None;
    }
    let ns = inner.child_by_field_name("property")?;
    let root = inner.child_by_field_name("object")?;
    if root.kind() != "identifier" || node_text(&root, source) != "mcp" {
        return None;
    }
    Some((node_text(&ns, source).to_string(), node_text(&action, source).to_string()))
}

fn collect_candidates(node: Node, source: &str, out: &mut Vec<Candidate>) {
    if node.kind() == "call_expression" {
        if let Some(callee) = node.child_by_field_name("function") {
            if !is_already_transformed(&callee, source) {
                if let Some((ns, action)) = match_mcp_member(&callee, source) {
                    out.push(Candidate {
                        ns,
                        action,
                        start: callee.start_byte(),
                        end: callee.end_byte(),
                    });
                }
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_candidates(child, source, out);
    }
}

/// Rewrites every resolvable `mcp.<ns>.<action>` reference in `source` against `resolver`,
/// scoped to `(org, project)`. Returns the rewritten source and the count actually rewritten.
///
/// An unresolved reference (a genuine remote tool, not a capability) is left untouched. A
/// resolver error propagates (spec §7 `TransformResolutionError`): it is fatal for the save.
/// A parse failure is not: it returns `source` unchanged with a replaced count of zero, matching
/// the transformer's general parse-failure policy (spec §4.3 "Failure semantics").
pub async fn rewrite(
    source: &str,
    org: &str,
    project: &str,
    resolver: &dyn CapabilityResolver,
) -> Result<(String, usize)> {
    let wrapped = wrap::wrap(source);
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_javascript::LANGUAGE.into())
        .map_err(|e| CoreError::Other(anyhow::anyhow!("failed to load javascript grammar: {e}")))?;
    let Some(tree) = parser.parse(&wrapped.text, None) else {
        return Ok((source.to_string(), 0));
    };
    if tree.root_node().has_error() {
        return Ok((source.to_string(), 0));
    }

    let mut candidates = Vec::new();
    collect_candidates(tree.root_node(), &wrapped.text, &mut candidates);

    let mut edits = Vec::new();
    for candidate in candidates {
        let tool_id = format!("{}.{}", candidate.ns, candidate.action);
        if let Some(capability_id) = resolver.resolve(org, project, &tool_id).await? {
            edits.push(Edit {
                start: wrap::to_original(candidate.start, wrapped.offset),
                end: wrap::to_original(candidate.end, wrapped.offset),
                replacement: format!(r#"mcp["$cap:{capability_id}"]"#),
            });
        }
    }

    let replaced_count = edits.len();
    let rewritten = apply_edits(source, edits);
    Ok((rewritten, replaced_count))
}
