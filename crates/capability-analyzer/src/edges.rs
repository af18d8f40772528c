//! The Edge Builder (spec §4.2): turns the flat, scope-annotated node list the visitor produces
//! into `Sequence`/`Conditional`/`LoopBody`/`Provides` edges, deduplicated on `(from, to, type)`.

use capability_core::types::{ArgValue, Coverage, Edge, Node, NodeId, NodeKind, ParentScope};
use std::collections::HashMap;

/// Lets a caller with tool-schema knowledge classify a `Provides` edge between an ordered pair
/// of task nodes purely from their declared schemas (spec §4.2 step 6) — independent of whether
/// the consumer's arguments carry a textual `Reference` to the producer at all. The analyzer
/// itself has no such knowledge (tool schemas live with the capability store), so
/// [`NoSchemaClassifier`] — which always declines — is what `analyze` uses by default.
pub trait ProvidesClassifier {
    /// `producer`/`consumer` are tool ids (spec §3 `Node::Task.tool`). Returns `None` when
    /// either schema is unknown, or when they are known but the producer's output properties and
    /// the consumer's input properties don't intersect at all (spec §4.2 step 6: "no edge if the
    /// intersection is empty").
    fn classify(&self, producer: &str, consumer: &str) -> Option<Coverage>;
}

pub struct NoSchemaClassifier;

impl ProvidesClassifier for NoSchemaClassifier {
    fn classify(&self, _producer: &str, _consumer: &str) -> Option<Coverage> {
        None
    }
}

fn is_node_id_shaped(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some('n' | 'd' | 'l' | 'f' | 'j') => token.len() > 1 && token[1..].chars().all(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Every `(root, accessed-path)` pair a node's arguments/condition reference, where `root` looks
/// like a node id (`n1`, `d2`, ...). A condition is scanned as free text since `Decision`/`Loop`
/// carry their condition as a source-text string, not a structured `ArgValue`.
fn collect_references(node: &Node) -> Vec<(String, String)> {
    let mut refs = Vec::new();
    match &node.kind {
        NodeKind::Task { arguments: Some(args), .. } => {
            for value in args.values() {
                if let ArgValue::Reference { expression } = value {
                    if let Some(root) = value.reference_root() {
                        if is_node_id_shaped(root) {
                            let path = expression
                                .strip_prefix(root)
                                .unwrap_or("")
                                .trim_start_matches(['.', '['])
                                .to_string();
                            refs.push((root.to_string(), path));
                        }
                    }
                }
            }
        }
        NodeKind::Decision { condition } => refs.extend(scan_condition_text(condition)),
        NodeKind::Loop { condition, .. } => refs.extend(scan_condition_text(condition)),
        _ => {}
    }
    refs
}

fn scan_condition_text(condition: &str) -> Vec<(String, String)> {
    condition
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|tok| is_node_id_shaped(tok))
        .map(|tok| (tok.to_string(), String::new()))
        .collect()
}

fn dedup_push(edges: &mut Vec<Edge>, edge: Edge) {
    let key = edge.dedup_key();
    if !edges.iter().any(|e| e.dedup_key() == key) {
        edges.push(edge);
    }
}

/// Builds every edge for one analyzed structure's node list (spec §4.2).
pub fn build_edges(nodes: &[Node], classifier: &dyn ProvidesClassifier) -> Vec<Edge> {
    let mut edges = Vec::new();
    let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.0.as_str(), n)).collect();

    // Method-chain continuations are always a direct sequence (spec §4.1 "chained_from").
    for node in nodes {
        if let Some(from) = &node.meta.chained_from {
            dedup_push(&mut edges, Edge::sequence(from.clone(), node.id.clone()));
        }
    }

    // Data-dependency edges (spec §4.2 step 2): a node referencing an earlier node's id gets a
    // Sequence edge. This is unconditional on a real data dependency existing in the source —
    // schema-driven `Provides` edges are a wholly separate pass below (step 6), since spec §4.2
    // requires one for *every* schema-intersecting task pair, with or without a textual
    // reference between them.
    for node in nodes {
        for (root, _path) in collect_references(node) {
            let Some(source) = by_id.get(root.as_str()) else { continue };
            if source.position >= node.position {
                continue;
            }
            dedup_push(&mut edges, Edge::sequence(source.id.clone(), node.id.clone()));
        }
    }

    // Provides edges (spec §4.2 step 6): for every ordered pair of task nodes `(p, c)` with
    // `p.position < c.position`, ask the classifier whether their schemas intersect at all,
    // regardless of whether `c` carries a `Reference` to `p`.
    let task_nodes: Vec<&Node> = nodes.iter().filter(|n| n.tool_id().is_some()).collect();
    for producer in &task_nodes {
        for consumer in &task_nodes {
            if producer.position >= consumer.position {
                continue;
            }
            let (Some(p_tool), Some(c_tool)) = (producer.tool_id(), consumer.tool_id()) else { continue };
            if let Some(coverage) = classifier.classify(p_tool, c_tool) {
                dedup_push(&mut edges, Edge::provides(producer.id.clone(), consumer.id.clone(), coverage));
            }
        }
    }

    // Conditional / loop-body / fork-join entry edges: the owning Decision/Loop/Fork connects
    // to the first (lowest-position) node inside each of its scopes.
    let mut by_scope: HashMap<&ParentScope, Vec<&Node>> = HashMap::new();
    for node in nodes {
        if let Some(scope) = &node.parent_scope {
            by_scope.entry(scope).or_default().push(node);
        }
    }
    for (scope, mut members) in by_scope {
        members.sort_by_key(|n| n.position);
        let Some(first) = members.first() else { continue };
        let owner = scope.owner().clone();
        let entry_edge = match scope {
            ParentScope::DecisionTrue(_) => Edge::conditional(owner, first.id.clone(), "true"),
            ParentScope::DecisionFalse(_) => Edge::conditional(owner, first.id.clone(), "false"),
            ParentScope::DecisionCase(_, label) => Edge::conditional(owner, first.id.clone(), label.clone()),
            ParentScope::Loop(_) => Edge::loop_body(owner, first.id.clone()),
            ParentScope::Fork(_) => Edge::sequence(owner, first.id.clone()),
        };
        dedup_push(&mut edges, entry_edge);

        if let ParentScope::Fork(fork_id) = scope {
            if let Some(join) = find_join_after(nodes, fork_id, by_id.get(fork_id.0.as_str()).copied()) {
                if let Some(last) = members.last() {
                    dedup_push(&mut edges, Edge::sequence(last.id.clone(), join.id.clone()));
                }
            }
        }
    }

    edges
}

/// The `Join` node synthesized immediately after `fork_id`'s branches, i.e. the nearest `Join`
/// at the fork's own scope with a later position.
fn find_join_after<'a>(nodes: &'a [Node], _fork_id: &NodeId, fork_node: Option<&'a Node>) -> Option<&'a Node> {
    let fork_node = fork_node?;
    nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Join))
        .filter(|n| n.parent_scope == fork_node.parent_scope && n.position > fork_node.position)
        .min_by_key(|n| n.position)
}
