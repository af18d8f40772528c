//! Decision-outcome inference (spec §8 Scenario D `inferDecisions`): given a structure's
//! `Decision` nodes and a runtime `executedPath` (tool ids actually observed to run), recovers
//! which branch of each decision fired.
//!
//! `StaticStructure` stores only an immediate `parent_scope` per node, not a full containment
//! path, so "is this task inside that branch" is answered by walking the scope chain up through
//! each owning node until it either matches the branch in question or runs out of parents.

use capability_core::trace::DecisionObservation;
use capability_core::types::{Node, NodeId, NodeKind, ParentScope, StaticStructure};
use std::collections::HashMap;

fn scope_contains(node: &Node, branch: &ParentScope, by_id: &HashMap<&NodeId, &Node>) -> bool {
    let mut current = node.parent_scope.as_ref();
    while let Some(scope) = current {
        if scope == branch {
            return true;
        }
        current = by_id.get(scope.owner()).and_then(|owner| owner.parent_scope.as_ref());
    }
    false
}

/// Every distinct branch scope observed under a given decision id, in the order first seen.
fn branches_of(decision_id: &NodeId, nodes: &[Node]) -> Vec<ParentScope> {
    let mut seen = Vec::new();
    for node in nodes {
        if let Some(scope) = &node.parent_scope {
            if scope.owner() == decision_id && !seen.contains(scope) {
                seen.push(scope.clone());
            }
        }
    }
    seen
}

fn outcome_label(scope: &ParentScope) -> String {
    match scope {
        ParentScope::DecisionTrue(_) => "true".to_string(),
        ParentScope::DecisionFalse(_) => "false".to_string(),
        ParentScope::DecisionCase(_, value) => format!("case:{value}"),
        ParentScope::Fork(_) | ParentScope::Loop(_) => unreachable!("not a decision branch"),
    }
}

/// `inferDecisions(structure, executedPath) -> [DecisionObservation]` (spec §8 Scenario D).
///
/// For each `Decision` node, a branch "fired" if any task node reachable inside it (directly, or
/// nested arbitrarily deep through further decisions/loops/forks) has a tool id present in
/// `executed_path`. A decision with no matching branch is omitted rather than guessed at; a
/// decision whose branches both match (only possible if `executed_path` itself is inconsistent
/// with a single run) reports every matching branch, in branch-discovery order.
pub fn infer_decisions(structure: &StaticStructure, executed_path: &[String]) -> Vec<DecisionObservation> {
    let by_id: HashMap<&NodeId, &Node> = structure.nodes.iter().map(|n| (&n.id, n)).collect();

    let mut observations = Vec::new();
    for node in &structure.nodes {
        let NodeKind::Decision { condition } = &node.kind else { continue };
        for branch in branches_of(&node.id, &structure.nodes) {
            let fired = structure.nodes.iter().any(|candidate| {
                match candidate.tool_id() {
                    Some(tool) => executed_path.iter().any(|p| p == tool) && scope_contains(candidate, &branch, &by_id),
                    None => false,
                }
            });
            if fired {
                observations.push(DecisionObservation {
                    node_id: node.id.to_string(),
                    outcome: outcome_label(&branch),
                    condition: condition.clone(),
                });
            }
        }
    }
    observations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;

    #[test]
    fn branch_inference_picks_the_true_outcome_when_its_task_executed() {
        let structure = analyze(
            r#"
            if (file.exists) {
                await mcp.filesystem.read_file({ path: args.path });
            } else {
                await mcp.filesystem.create_file({ path: args.path });
            }
            "#,
        );
        let observations = infer_decisions(&structure, &["filesystem.read_file".to_string()]);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].outcome, "true");
        assert_eq!(observations[0].condition, "file.exists");
    }

    #[test]
    fn branch_inference_picks_the_false_outcome_when_its_task_executed() {
        let structure = analyze(
            r#"
            if (file.exists) {
                await mcp.filesystem.read_file({ path: args.path });
            } else {
                await mcp.filesystem.create_file({ path: args.path });
            }
            "#,
        );
        let observations = infer_decisions(&structure, &["filesystem.create_file".to_string()]);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].outcome, "false");
    }

    #[test]
    fn no_branch_evidence_yields_no_observation() {
        let structure = analyze(
            r#"
            if (file.exists) {
                await mcp.filesystem.read_file({ path: args.path });
            } else {
                await mcp.filesystem.create_file({ path: args.path });
            }
            "#,
        );
        let observations = infer_decisions(&structure, &["unrelated.tool".to_string()]);
        assert!(observations.is_empty());
    }

    #[test]
    fn switch_case_branches_report_their_case_label() {
        let structure = analyze(
            r#"
            switch (args.kind) {
                case "a":
                    await mcp.handlers.handleA({ id: args.id });
                    break;
                case "b":
                    await mcp.handlers.handleB({ id: args.id });
                    break;
            }
            "#,
        );
        let observations = infer_decisions(&structure, &["handlers.handleB".to_string()]);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].outcome, "case:\"b\"");
    }
}
