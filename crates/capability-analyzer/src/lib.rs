//! The AST Analyzer and Edge Builder (spec §4.1, §4.2): turns an observed JavaScript/TypeScript
//! snippet into a [`StaticStructure`] — a flat, order-independent graph of tasks, decisions,
//! loops, and fork/join blocks connected by typed edges. Downstream crates (`capability-transform`,
//! `capability-store`) consume this structure; nothing here knows about capabilities, hashing,
//! or persistence.

pub mod context;
pub mod decisions;
pub mod edges;
pub mod pseudo_tools;
pub mod purity;
pub mod refexpr;
pub mod visitor;
mod wrapper;

pub use decisions::infer_decisions;

use capability_core::types::StaticStructure;
use edges::ProvidesClassifier;
use tracing::warn;
use tree_sitter::{Language, Parser};

/// Which grammar to parse an observed snippet with (spec §4.1: analyzed snippets are JavaScript
/// or TypeScript). Both dialects share the statement/expression node kinds the visitor matches
/// on, so a single walker serves either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    JavaScript,
    TypeScript,
}

impl Dialect {
    fn grammar(self) -> Language {
        match self {
            Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
    }
}

/// Parses and analyzes `source` as JavaScript, using the default edge classifier (no
/// tool-schema knowledge — every data-dependency edge comes out as `Sequence`, never
/// `Provides`). Callers with a tool registry should use [`analyze_with_classifier`]; callers
/// analyzing TypeScript should use [`analyze_dialect`].
pub fn analyze(source: &str) -> StaticStructure {
    analyze_with_classifier(source, &edges::NoSchemaClassifier)
}

/// Parses and analyzes `source` as JavaScript, letting `classifier` upgrade data-dependency
/// edges into `Provides` edges with a coverage classification (spec §4.2 step 6).
pub fn analyze_with_classifier(source: &str, classifier: &dyn ProvidesClassifier) -> StaticStructure {
    analyze_dialect(source, Dialect::JavaScript, classifier)
}

/// Parses and analyzes `source` under the given dialect's grammar.
///
/// A parse failure never propagates: it is logged and an empty structure is returned (spec §7
/// `ParseFailed`), since a best-effort analyzer is more useful to a learning pipeline than one
/// that aborts the whole save on a single malformed snippet.
pub fn analyze_dialect(source: &str, dialect: Dialect, classifier: &dyn ProvidesClassifier) -> StaticStructure {
    let wrapped = wrapper::wrap_for_parsing(source);

    let mut parser = Parser::new();
    if parser.set_language(&dialect.grammar()).is_err() {
        warn!(?dialect, "failed to load grammar");
        return StaticStructure::empty();
    }
    let Some(tree) = parser.parse(&wrapped, None) else {
        warn!("tree-sitter produced no parse tree");
        return StaticStructure::empty();
    };
    if tree.root_node().has_error() {
        warn!("snippet contains a syntax error; returning empty structure");
        return StaticStructure::empty();
    }
    let Some(body) = visitor::find_body_block(tree.root_node()) else {
        warn!("could not locate analyzable function body");
        return StaticStructure::empty();
    };

    let mut ctx = context::AnalysisContext::new();
    let mut nodes = Vec::new();
    visitor::walk_block(body, &wrapped, &mut ctx, &mut nodes);

    let edges = edges::build_edges(&nodes, classifier);

    StaticStructure {
        nodes,
        edges,
        variable_bindings: ctx.variable_bindings,
        literal_bindings: ctx.literal_bindings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capability_core::types::NodeKind;

    #[test]
    fn recognizes_an_mcp_task_call() {
        let structure = analyze(r#"await mcp.users.fetch({ id: args.userId });"#);
        assert_eq!(structure.nodes.len(), 1);
        match &structure.nodes[0].kind {
            NodeKind::Task { tool, arguments, .. } => {
                assert_eq!(tool, "users.fetch");
                assert!(arguments.is_some());
            }
            other => panic!("expected a task node, got {other:?}"),
        }
    }

    #[test]
    fn sequences_two_dependent_calls() {
        let structure = analyze(
            r#"
            const user = await mcp.users.fetch({ id: args.userId });
            await mcp.notifications.send({ to: user.email });
            "#,
        );
        assert_eq!(structure.nodes.len(), 2);
        assert_eq!(structure.edges.len(), 1);
    }

    #[test]
    fn independent_calls_produce_no_sequence_edge() {
        let structure = analyze(
            r#"
            await mcp.users.fetch({ id: args.userId });
            await mcp.reports.generate({ scope: "daily" });
            "#,
        );
        assert_eq!(structure.nodes.len(), 2);
        assert!(structure.edges.is_empty());
    }

    #[test]
    fn decision_branches_are_scoped_and_connected() {
        let structure = analyze(
            r#"
            if (args.isAdmin) {
                await mcp.admin.grantAccess({ userId: args.userId });
            } else {
                await mcp.audit.logDenied({ userId: args.userId });
            }
            "#,
        );
        assert_eq!(structure.nodes.len(), 3);
        let conditional_edges = structure
            .edges
            .iter()
            .filter(|e| matches!(e.kind, capability_core::types::EdgeKind::Conditional { .. }))
            .count();
        assert_eq!(conditional_edges, 2);
        // spec §3 `NodeMeta`: branch containment is control flow, not callback nesting -- a
        // task directly inside an `if`/`else` body is still top-level and executable.
        for node in &structure.nodes {
            if matches!(node.kind, NodeKind::Task { .. }) {
                assert_eq!(node.meta.nesting_level, 0);
                assert!(node.meta.executable);
            }
        }
    }

    #[test]
    fn loop_body_is_scoped_under_the_loop_node() {
        let structure = analyze(
            r#"
            for (const item of args.items) {
                await mcp.inventory.reserve({ sku: item.sku });
            }
            "#,
        );
        let loop_node = structure
            .nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Loop { .. }))
            .expect("loop node");
        let body_node = structure
            .nodes
            .iter()
            .find(|n| matches!(n.kind, NodeKind::Task { .. }))
            .expect("task node");
        assert_eq!(
            body_node.parent_scope,
            Some(capability_core::types::ParentScope::Loop(loop_node.id.clone()))
        );
        // A loop body is still executed control flow, not a callback nesting level.
        assert_eq!(body_node.meta.nesting_level, 0);
        assert!(body_node.meta.executable);
    }

    #[test]
    fn fork_branch_tasks_remain_executable() {
        let structure = analyze(
            r#"
            await Promise.all([mcp.a.x({ p: 1 }), mcp.b.y({ p: 2 })]);
            "#,
        );
        let branch_tasks: Vec<_> = structure
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Task { .. }))
            .collect();
        assert_eq!(branch_tasks.len(), 2);
        // spec §8 Scenario C: fork children are real parallel executions, not callback bodies,
        // so entering the `Fork` scope must not raise `nestingLevel`.
        for task in branch_tasks {
            assert_eq!(task.meta.nesting_level, 0);
            assert!(task.meta.executable);
        }
    }

    #[test]
    fn method_chain_callback_bodies_emit_non_executable_binary_ops() {
        // spec §8 Scenario B: three outer pseudo-tool tasks plus the intermediate binary-op
        // tasks their arrow-function callbacks contain, which are nested one callback level
        // deep and therefore non-executable.
        let structure = analyze("const r = nums.filter(x => x > 0).map(x => x * 2).sort();");

        let outer_tools: Vec<&str> = ["code:filter", "code:map", "code:sort"]
            .iter()
            .map(|expected| {
                structure
                    .nodes
                    .iter()
                    .find(|n| n.tool_id() == Some(*expected))
                    .unwrap_or_else(|| panic!("missing outer task {expected}"))
                    .tool_id()
                    .unwrap()
            })
            .collect();
        assert_eq!(outer_tools, ["code:filter", "code:map", "code:sort"]);
        for tool in &outer_tools {
            let node = structure.nodes.iter().find(|n| n.tool_id() == Some(*tool)).unwrap();
            assert_eq!(node.meta.nesting_level, 0);
            assert!(node.meta.executable);
        }

        let greater_than = structure
            .nodes
            .iter()
            .find(|n| n.tool_id() == Some("code:greaterThan"))
            .expect("callback body of filter should emit a code:greaterThan task");
        assert_eq!(greater_than.meta.nesting_level, 1);
        assert!(!greater_than.meta.executable);
        assert_eq!(greater_than.meta.parent_operation.as_deref(), Some("code:filter"));

        let multiply = structure
            .nodes
            .iter()
            .find(|n| n.tool_id() == Some("code:multiply"))
            .expect("callback body of map should emit a code:multiply task");
        assert_eq!(multiply.meta.nesting_level, 1);
        assert!(!multiply.meta.executable);
        assert_eq!(multiply.meta.parent_operation.as_deref(), Some("code:map"));

        // The chain edges connect only the three outer tasks, never the nested binary ops.
        let chain_sequence_count = structure
            .edges
            .iter()
            .filter(|e| matches!(e.kind, capability_core::types::EdgeKind::Sequence))
            .count();
        assert_eq!(chain_sequence_count, 2);
    }

    #[test]
    fn malformed_snippet_returns_empty_structure_instead_of_panicking() {
        let structure = analyze("this is not { valid javascript at all (((");
        assert!(structure.is_empty());
    }

    #[test]
    fn typescript_dialect_parses_annotated_parameters() {
        let structure = analyze_dialect(
            r#"
            const userId: string = args.userId;
            await mcp.users.fetch({ id: userId });
            "#,
            Dialect::TypeScript,
            &edges::NoSchemaClassifier,
        );
        assert_eq!(structure.nodes.len(), 1);
    }

    #[test]
    fn recognizes_a_rewritten_capability_reference_call() {
        let structure = analyze(r#"await mcp["$cap:11111111-1111-1111-1111-111111111111"]({ id: args.userId });"#);
        assert_eq!(structure.nodes.len(), 1);
        match &structure.nodes[0].kind {
            NodeKind::Task { tool, .. } => assert_eq!(tool, "$cap:11111111-1111-1111-1111-111111111111"),
            other => panic!("expected a task node, got {other:?}"),
        }
    }

    #[test]
    fn pure_array_method_chain_is_marked_pure_and_chained() {
        let structure = analyze(
            r#"
            const active = args.users.filter(u => u.active);
            "#,
        );
        let task = structure
            .nodes
            .iter()
            .find(|n| matches!(&n.kind, NodeKind::Task { tool, .. } if tool == "code:filter"))
            .expect("pseudo-tool task");
        assert_eq!(task.meta.pure, Some(true));
    }
}
