//! The static structure data model: `Node`, `Edge`, `ArgValue` and the `StaticStructure` they
//! compose into (spec §3). Nodes are addressed by a stable, monotonic presentation id (`n1`,
//! `d1`, `f1`, `l1`, ...) rather than an opaque arena index, because argument expressions
//! (`ArgValue::Reference`) embed that id as text and must compare against it directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A node's stable identity within one analyzed structure. Assigned by a per-kind counter
/// (`n1`, `n2`, ... ; `d1`, `d2`, ... ; `f1`; `l1`; ...) and never reused within that analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(kind_prefix: &str, counter: u32) -> Self {
        Self(format!("{kind_prefix}{counter}"))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Loop construct kind (spec §4.1 "Loops").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    For,
    While,
    DoWhile,
    ForOf,
    ForIn,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopKind::For => "for",
            LoopKind::While => "while",
            LoopKind::DoWhile => "doWhile",
            LoopKind::ForOf => "forOf",
            LoopKind::ForIn => "forIn",
        };
        write!(f, "{s}")
    }
}

/// Containment key for a node living inside a branch, fork block, or loop body (spec §3).
///
/// Parsed/rendered losslessly so the Edge Builder can group nodes by scope (§4.2) without
/// re-parsing the discriminant string on every comparison (spec §9 supplement).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentScope {
    DecisionTrue(NodeId),
    DecisionFalse(NodeId),
    DecisionCase(NodeId, String),
    Fork(NodeId),
    Loop(NodeId),
}

impl ParentScope {
    /// The decision/fork/loop node that owns this scope, regardless of branch.
    pub fn owner(&self) -> &NodeId {
        match self {
            ParentScope::DecisionTrue(id)
            | ParentScope::DecisionFalse(id)
            | ParentScope::DecisionCase(id, _)
            | ParentScope::Fork(id)
            | ParentScope::Loop(id) => id,
        }
    }
}

impl fmt::Display for ParentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentScope::DecisionTrue(id) => write!(f, "{id}:true"),
            ParentScope::DecisionFalse(id) => write!(f, "{id}:false"),
            ParentScope::DecisionCase(id, v) => write!(f, "{id}:case:{v}"),
            ParentScope::Fork(id) => write!(f, "{id}"),
            ParentScope::Loop(id) => write!(f, "{id}"),
        }
    }
}

/// Metadata carried by every node (spec §3 `NodeMeta`).
///
/// Invariant: `executable == (nesting_level == 0)`. Enforced by [`NodeMeta::new`] rather than
/// left to callers, since every analyzer handler constructs these the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub executable: bool,
    pub nesting_level: u32,
    pub parent_operation: Option<String>,
    pub chained_from: Option<NodeId>,
    pub pure: Option<bool>,
}

impl NodeMeta {
    pub fn new(nesting_level: u32) -> Self {
        Self {
            executable: nesting_level == 0,
            nesting_level,
            parent_operation: None,
            chained_from: None,
            pure: None,
        }
    }

    pub fn with_parent_operation(mut self, op: impl Into<String>) -> Self {
        self.parent_operation = Some(op.into());
        self
    }

    pub fn with_chained_from(mut self, id: NodeId) -> Self {
        self.chained_from = Some(id);
        self
    }

    pub fn with_pure(mut self, pure: bool) -> Self {
        self.pure = Some(pure);
        self
    }
}

/// One resolved argument value (spec §3 `ArgValue`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ArgValue {
    Literal(serde_json::Value),
    /// `expression` is a dotted string such as `n1.items[0].value` (spec §9). The leading
    /// identifier equals a node id exactly when the source variable was a tracked binding;
    /// otherwise it is an external free name.
    Reference { expression: String },
    /// Comes from the capability's own input (`args.x`, `params.x`, `input.x`).
    Parameter { name: String },
}

impl ArgValue {
    /// The leading identifier of a `Reference` expression, used by the Edge Builder's
    /// data-dependency check (spec §4.2 step 2) and the sequencing testable property (§8).
    pub fn reference_root(&self) -> Option<&str> {
        match self {
            ArgValue::Reference { expression } => {
                expression.split(['.', '[']).next().filter(|s| !s.is_empty())
            }
            _ => None,
        }
    }
}

pub type ArgMap = HashMap<String, ArgValue>;

/// A tagged node in the analyzed graph (spec §3 `Node`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    Task {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<ArgMap>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    Decision {
        condition: String,
    },
    Fork,
    Join,
    Loop {
        kind: LoopKind,
        condition: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    Capability {
        capability_id: String,
    },
}

/// One element of an analyzed snippet (spec §3 `Node`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// AST traversal order; used only for edge generation, discarded after (spec §3).
    pub position: u32,
    pub parent_scope: Option<ParentScope>,
    pub meta: NodeMeta,
}

impl Node {
    pub fn tool_id(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Task { tool, .. } => Some(tool.as_str()),
            _ => None,
        }
    }

    pub fn arguments(&self) -> Option<&ArgMap> {
        match &self.kind {
            NodeKind::Task { arguments, .. } => arguments.as_ref(),
            _ => None,
        }
    }

    pub fn is_executable(&self) -> bool {
        match &self.kind {
            NodeKind::Fork | NodeKind::Join => true,
            _ => self.meta.executable,
        }
    }
}

/// Data-flow coverage classification for a `Provides` edge (spec §4.2 step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Coverage {
    Strict,
    Partial,
    Optional,
}

/// Typed edge between two nodes in the same structure (spec §3 `Edge`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EdgeKind {
    Sequence,
    Conditional { outcome: String },
    LoopBody,
    Provides { coverage: CoverageWire },
}

/// `Coverage` mirrored with `Eq`/`Hash` for use as a serde wire enum (`Coverage` itself stays a
/// plain copy type used by the edge builder's internal scoring).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoverageWire {
    Strict,
    Partial,
    Optional,
}

impl From<Coverage> for CoverageWire {
    fn from(c: Coverage) -> Self {
        match c {
            Coverage::Strict => CoverageWire::Strict,
            Coverage::Partial => CoverageWire::Partial,
            Coverage::Optional => CoverageWire::Optional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn sequence(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Sequence,
        }
    }

    pub fn conditional(from: NodeId, to: NodeId, outcome: impl Into<String>) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Conditional {
                outcome: outcome.into(),
            },
        }
    }

    pub fn loop_body(from: NodeId, to: NodeId) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::LoopBody,
        }
    }

    pub fn provides(from: NodeId, to: NodeId, coverage: Coverage) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Provides {
                coverage: coverage.into(),
            },
        }
    }

    /// The `(from, to, type-discriminant)` triple used to deduplicate edges (spec §3 invariant).
    pub fn dedup_key(&self) -> (NodeId, NodeId, &'static str) {
        let type_tag = match &self.kind {
            EdgeKind::Sequence => "sequence",
            EdgeKind::Conditional { .. } => "conditional",
            EdgeKind::LoopBody => "loopBody",
            EdgeKind::Provides { .. } => "provides",
        };
        (self.from.clone(), self.to.clone(), type_tag)
    }
}

/// The full output of the AST Analyzer (spec §3 `StaticStructure`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticStructure {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub variable_bindings: HashMap<String, NodeId>,
    pub literal_bindings: HashMap<String, serde_json::Value>,
}

impl StaticStructure {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Inserts an edge unless its `(from, to, type)` triple is already present, per the
    /// dedup invariant in spec §3.
    pub fn push_edge_deduped(&mut self, edge: Edge) {
        let key = edge.dedup_key();
        if !self.edges.iter().any(|e| e.dedup_key() == key) {
            self.edges.push(edge);
        }
    }
}
