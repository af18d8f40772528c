//! Mutable state threaded through one analysis pass (spec §4.1): node id allocation, the
//! containment stack used to stamp `parent_scope`/`nesting_level`, and the variable/literal
//! binding tables the argument resolver consults.

use capability_core::types::{NodeId, ParentScope};
use std::collections::HashMap;

/// Per-kind monotonic counters behind the stable node ids (spec §3: "`n1`, `n2`, ...; `d1`,
/// `d2`, ...").
#[derive(Debug, Default)]
struct IdAllocator {
    counters: HashMap<&'static str, u32>,
}

impl IdAllocator {
    fn next(&mut self, prefix: &'static str) -> NodeId {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        NodeId::new(prefix, *counter)
    }
}

pub struct AnalysisContext {
    ids: IdAllocator,
    position: u32,
    scope_stack: Vec<ParentScope>,
    /// Depth of callback-body nesting (spec §3: `executable = (nestingLevel == 0)`, scoped to
    /// exactly "tasks inside a callback body of an array operation"). Deliberately independent
    /// of `scope_stack`: a branch/fork/loop body is still top-level, executable control flow,
    /// not a callback body, so entering one must never raise this.
    callback_depth: u32,
    /// Nearest enclosing task's tool id, used for `NodeMeta::parent_operation` (spec §3).
    parent_operation_stack: Vec<String>,
    pub variable_bindings: HashMap<String, NodeId>,
    pub literal_bindings: HashMap<String, serde_json::Value>,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::default(),
            position: 0,
            scope_stack: Vec::new(),
            callback_depth: 0,
            parent_operation_stack: Vec::new(),
            variable_bindings: HashMap::new(),
            literal_bindings: HashMap::new(),
        }
    }

    pub fn next_task_id(&mut self) -> NodeId {
        self.ids.next("n")
    }

    pub fn next_decision_id(&mut self) -> NodeId {
        self.ids.next("d")
    }

    pub fn next_fork_id(&mut self) -> NodeId {
        self.ids.next("f")
    }

    pub fn next_join_id(&mut self) -> NodeId {
        self.ids.next("j")
    }

    pub fn next_loop_id(&mut self) -> NodeId {
        self.ids.next("l")
    }

    pub fn next_position(&mut self) -> u32 {
        let p = self.position;
        self.position += 1;
        p
    }

    pub fn nesting_level(&self) -> u32 {
        self.callback_depth
    }

    /// Enters a pseudo-tool callback body (spec §4.1 "tasks inside a callback body of an array
    /// operation"); every task pushed until the matching [`exit_callback`](Self::exit_callback)
    /// is non-executable at one level deeper.
    pub fn enter_callback(&mut self) {
        self.callback_depth += 1;
    }

    pub fn exit_callback(&mut self) {
        self.callback_depth -= 1;
    }

    pub fn current_scope(&self) -> Option<ParentScope> {
        self.scope_stack.last().cloned()
    }

    pub fn push_scope(&mut self, scope: ParentScope) {
        self.scope_stack.push(scope);
    }

    pub fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    pub fn current_parent_operation(&self) -> Option<String> {
        self.parent_operation_stack.last().cloned()
    }

    pub fn push_parent_operation(&mut self, op: String) {
        self.parent_operation_stack.push(op);
    }

    pub fn pop_parent_operation(&mut self) {
        self.parent_operation_stack.pop();
    }
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self::new()
    }
}
