//! Runtime execution traces bound to a capability (spec §3 `ExecutionTrace`).

use crate::capability::CapabilityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One decision outcome observed while executing a capability, used to infer which branch of a
/// `Decision` node actually ran (spec §8 Scenario D, `inferDecisions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionObservation {
    pub node_id: String,
    pub outcome: String,
    pub condition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub tool: String,
    pub success: bool,
    pub output: Option<serde_json::Value>,
}

/// Runtime record bound to a capability (spec §3 `ExecutionTrace`).
///
/// Invariant: sanitized *before* persistence — [`ExecutionTrace::sanitize`] must run prior to
/// any store write so no oversized or secret-like value escapes the trace boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub id: Uuid,
    pub capability_id: CapabilityId,
    pub intent_text: String,
    pub intent_embedding: Vec<f32>,
    pub initial_context: HashMap<String, serde_json::Value>,
    pub executed_path: Vec<String>,
    pub decisions: Vec<DecisionObservation>,
    pub task_results: Vec<TaskResult>,
    pub success: bool,
    pub duration_ms: f64,
    pub priority: f64,
    pub parent_trace_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Default priority when a trace doesn't specify one (spec §3: "`priority ∈ [0,1]` (default
/// 0.5)").
pub const DEFAULT_TRACE_PRIORITY: f64 = 0.5;

/// Values longer than this are treated as oversized and redacted during sanitization.
const MAX_SANITIZED_VALUE_LEN: usize = 4096;

/// Case-insensitive substrings whose presence in a context key flags the value as secret-like.
const SECRET_LIKE_KEY_MARKERS: &[&str] = &[
    "secret", "password", "token", "api_key", "apikey", "auth", "credential", "private_key",
];

impl ExecutionTrace {
    /// Clamps `priority` into `[0,1]`, truncates oversized string values in `initial_context`,
    /// and redacts values under secret-like keys. Must run before the trace reaches any
    /// persistence call (spec §3 invariant).
    pub fn sanitize(&mut self) {
        self.priority = self.priority.clamp(0.0, 1.0);
        for (key, value) in self.initial_context.iter_mut() {
            let looks_secret = SECRET_LIKE_KEY_MARKERS
                .iter()
                .any(|marker| key.to_lowercase().contains(marker));
            if looks_secret {
                *value = serde_json::Value::String("[redacted]".to_string());
                continue;
            }
            if let serde_json::Value::String(s) = value {
                if s.len() > MAX_SANITIZED_VALUE_LEN {
                    s.truncate(MAX_SANITIZED_VALUE_LEN);
                    s.push_str("...[truncated]");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_with(context: HashMap<String, serde_json::Value>, priority: f64) -> ExecutionTrace {
        ExecutionTrace {
            id: Uuid::new_v4(),
            capability_id: Uuid::new_v4(),
            intent_text: "do a thing".into(),
            intent_embedding: vec![],
            initial_context: context,
            executed_path: vec![],
            decisions: vec![],
            task_results: vec![],
            success: true,
            duration_ms: 10.0,
            priority,
            parent_trace_id: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn sanitize_redacts_secret_like_keys_and_clamps_priority() {
        let mut ctx = HashMap::new();
        ctx.insert(
            "auth_token".to_string(),
            serde_json::Value::String("sk-abc123".into()),
        );
        let mut trace = trace_with(ctx, 5.0);
        trace.sanitize();
        assert_eq!(trace.priority, 1.0);
        assert_eq!(
            trace.initial_context.get("auth_token"),
            Some(&serde_json::Value::String("[redacted]".into()))
        );
    }

    #[test]
    fn sanitize_truncates_oversized_values() {
        let mut ctx = HashMap::new();
        ctx.insert(
            "payload".to_string(),
            serde_json::Value::String("x".repeat(MAX_SANITIZED_VALUE_LEN + 100)),
        );
        let mut trace = trace_with(ctx, 0.5);
        trace.sanitize();
        let serde_json::Value::String(s) = trace.initial_context.get("payload").unwrap() else {
            panic!("expected string")
        };
        assert!(s.len() < MAX_SANITIZED_VALUE_LEN + 100);
        assert!(s.ends_with("...[truncated]"));
    }
}
