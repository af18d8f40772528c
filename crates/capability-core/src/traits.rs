//! Trait seams for the four external collaborators spec §6 names: persistence, the embedding
//! model, the event bus, and (SPEC_FULL.md §3) a capability-reference resolver. The core only
//! ever depends on these traits, never on a concrete database, model, or bus.

use crate::capability::{Capability, CapabilityDependency, CapabilityId, DependencyEdgeType};
use crate::error::Result;
use crate::events::CapabilityEvent;
use crate::trace::ExecutionTrace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A capability ranked by vector similarity to an intent (spec §4.4 `searchByIntent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMatch {
    pub capability: Capability,
    pub semantic_score: f64,
}

/// A capability ranked by tool-overlap with a context (spec §4.4 `searchByContext`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMatch {
    pub capability: Capability,
    pub overlap: f64,
}

/// Which side of a dependency edge to query by (spec §4.5 `getDependencies`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyDirection {
    From,
    To,
    Both,
}

/// The capability store's persistence contract (spec §4.4, §6).
///
/// spec §6 describes a lower-level `query(sql, params)` / `queryOne(...)` interface with a
/// concrete relational schema (`workflow_pattern`, `capability_dependency`, `tool_schema`). That
/// schema is the reference shape a concrete adapter persists into (documented in DESIGN.md); the
/// core itself is kept database-agnostic by depending only on the capability-level operations
/// below, consistent with spec §1's non-goal of choosing a database engine.
#[async_trait]
pub trait CapabilityPersistence: Send + Sync {
    /// Insert a brand-new capability, returning its assigned id.
    async fn insert_capability(&self, capability: Capability) -> Result<Capability>;

    /// UPSERT-on-conflict update for an existing capability found by hash (spec §4.4 step 7):
    /// the caller has already recomputed `usage_count`/`success_count`/`success_rate`/
    /// `avg_duration_ms`/`last_used` and regenerated the parameter schema and static structure;
    /// this just persists the new row state.
    async fn update_capability(&self, capability: Capability) -> Result<Capability>;

    async fn find_by_code_hash(&self, hash: &str) -> Result<Option<Capability>>;
    async fn find_by_id(&self, id: CapabilityId) -> Result<Option<Capability>>;

    async fn search_by_intent(
        &self,
        embedding: &[f32],
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<IntentMatch>>;

    async fn search_by_context(
        &self,
        tool_ids: &[String],
        overlap_threshold: f64,
    ) -> Result<Vec<ContextMatch>>;

    async fn save_trace(&self, trace: ExecutionTrace) -> Result<()>;

    // --- Dependency graph (spec §4.5) ---

    async fn upsert_dependency(&self, dependency: CapabilityDependency) -> Result<CapabilityDependency>;
    async fn get_dependency(
        &self,
        from: CapabilityId,
        to: CapabilityId,
    ) -> Result<Option<CapabilityDependency>>;
    async fn remove_dependency(&self, from: CapabilityId, to: CapabilityId) -> Result<()>;
    async fn get_dependencies(
        &self,
        capability_id: CapabilityId,
        direction: DependencyDirection,
    ) -> Result<Vec<CapabilityDependency>>;
    async fn get_all_dependencies(&self, min_confidence: f64) -> Result<Vec<CapabilityDependency>>;
    async fn get_outgoing_dependency_ids(
        &self,
        capability_id: CapabilityId,
        limit: usize,
        edge_type: DependencyEdgeType,
    ) -> Result<Vec<CapabilityId>>;

    // --- Tool schema lookup (spec §4.2 `Provides` edges, §4.3 capability-reference resolution) ---

    async fn tool_input_schema(&self, tool_id: &str) -> Result<Option<serde_json::Value>>;
    async fn tool_output_schema(&self, tool_id: &str) -> Result<Option<serde_json::Value>>;
}

/// The embedding interface (spec §6): `encode(text) -> vector<f32; D>`, deterministic from the
/// core's perspective, with failure surfaced as a hard error (spec §7 `EmbeddingError`).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

/// Fire-and-forget event sink (spec §6, §9: "do not await its sink").
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: CapabilityEvent);
}

/// Resolves an action name against the capability registry for a given scope, used by the Code
/// Transformer's capability-reference rewrite (spec §4.3). Returning `Ok(None)` means "this is a
/// genuine remote tool, not a capability" and the reference is left untouched; an `Err` means the
/// lookup itself failed and the save must fail (spec §7 `TransformResolutionError`).
#[async_trait]
pub trait CapabilityResolver: Send + Sync {
    async fn resolve(&self, org: &str, project: &str, action: &str) -> Result<Option<CapabilityId>>;
}
