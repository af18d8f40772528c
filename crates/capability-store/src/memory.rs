//! An in-memory `CapabilityPersistence` + `CapabilityResolver` (SPEC_FULL.md §0: "a reference
//! in-process store, since the database engine is a non-goal"). Good enough to exercise the
//! full save/search/dependency pipeline without a real database, and used by `capability-cli`.

use async_trait::async_trait;
use capability_core::capability::{Capability, CapabilityDependency, CapabilityId, DependencyEdgeType};
use capability_core::error::{CoreError, Result};
use capability_core::trace::ExecutionTrace;
use capability_core::traits::{CapabilityPersistence, CapabilityResolver, ContextMatch, DependencyDirection, IntentMatch};
use capability_vector::cosine_similarity;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

/// The `(org, project, name)` registry key the capability-reference resolver looks up against
/// (SPEC_FULL.md §3: spec.md names capability-reference resolution but not how a capability is
/// registered under a name within a scope; `name` is a registry key only, never persisted on
/// [`Capability`] itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityRegistration {
    pub org: String,
    pub project: String,
    pub name: String,
}

/// Holds every capability, its dependency edges, tool schemas, and the name registry, all keyed
/// in-process. `RwLock` around the registry (rare writes, frequent reads from the transformer)
/// mirrors the concurrency shape spec §5 describes: concurrent saves serialize only on the
/// `codeHash` UPSERT key, everything else proceeds in parallel.
#[derive(Default)]
pub struct InMemoryStore {
    capabilities: DashMap<CapabilityId, Capability>,
    by_code_hash: DashMap<String, CapabilityId>,
    dependencies: DashMap<(CapabilityId, CapabilityId), CapabilityDependency>,
    traces: DashMap<uuid::Uuid, ExecutionTrace>,
    tool_input_schemas: DashMap<String, serde_json::Value>,
    tool_output_schemas: DashMap<String, serde_json::Value>,
    registry: RwLock<HashMap<CapabilityRegistration, CapabilityId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `capability_id` under `(org, project, name)` so a later capability-reference
    /// rewrite for that scope resolves `mcp.<ns>.<action>` (action == name) against it.
    pub fn register(&self, org: impl Into<String>, project: impl Into<String>, name: impl Into<String>, capability_id: CapabilityId) {
        self.registry.write().insert(
            CapabilityRegistration {
                org: org.into(),
                project: project.into(),
                name: name.into(),
            },
            capability_id,
        );
    }

    pub fn set_tool_input_schema(&self, tool_id: impl Into<String>, schema: serde_json::Value) {
        self.tool_input_schemas.insert(tool_id.into(), schema);
    }

    pub fn set_tool_output_schema(&self, tool_id: impl Into<String>, schema: serde_json::Value) {
        self.tool_output_schemas.insert(tool_id.into(), schema);
    }
}

#[async_trait]
impl CapabilityPersistence for InMemoryStore {
    async fn insert_capability(&self, capability: Capability) -> Result<Capability> {
        self.by_code_hash.insert(capability.code_hash.clone(), capability.id);
        self.capabilities.insert(capability.id, capability.clone());
        Ok(capability)
    }

    async fn update_capability(&self, capability: Capability) -> Result<Capability> {
        self.by_code_hash.insert(capability.code_hash.clone(), capability.id);
        self.capabilities.insert(capability.id, capability.clone());
        Ok(capability)
    }

    async fn find_by_code_hash(&self, hash: &str) -> Result<Option<Capability>> {
        let Some(id) = self.by_code_hash.get(hash).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.capabilities.get(&id).map(|e| e.clone()))
    }

    async fn find_by_id(&self, id: CapabilityId) -> Result<Option<Capability>> {
        Ok(self.capabilities.get(&id).map(|e| e.clone()))
    }

    async fn search_by_intent(&self, embedding: &[f32], min_score: f64, limit: usize) -> Result<Vec<IntentMatch>> {
        let mut matches: Vec<IntentMatch> = self
            .capabilities
            .iter()
            .filter_map(|entry| {
                let capability = entry.value();
                if capability.intent_embedding.is_empty() {
                    return None;
                }
                let score = cosine_similarity(embedding, &capability.intent_embedding);
                (score >= min_score).then(|| IntentMatch {
                    capability: capability.clone(),
                    semantic_score: score,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.semantic_score.partial_cmp(&a.semantic_score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn search_by_context(&self, tool_ids: &[String], overlap_threshold: f64) -> Result<Vec<ContextMatch>> {
        if tool_ids.len() > 100 || tool_ids.iter().any(|t| t.len() > 256) {
            return Err(CoreError::Configuration(
                "search_by_context input exceeds bounds (max 100 tool ids, 256 chars each)".to_string(),
            ));
        }
        let input: std::collections::HashSet<&str> = tool_ids.iter().map(|s| s.as_str()).collect();
        let mut matches: Vec<ContextMatch> = self
            .capabilities
            .iter()
            .filter_map(|entry| {
                let capability = entry.value();
                let used = capability.tools_used();
                if used.is_empty() {
                    return None;
                }
                let overlap_count = used.iter().filter(|t| input.contains(*t)).count();
                let overlap = overlap_count as f64 / used.len() as f64;
                (overlap >= overlap_threshold).then(|| ContextMatch {
                    capability: capability.clone(),
                    overlap,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.overlap
                .partial_cmp(&a.overlap)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.capability.usage_count.cmp(&a.capability.usage_count))
        });
        Ok(matches)
    }

    async fn save_trace(&self, trace: ExecutionTrace) -> Result<()> {
        self.traces.insert(trace.id, trace);
        Ok(())
    }

    async fn upsert_dependency(&self, dependency: CapabilityDependency) -> Result<CapabilityDependency> {
        self.dependencies.insert((dependency.from, dependency.to), dependency.clone());
        Ok(dependency)
    }

    async fn get_dependency(&self, from: CapabilityId, to: CapabilityId) -> Result<Option<CapabilityDependency>> {
        Ok(self.dependencies.get(&(from, to)).map(|e| e.clone()))
    }

    async fn remove_dependency(&self, from: CapabilityId, to: CapabilityId) -> Result<()> {
        self.dependencies.remove(&(from, to));
        Ok(())
    }

    async fn get_dependencies(&self, capability_id: CapabilityId, direction: DependencyDirection) -> Result<Vec<CapabilityDependency>> {
        Ok(self
            .dependencies
            .iter()
            .filter(|e| {
                let (from, to) = *e.key();
                match direction {
                    DependencyDirection::From => from == capability_id,
                    DependencyDirection::To => to == capability_id,
                    DependencyDirection::Both => from == capability_id || to == capability_id,
                }
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_all_dependencies(&self, min_confidence: f64) -> Result<Vec<CapabilityDependency>> {
        Ok(self
            .dependencies
            .iter()
            .filter(|e| e.value().confidence_score >= min_confidence)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_outgoing_dependency_ids(
        &self,
        capability_id: CapabilityId,
        limit: usize,
        edge_type: DependencyEdgeType,
    ) -> Result<Vec<CapabilityId>> {
        Ok(self
            .dependencies
            .iter()
            .filter(|e| e.key().0 == capability_id && e.value().edge_type == edge_type)
            .take(limit)
            .map(|e| e.key().1)
            .collect())
    }

    async fn tool_input_schema(&self, tool_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.tool_input_schemas.get(tool_id).map(|e| e.clone()))
    }

    async fn tool_output_schema(&self, tool_id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.tool_output_schemas.get(tool_id).map(|e| e.clone()))
    }
}

/// Resolves `mcp.<ns>.<action>` references against [`InMemoryStore`]'s name registry, treating
/// `ns` as the scope discriminant is deliberately not done here: spec §4.3 keys resolution on
/// `(org, project, action)` only, so two different namespaces with the same action name inside
/// one `(org, project)` resolve to the same capability (SPEC_FULL.md §3 Open Question).
pub struct InMemoryResolver<'a> {
    store: &'a InMemoryStore,
}

impl<'a> InMemoryResolver<'a> {
    pub fn new(store: &'a InMemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<'a> CapabilityResolver for InMemoryResolver<'a> {
    async fn resolve(&self, org: &str, project: &str, action: &str) -> Result<Option<CapabilityId>> {
        let key = CapabilityRegistration {
            org: org.to_string(),
            project: project.to_string(),
            name: action.to_string(),
        };
        Ok(self.store.registry.read().get(&key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capability_core::capability::RiskCategory;
    use capability_core::types::StaticStructure;
    use chrono::Utc;
    use uuid::Uuid;

    fn capability(code_hash: &str, embedding: Vec<f32>) -> Capability {
        Capability {
            id: Uuid::new_v4(),
            code_snippet: String::new(),
            code_hash: code_hash.to_string(),
            intent_embedding: embedding,
            parameters_schema: serde_json::json!({}),
            static_structure: StaticStructure::empty(),
            usage_count: 1,
            success_count: 1,
            success_rate: 1.0,
            avg_duration_ms: 0.0,
            created_at: Utc::now(),
            last_used: Utc::now(),
            hierarchy_level: 0,
            risk_category: RiskCategory::Safe,
        }
    }

    #[tokio::test]
    async fn find_by_code_hash_round_trips_through_insert() {
        let store = InMemoryStore::new();
        let cap = capability("abc", vec![1.0, 0.0]);
        let id = cap.id;
        store.insert_capability(cap).await.unwrap();
        let found = store.find_by_code_hash("abc").await.unwrap().expect("found");
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn search_by_intent_filters_by_min_score_and_orders_descending() {
        let store = InMemoryStore::new();
        store.insert_capability(capability("a", vec![1.0, 0.0])).await.unwrap();
        store.insert_capability(capability("b", vec![0.0, 1.0])).await.unwrap();
        let results = store.search_by_intent(&[1.0, 0.0], 0.5, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].semantic_score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn resolver_resolves_only_within_the_registered_scope() {
        let store = InMemoryStore::new();
        let cap = capability("abc", vec![]);
        let id = cap.id;
        store.insert_capability(cap).await.unwrap();
        store.register("acme", "main", "sendInvoice", id);

        let resolver = InMemoryResolver::new(&store);
        assert_eq!(resolver.resolve("acme", "main", "sendInvoice").await.unwrap(), Some(id));
        assert_eq!(resolver.resolve("acme", "other", "sendInvoice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_by_context_rejects_oversized_input() {
        let store = InMemoryStore::new();
        let too_many: Vec<String> = (0..101).map(|i| format!("tool{i}")).collect();
        let result = store.search_by_context(&too_many, 0.3).await;
        assert!(result.is_err());
    }
}
