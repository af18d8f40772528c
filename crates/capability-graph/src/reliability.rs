//! Transitive reliability (spec §4.5, §8): "the minimum success-rate along a capability's
//! `dependency` chain; the chain is as strong as its weakest link." Cached with a 60-second TTL,
//! invalidated on any dependency write (spec §5, §9).

use capability_cache::TtlCache;
use capability_core::capability::{CapabilityId, DependencyEdgeType};
use capability_core::clock::Clock;
use capability_core::error::Result;
use capability_core::traits::CapabilityPersistence;
use std::collections::HashSet;
use std::sync::Arc;

/// How many outgoing `dependency` edges to consider per capability when walking the chain. The
/// spec names no bound, but an unbounded fan-out read is a foot-gun against a real persistence
/// backend; this mirrors the matcher's own `top_k`-style defaults (spec §4.5) rather than
/// inventing a new knob.
const MAX_CHAIN_FANOUT: usize = 64;

pub struct TransitiveReliability {
    persistence: Arc<dyn CapabilityPersistence>,
    cache: TtlCache<CapabilityId, f64>,
}

impl TransitiveReliability {
    pub fn new(persistence: Arc<dyn CapabilityPersistence>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            persistence,
            cache: TtlCache::new(ttl_secs, clock),
        }
    }

    /// `transitiveReliability(A) = min(1.0, A.successRate, transitiveReliability(B) for each B
    /// in outgoing deps of type=dependency)`. A capability with no outgoing `dependency` edges
    /// returns `1.0` (spec §3 Glossary, §8 "Transitive-reliability monotonicity").
    pub async fn compute(&self, capability_id: CapabilityId) -> Result<f64> {
        let mut visited = HashSet::new();
        self.compute_inner(capability_id, &mut visited).await
    }

    fn compute_inner<'a>(
        &'a self,
        capability_id: CapabilityId,
        visited: &'a mut HashSet<CapabilityId>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<f64>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(cached) = self.cache.get(&capability_id) {
                return Ok(cached);
            }
            // A dependency cycle (spec §9 only warns about `contains` cycles, but a `dependency`
            // cycle is structurally possible) is treated as fully reliable for the recursing
            // branch rather than infinitely recursing: the cycle contributes no information
            // beyond what the non-cyclic edges already impose.
            if !visited.insert(capability_id) {
                return Ok(1.0);
            }

            let Some(capability) = self.persistence.find_by_id(capability_id).await? else {
                return Ok(1.0);
            };
            let dependency_ids = self
                .persistence
                .get_outgoing_dependency_ids(capability_id, MAX_CHAIN_FANOUT, DependencyEdgeType::Dependency)
                .await?;

            let mut reliability = capability.success_rate;
            for dep_id in dependency_ids {
                let child = self.compute_inner(dep_id, visited).await?;
                reliability = reliability.min(child);
            }
            let reliability = reliability.min(1.0);
            self.cache.insert(capability_id, reliability);
            Ok(reliability)
        })
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn invalidate(&self, capability_id: &CapabilityId) {
        self.cache.invalidate(capability_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capability_core::capability::{Capability, CapabilityDependency, DependencyEdgeSource, RiskCategory};
    use capability_core::clock::FixedClock;
    use capability_core::traits::{ContextMatch, DependencyDirection, IntentMatch};
    use capability_core::types::StaticStructure;
    use chrono::Utc;
    use dashmap::DashMap;
    use uuid::Uuid;

    struct FakeStore {
        capabilities: DashMap<CapabilityId, Capability>,
        outgoing: DashMap<CapabilityId, Vec<CapabilityId>>,
    }

    fn capability_with_rate(rate: f64) -> Capability {
        Capability {
            id: Uuid::new_v4(),
            code_snippet: String::new(),
            code_hash: "0".repeat(64),
            intent_embedding: vec![],
            parameters_schema: serde_json::json!({}),
            static_structure: StaticStructure::empty(),
            usage_count: 10,
            success_count: (10.0 * rate) as u64,
            success_rate: rate,
            avg_duration_ms: 0.0,
            created_at: Utc::now(),
            last_used: Utc::now(),
            hierarchy_level: 0,
            risk_category: RiskCategory::Safe,
        }
    }

    #[async_trait]
    impl CapabilityPersistence for FakeStore {
        async fn insert_capability(&self, capability: Capability) -> Result<Capability> {
            Ok(capability)
        }
        async fn update_capability(&self, capability: Capability) -> Result<Capability> {
            Ok(capability)
        }
        async fn find_by_code_hash(&self, _hash: &str) -> Result<Option<Capability>> {
            Ok(None)
        }
        async fn find_by_id(&self, id: CapabilityId) -> Result<Option<Capability>> {
            Ok(self.capabilities.get(&id).map(|e| e.clone()))
        }
        async fn search_by_intent(&self, _e: &[f32], _m: f64, _l: usize) -> Result<Vec<IntentMatch>> {
            Ok(vec![])
        }
        async fn search_by_context(&self, _t: &[String], _o: f64) -> Result<Vec<ContextMatch>> {
            Ok(vec![])
        }
        async fn save_trace(&self, _trace: capability_core::trace::ExecutionTrace) -> Result<()> {
            Ok(())
        }
        async fn upsert_dependency(&self, dependency: CapabilityDependency) -> Result<CapabilityDependency> {
            Ok(dependency)
        }
        async fn get_dependency(&self, _from: CapabilityId, _to: CapabilityId) -> Result<Option<CapabilityDependency>> {
            Ok(None)
        }
        async fn remove_dependency(&self, _from: CapabilityId, _to: CapabilityId) -> Result<()> {
            Ok(())
        }
        async fn get_dependencies(&self, _id: CapabilityId, _d: DependencyDirection) -> Result<Vec<CapabilityDependency>> {
            Ok(vec![])
        }
        async fn get_all_dependencies(&self, _min: f64) -> Result<Vec<CapabilityDependency>> {
            Ok(vec![])
        }
        async fn get_outgoing_dependency_ids(
            &self,
            id: CapabilityId,
            _limit: usize,
            edge_type: DependencyEdgeType,
        ) -> Result<Vec<CapabilityId>> {
            if edge_type != DependencyEdgeType::Dependency {
                return Ok(vec![]);
            }
            Ok(self.outgoing.get(&id).map(|e| e.clone()).unwrap_or_default())
        }
        async fn tool_input_schema(&self, _tool_id: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn tool_output_schema(&self, _tool_id: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn leaf_capability_reliability_equals_its_own_success_rate() {
        let store = FakeStore {
            capabilities: DashMap::new(),
            outgoing: DashMap::new(),
        };
        let leaf = capability_with_rate(0.8);
        let leaf_id = leaf.id;
        store.capabilities.insert(leaf_id, leaf);
        let persistence: Arc<dyn CapabilityPersistence> = Arc::new(store);
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let reliability = TransitiveReliability::new(persistence, clock, 60);
        let score = reliability.compute(leaf_id).await.unwrap();
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reliability_is_the_min_across_the_dependency_chain() {
        let store = FakeStore {
            capabilities: DashMap::new(),
            outgoing: DashMap::new(),
        };
        let weak_link = capability_with_rate(0.4);
        let weak_id = weak_link.id;
        let strong = capability_with_rate(0.95);
        let strong_id = strong.id;
        let root = capability_with_rate(0.9);
        let root_id = root.id;
        store.capabilities.insert(weak_id, weak_link);
        store.capabilities.insert(strong_id, strong);
        store.capabilities.insert(root_id, root);
        store.outgoing.insert(root_id, vec![weak_id, strong_id]);

        let persistence: Arc<dyn CapabilityPersistence> = Arc::new(store);
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let reliability = TransitiveReliability::new(persistence, clock, 60);
        let score = reliability.compute(root_id).await.unwrap();
        assert!((score - 0.4).abs() < 1e-9);
        assert!(score <= 0.9);
    }

    #[tokio::test]
    async fn cache_serves_repeated_reads_without_recomputing() {
        let store = FakeStore {
            capabilities: DashMap::new(),
            outgoing: DashMap::new(),
        };
        let leaf = capability_with_rate(0.7);
        let leaf_id = leaf.id;
        store.capabilities.insert(leaf_id, leaf);
        let persistence: Arc<dyn CapabilityPersistence> = Arc::new(store);
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let reliability = TransitiveReliability::new(persistence, clock, 60);
        reliability.compute(leaf_id).await.unwrap();
        assert_eq!(reliability.cache.len(), 1);
        reliability.invalidate_all();
        assert!(reliability.cache.is_empty());
    }
}
