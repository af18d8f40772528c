//! The dependency API (spec §4.5): `addDependency`/`updateDependency`/`removeDependency` and the
//! read queries, all mediated through `CapabilityPersistence` so the graph crate stays
//! database-agnostic.

use crate::reliability::TransitiveReliability;
use capability_core::capability::{CapabilityDependency, CapabilityId, DependencyEdgeSource, DependencyEdgeType};
use capability_core::clock::Clock;
use capability_core::error::{CoreError, Result, Warning};
use capability_core::events::CapabilityEvent;
use capability_core::traits::{CapabilityPersistence, DependencyDirection, EventBus};
use std::sync::Arc;
use tracing::warn;

/// Typed, evidence-weighted edges between capabilities, plus the transitive-reliability
/// calculation that rides on top of them (spec §4.5).
pub struct DependencyGraph {
    persistence: Arc<dyn CapabilityPersistence>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    reliability: TransitiveReliability,
}

impl DependencyGraph {
    pub fn new(
        persistence: Arc<dyn CapabilityPersistence>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        reliability: TransitiveReliability,
    ) -> Self {
        Self {
            persistence,
            events,
            clock,
            reliability,
        }
    }

    pub fn reliability(&self) -> &TransitiveReliability {
        &self.reliability
    }

    /// `addDependency(from, to, edgeType, edgeSource=inferred)` (spec §4.5).
    ///
    /// UPSERTs on `(from, to)`: an existing edge is observed again (incrementing
    /// `observedCount`, promoting `inferred -> observed` once the threshold is reached); a
    /// missing edge is created fresh at `edgeSource`'s initial confidence. `contains` edges are
    /// checked for a reverse `contains` edge first and a warning is logged (not rejected) if one
    /// exists (spec §7 `CycleWarning`).
    pub async fn add_dependency(
        &self,
        from: CapabilityId,
        to: CapabilityId,
        edge_type: DependencyEdgeType,
        edge_source: DependencyEdgeSource,
    ) -> Result<(CapabilityDependency, Option<Warning>)> {
        if from == to {
            return Err(CoreError::InvalidDependency {
                from: from.to_string(),
                to: to.to_string(),
                edge_type: format!("{edge_type:?}"),
                reason: "a capability cannot depend on itself".to_string(),
            });
        }

        let mut cycle_warning = None;
        if edge_type == DependencyEdgeType::Contains {
            if let Some(reverse) = self.persistence.get_dependency(to, from).await? {
                if reverse.edge_type == DependencyEdgeType::Contains {
                    let warning = Warning::ContainsCycle {
                        from: from.to_string(),
                        to: to.to_string(),
                    };
                    warn!(%from, %to, "reverse contains edge already exists; inserting anyway");
                    cycle_warning = Some(warning);
                }
            }
        }

        let now = self.clock.now();
        let dependency = match self.persistence.get_dependency(from, to).await? {
            Some(mut existing) => {
                existing.observe(now);
                existing
            }
            None => CapabilityDependency::new(from, to, edge_type, edge_source, now),
        };
        let saved = self.persistence.upsert_dependency(dependency).await?;
        self.reliability.invalidate_all();
        self.events
            .publish(CapabilityEvent::DependencyCreated {
                from,
                to,
                edge_type: saved.edge_type,
            })
            .await;
        Ok((saved, cycle_warning))
    }

    /// `updateDependency(from, to, increment=1)` (spec §4.5): the same promotion/recomputation
    /// as `addDependency`, applied `increment` times, without creating a new edge if none exists.
    pub async fn update_dependency(
        &self,
        from: CapabilityId,
        to: CapabilityId,
        increment: u32,
    ) -> Result<CapabilityDependency> {
        let Some(mut dependency) = self.persistence.get_dependency(from, to).await? else {
            return Err(CoreError::InvalidDependency {
                from: from.to_string(),
                to: to.to_string(),
                edge_type: "unknown".to_string(),
                reason: "no existing dependency to update".to_string(),
            });
        };
        let now = self.clock.now();
        for _ in 0..increment.max(1) {
            dependency.observe(now);
        }
        let saved = self.persistence.upsert_dependency(dependency).await?;
        self.reliability.invalidate_all();
        Ok(saved)
    }

    pub async fn remove_dependency(&self, from: CapabilityId, to: CapabilityId) -> Result<()> {
        self.persistence.remove_dependency(from, to).await?;
        self.reliability.invalidate_all();
        self.events
            .publish(CapabilityEvent::DependencyRemoved { from, to })
            .await;
        Ok(())
    }

    pub async fn get_dependencies(
        &self,
        capability_id: CapabilityId,
        direction: DependencyDirection,
    ) -> Result<Vec<CapabilityDependency>> {
        self.persistence.get_dependencies(capability_id, direction).await
    }

    pub async fn get_all_dependencies(&self, min_confidence: f64) -> Result<Vec<CapabilityDependency>> {
        self.persistence.get_all_dependencies(min_confidence).await
    }

    pub async fn get_outgoing_dependency_ids(
        &self,
        capability_id: CapabilityId,
        limit: usize,
        edge_type: DependencyEdgeType,
    ) -> Result<Vec<CapabilityId>> {
        self.persistence
            .get_outgoing_dependency_ids(capability_id, limit, edge_type)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capability_core::capability::Capability;
    use capability_core::clock::FixedClock;
    use capability_core::events::NullEventBus;
    use capability_core::traits::{ContextMatch, IntentMatch};
    use chrono::Utc;
    use dashmap::DashMap;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakePersistence {
        deps: Mutex<DashMap<(CapabilityId, CapabilityId), CapabilityDependency>>,
    }

    #[async_trait]
    impl CapabilityPersistence for FakePersistence {
        async fn insert_capability(&self, capability: Capability) -> Result<Capability> {
            Ok(capability)
        }
        async fn update_capability(&self, capability: Capability) -> Result<Capability> {
            Ok(capability)
        }
        async fn find_by_code_hash(&self, _hash: &str) -> Result<Option<Capability>> {
            Ok(None)
        }
        async fn find_by_id(&self, _id: CapabilityId) -> Result<Option<Capability>> {
            Ok(None)
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
            self.deps.lock().insert((dependency.from, dependency.to), dependency.clone());
            Ok(dependency)
        }
        async fn get_dependency(&self, from: CapabilityId, to: CapabilityId) -> Result<Option<CapabilityDependency>> {
            Ok(self.deps.lock().get(&(from, to)).map(|e| e.clone()))
        }
        async fn remove_dependency(&self, from: CapabilityId, to: CapabilityId) -> Result<()> {
            self.deps.lock().remove(&(from, to));
            Ok(())
        }
        async fn get_dependencies(&self, _id: CapabilityId, _d: DependencyDirection) -> Result<Vec<CapabilityDependency>> {
            Ok(self.deps.lock().iter().map(|e| e.value().clone()).collect())
        }
        async fn get_all_dependencies(&self, _min: f64) -> Result<Vec<CapabilityDependency>> {
            Ok(self.deps.lock().iter().map(|e| e.value().clone()).collect())
        }
        async fn get_outgoing_dependency_ids(
            &self,
            _id: CapabilityId,
            _limit: usize,
            _edge_type: DependencyEdgeType,
        ) -> Result<Vec<CapabilityId>> {
            Ok(vec![])
        }
        async fn tool_input_schema(&self, _tool_id: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
        async fn tool_output_schema(&self, _tool_id: &str) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
    }

    fn graph() -> DependencyGraph {
        let persistence: Arc<dyn CapabilityPersistence> = Arc::new(FakePersistence::default());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let reliability = TransitiveReliability::new(persistence.clone(), clock.clone(), 60);
        DependencyGraph::new(persistence, Arc::new(NullEventBus), clock, reliability)
    }

    #[tokio::test]
    async fn add_dependency_creates_then_promotes_on_repeated_observation() {
        let graph = graph();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        let (dep, warning) = graph
            .add_dependency(from, to, DependencyEdgeType::Dependency, DependencyEdgeSource::Inferred)
            .await
            .unwrap();
        assert_eq!(dep.observed_count, 1);
        assert!(warning.is_none());

        graph
            .add_dependency(from, to, DependencyEdgeType::Dependency, DependencyEdgeSource::Inferred)
            .await
            .unwrap();
        let (dep, _) = graph
            .add_dependency(from, to, DependencyEdgeType::Dependency, DependencyEdgeSource::Inferred)
            .await
            .unwrap();
        assert_eq!(dep.observed_count, 3);
        assert_eq!(dep.edge_source, DependencyEdgeSource::Observed);
    }

    #[tokio::test]
    async fn reverse_contains_edge_warns_but_still_inserts() {
        let graph = graph();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        graph
            .add_dependency(a, b, DependencyEdgeType::Contains, DependencyEdgeSource::Inferred)
            .await
            .unwrap();
        let (_dep, warning) = graph
            .add_dependency(b, a, DependencyEdgeType::Contains, DependencyEdgeSource::Inferred)
            .await
            .unwrap();
        assert!(matches!(warning, Some(Warning::ContainsCycle { .. })));
        assert!(graph.get_dependency_for_test(b, a).await.is_some());
    }

    #[tokio::test]
    async fn self_dependency_is_rejected() {
        let graph = graph();
        let id = Uuid::new_v4();
        let result = graph
            .add_dependency(id, id, DependencyEdgeType::Dependency, DependencyEdgeSource::Inferred)
            .await;
        assert!(matches!(result, Err(CoreError::InvalidDependency { .. })));
    }

    #[tokio::test]
    async fn update_dependency_on_missing_edge_is_an_error() {
        let graph = graph();
        let result = graph.update_dependency(Uuid::new_v4(), Uuid::new_v4(), 1).await;
        assert!(result.is_err());
    }

    impl DependencyGraph {
        async fn get_dependency_for_test(&self, from: CapabilityId, to: CapabilityId) -> Option<CapabilityDependency> {
            self.persistence.get_dependency(from, to).await.unwrap()
        }
    }
}
