//! Intent matching (spec §4.5 "Matcher scoring"): ranks semantic-similarity candidates by a
//! reliability-adjusted score and returns the best accepted match, if any.

use crate::reliability::TransitiveReliability;
use capability_core::capability::Capability;
use capability_core::config::MatcherConfig;
use capability_core::error::Result;
use capability_core::events::CapabilityEvent;
use capability_core::traits::{CapabilityPersistence, EmbeddingProvider, EventBus};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Accepted,
    FilteredByReliability,
    RejectedByThreshold,
}

impl MatchDecision {
    fn as_str(self) -> &'static str {
        match self {
            MatchDecision::Accepted => "accepted",
            MatchDecision::FilteredByReliability => "filtered_by_reliability",
            MatchDecision::RejectedByThreshold => "rejected_by_threshold",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub capability: Capability,
    pub semantic_score: f64,
    pub reliability_factor: f64,
    pub score: f64,
    pub decision: MatchDecision,
}

pub struct Matcher {
    persistence: Arc<dyn CapabilityPersistence>,
    embeddings: Arc<dyn EmbeddingProvider>,
    reliability: Arc<TransitiveReliability>,
    events: Arc<dyn EventBus>,
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(
        persistence: Arc<dyn CapabilityPersistence>,
        embeddings: Arc<dyn EmbeddingProvider>,
        reliability: Arc<TransitiveReliability>,
        events: Arc<dyn EventBus>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            persistence,
            embeddings,
            reliability,
            events,
            config,
        }
    }

    /// `baseFactor` from spec §4.5 step 2: a penalty for a poor historical success rate, a boost
    /// for an excellent one, otherwise neutral.
    fn base_factor(&self, success_rate: f64) -> f64 {
        if success_rate < self.config.penalty_threshold {
            self.config.penalty_factor
        } else if success_rate > self.config.boost_threshold {
            self.config.boost_factor
        } else {
            1.0
        }
    }

    /// Scores every top-K candidate for `intent` and returns the best `accepted` match, if any
    /// (spec §4.5 steps 1-5). `suggestion_threshold` overrides `config.suggestion_threshold`
    /// when the caller supplies an externally-adapted value (spec §4.5: "externally supplied
    /// adaptive value").
    pub async fn match_intent(&self, intent: &str, suggestion_threshold: Option<f64>) -> Result<Option<MatchResult>> {
        let threshold = suggestion_threshold.unwrap_or(self.config.suggestion_threshold);
        let embedding = self.embeddings.encode(intent).await?;
        let candidates = self
            .persistence
            .search_by_intent(&embedding, self.config.min_semantic_score, self.config.top_k)
            .await?;

        let mut best: Option<MatchResult> = None;
        for candidate in candidates {
            let transitive = self.reliability.compute(candidate.capability.id).await?;
            let base = self.base_factor(candidate.capability.success_rate);
            let reliability_factor = base * transitive;
            let score = (candidate.semantic_score * reliability_factor).min(self.config.score_cap);

            let decision = if score >= threshold {
                MatchDecision::Accepted
            } else if reliability_factor < self.config.filter_threshold {
                MatchDecision::FilteredByReliability
            } else {
                MatchDecision::RejectedByThreshold
            };

            self.events
                .publish(CapabilityEvent::AlgorithmScored {
                    capability_id: candidate.capability.id,
                    semantic_score: candidate.semantic_score,
                    reliability_factor,
                    score,
                    decision: decision.as_str().to_string(),
                })
                .await;

            if decision == MatchDecision::Accepted {
                let is_better = best.as_ref().map(|b| score > b.score).unwrap_or(true);
                if is_better {
                    best = Some(MatchResult {
                        capability: candidate.capability,
                        semantic_score: candidate.semantic_score,
                        reliability_factor,
                        score,
                        decision,
                    });
                }
            }
        }

        if let Some(winner) = &best {
            self.events
                .publish(CapabilityEvent::CapabilityMatched {
                    capability_id: winner.capability.id,
                    intent: intent.to_string(),
                    score: winner.score,
                })
                .await;
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capability_core::capability::{CapabilityDependency, CapabilityId, DependencyEdgeType, RiskCategory};
    use capability_core::clock::SystemClock;
    use capability_core::events::NullEventBus;
    use capability_core::traits::{ContextMatch, DependencyDirection, IntentMatch};
    use capability_core::types::StaticStructure;
    use capability_vector::HashEmbeddingProvider;
    use chrono::Utc;
    use uuid::Uuid;

    struct FixedCandidates(Vec<IntentMatch>);

    #[async_trait]
    impl CapabilityPersistence for FixedCandidates {
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
            Ok(self.0.iter().map(|m| m.capability.clone()).find(|c| c.id == id))
        }
        async fn search_by_intent(&self, _e: &[f32], _m: f64, _l: usize) -> Result<Vec<IntentMatch>> {
            Ok(self.0.clone())
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

    fn candidate(success_rate: f64, semantic_score: f64) -> IntentMatch {
        IntentMatch {
            capability: Capability {
                id: Uuid::new_v4(),
                code_snippet: String::new(),
                code_hash: "0".repeat(64),
                intent_embedding: vec![],
                parameters_schema: serde_json::json!({}),
                static_structure: StaticStructure::empty(),
                usage_count: 10,
                success_count: (10.0 * success_rate) as u64,
                success_rate,
                avg_duration_ms: 0.0,
                created_at: Utc::now(),
                last_used: Utc::now(),
                hierarchy_level: 0,
                risk_category: RiskCategory::Safe,
            },
            semantic_score,
        }
    }

    fn matcher_with(candidates: Vec<IntentMatch>) -> Matcher {
        let persistence: Arc<dyn CapabilityPersistence> = Arc::new(FixedCandidates(candidates));
        let clock = Arc::new(SystemClock);
        let reliability = Arc::new(TransitiveReliability::new(persistence.clone(), clock, 60));
        Matcher::new(
            persistence,
            Arc::new(HashEmbeddingProvider::default()),
            reliability,
            Arc::new(NullEventBus),
            MatcherConfig::default(),
        )
    }

    #[tokio::test]
    async fn high_reliability_candidate_above_threshold_is_accepted() {
        let matcher = matcher_with(vec![candidate(0.95, 0.8)]);
        let result = matcher.match_intent("do the thing", None).await.unwrap();
        let winner = result.expect("expected an accepted match");
        assert_eq!(winner.decision, MatchDecision::Accepted);
        // boost factor (1.2) applied since success_rate (0.95) > boost_threshold (0.90).
        assert!((winner.reliability_factor - 1.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn low_reliability_candidate_is_filtered_not_merely_rejected() {
        // penalty_factor 0.10 * success_rate-derived transitive reliability 0.2 => well under
        // filter_threshold (0.20), and the resulting score is also under suggestion_threshold.
        let matcher = matcher_with(vec![candidate(0.2, 0.9)]);
        let result = matcher.match_intent("do the thing", None).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn no_candidates_above_threshold_yields_no_match() {
        let matcher = matcher_with(vec![candidate(0.6, 0.5)]);
        let result = matcher.match_intent("do the thing", None).await.unwrap();
        assert!(result.is_none());
    }
}
