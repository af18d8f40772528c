//! The stored capability record and its typed dependency edges (spec §3).

use crate::types::StaticStructure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CapabilityId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    Safe,
    Moderate,
    Dangerous,
}

impl RiskCategory {
    /// `max` over the natural safe < moderate < dangerous ordering (spec §3,
    /// `riskCategory` derived from the max scope of tools used).
    pub fn combine(self, other: RiskCategory) -> RiskCategory {
        use RiskCategory::*;
        match (self, other) {
            (Dangerous, _) | (_, Dangerous) => Dangerous,
            (Moderate, _) | (_, Moderate) => Moderate,
            _ => Safe,
        }
    }
}

/// The stored capability record (spec §3 `Capability`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub code_snippet: String,
    pub code_hash: String,
    pub intent_embedding: Vec<f32>,
    pub parameters_schema: serde_json::Value,
    pub static_structure: StaticStructure,
    pub usage_count: u64,
    pub success_count: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub hierarchy_level: u32,
    pub risk_category: RiskCategory,
}

impl Capability {
    /// Recomputes `success_rate` from `(success_count, usage_count)`, enforcing the invariant
    /// `success_rate == success_count / usage_count` (spec §3) and `usage_count >= success_count`.
    pub fn recompute_success_rate(&mut self) {
        debug_assert!(self.usage_count >= self.success_count);
        self.success_rate = if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.usage_count as f64
        };
    }

    /// Records one more observed run, incrementally updating usage/success/duration atomically
    /// (spec §4.4 upsert step 7: "recompute avgDurationMs as an incremental mean").
    pub fn record_usage(&mut self, success: bool, duration_ms: f64, now: DateTime<Utc>) {
        self.usage_count += 1;
        if success {
            self.success_count += 1;
        }
        self.avg_duration_ms = if self.usage_count == 1 {
            duration_ms
        } else {
            self.avg_duration_ms
                + (duration_ms - self.avg_duration_ms) / self.usage_count as f64
        };
        self.last_used = now;
        self.recompute_success_rate();
    }

    /// Every task node's tool id, used by context search's overlap computation (spec §4.4).
    pub fn tools_used(&self) -> Vec<&str> {
        self.static_structure
            .nodes
            .iter()
            .filter_map(|n| n.tool_id())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyEdgeType {
    Dependency,
    Contains,
    Provides,
    Alternative,
    Sequence,
}

impl DependencyEdgeType {
    /// Fixed type weights from spec §3.
    pub fn weight(self) -> f64 {
        match self {
            DependencyEdgeType::Dependency => 1.0,
            DependencyEdgeType::Contains => 0.8,
            DependencyEdgeType::Provides => 0.7,
            DependencyEdgeType::Alternative => 0.6,
            DependencyEdgeType::Sequence => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyEdgeSource {
    Template,
    Inferred,
    Observed,
}

impl DependencyEdgeSource {
    /// Fixed source modifiers from spec §3.
    pub fn modifier(self) -> f64 {
        match self {
            DependencyEdgeSource::Observed => 1.0,
            DependencyEdgeSource::Inferred => 0.7,
            DependencyEdgeSource::Template => 0.5,
        }
    }
}

/// Number of observations at which an `inferred` edge is promoted to `observed` (spec §3).
pub const OBSERVED_THRESHOLD: u32 = 3;

/// `confidenceScore = typeWeight(edgeType) * sourceModifier(edgeSource)`, clamped to `[0,1]`
/// (spec §3).
pub fn confidence_score(edge_type: DependencyEdgeType, edge_source: DependencyEdgeSource) -> f64 {
    (edge_type.weight() * edge_source.modifier()).clamp(0.0, 1.0)
}

/// A typed, evidence-weighted edge between two capabilities (spec §3 `CapabilityDependency`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDependency {
    pub from: CapabilityId,
    pub to: CapabilityId,
    pub edge_type: DependencyEdgeType,
    pub edge_source: DependencyEdgeSource,
    pub observed_count: u32,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
}

impl CapabilityDependency {
    pub fn new(
        from: CapabilityId,
        to: CapabilityId,
        edge_type: DependencyEdgeType,
        edge_source: DependencyEdgeSource,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            from,
            to,
            edge_type,
            edge_source,
            observed_count: 1,
            confidence_score: confidence_score(edge_type, edge_source),
            created_at: now,
            last_observed: now,
        }
    }

    /// One more observation of this edge. Promotion from `inferred` to `observed` is monotonic
    /// (spec §5, §8): once promoted it is never demoted, and it only happens going forward from
    /// `observed_count >= OBSERVED_THRESHOLD`.
    pub fn observe(&mut self, now: DateTime<Utc>) {
        self.observed_count += 1;
        self.last_observed = now;
        if self.edge_source == DependencyEdgeSource::Inferred
            && self.observed_count >= OBSERVED_THRESHOLD
        {
            self.edge_source = DependencyEdgeSource::Observed;
        }
        self.confidence_score = confidence_score(self.edge_type, self.edge_source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_recomputes_confidence_once() {
        let now = Utc::now();
        let mut dep = CapabilityDependency::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            DependencyEdgeType::Dependency,
            DependencyEdgeSource::Inferred,
            now,
        );
        assert!((dep.confidence_score - 0.7).abs() < 1e-9);

        dep.observe(now);
        assert_eq!(dep.observed_count, 2);
        assert_eq!(dep.edge_source, DependencyEdgeSource::Inferred);

        dep.observe(now);
        assert_eq!(dep.observed_count, 3);
        assert_eq!(dep.edge_source, DependencyEdgeSource::Observed);
        assert!((dep.confidence_score - 1.0).abs() < 1e-9);

        // Monotonic: a later inferred-looking update never demotes.
        dep.observe(now);
        assert_eq!(dep.edge_source, DependencyEdgeSource::Observed);
    }

    #[test]
    fn success_rate_invariant_holds_after_incremental_updates() {
        let mut cap = test_capability();
        let now = Utc::now();
        cap.record_usage(true, 100.0, now);
        cap.record_usage(false, 300.0, now);
        assert_eq!(cap.usage_count, 2);
        assert_eq!(cap.success_count, 1);
        assert!((cap.success_rate - 0.5).abs() < 1e-9);
        assert!((cap.avg_duration_ms - 200.0).abs() < 1e-9);
        assert!(cap.usage_count >= cap.success_count);
    }

    fn test_capability() -> Capability {
        Capability {
            id: Uuid::new_v4(),
            code_snippet: String::new(),
            code_hash: "0".repeat(64),
            intent_embedding: vec![],
            parameters_schema: serde_json::json!({}),
            static_structure: StaticStructure::empty(),
            usage_count: 0,
            success_count: 0,
            success_rate: 0.0,
            avg_duration_ms: 0.0,
            created_at: Utc::now(),
            last_used: Utc::now(),
            hierarchy_level: 0,
            risk_category: RiskCategory::Safe,
        }
    }
}
