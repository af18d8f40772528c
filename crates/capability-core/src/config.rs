//! All numeric thresholds spec.md calls out as configurable (§4.4, §4.5), loaded the way the
//! host stack loads its settings: a `Default`-backed struct, layered with an optional TOML file
//! and `CAPCORE_`-prefixed environment variables via the `config` crate.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `searchByIntent` defaults (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IntentSearchConfig {
    #[serde(default = "IntentSearchConfig::default_min_score")]
    pub min_score: f64,
    #[serde(default = "IntentSearchConfig::default_limit")]
    pub limit: usize,
}

impl IntentSearchConfig {
    fn default_min_score() -> f64 {
        0.5
    }
    fn default_limit() -> usize {
        10
    }
}

impl Default for IntentSearchConfig {
    fn default() -> Self {
        Self {
            min_score: Self::default_min_score(),
            limit: Self::default_limit(),
        }
    }
}

/// `searchByContext` defaults and bounds (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContextSearchConfig {
    #[serde(default = "ContextSearchConfig::default_overlap_threshold")]
    pub overlap_threshold: f64,
    #[serde(default = "ContextSearchConfig::default_max_tools")]
    pub max_tools: usize,
    #[serde(default = "ContextSearchConfig::default_max_tool_name_len")]
    pub max_tool_name_len: usize,
}

impl ContextSearchConfig {
    fn default_overlap_threshold() -> f64 {
        0.3
    }
    fn default_max_tools() -> usize {
        100
    }
    fn default_max_tool_name_len() -> usize {
        256
    }
}

impl Default for ContextSearchConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: Self::default_overlap_threshold(),
            max_tools: Self::default_max_tools(),
            max_tool_name_len: Self::default_max_tool_name_len(),
        }
    }
}

/// Matcher scoring defaults (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatcherConfig {
    #[serde(default = "MatcherConfig::default_top_k")]
    pub top_k: usize,
    #[serde(default = "MatcherConfig::default_min_semantic_score")]
    pub min_semantic_score: f64,
    #[serde(default = "MatcherConfig::default_penalty_factor")]
    pub penalty_factor: f64,
    #[serde(default = "MatcherConfig::default_penalty_threshold")]
    pub penalty_threshold: f64,
    #[serde(default = "MatcherConfig::default_boost_factor")]
    pub boost_factor: f64,
    #[serde(default = "MatcherConfig::default_boost_threshold")]
    pub boost_threshold: f64,
    #[serde(default = "MatcherConfig::default_filter_threshold")]
    pub filter_threshold: f64,
    #[serde(default = "MatcherConfig::default_suggestion_threshold")]
    pub suggestion_threshold: f64,
    #[serde(default = "MatcherConfig::default_score_cap")]
    pub score_cap: f64,
}

impl MatcherConfig {
    fn default_top_k() -> usize {
        5
    }
    fn default_min_semantic_score() -> f64 {
        0.65
    }
    fn default_penalty_factor() -> f64 {
        0.10
    }
    fn default_penalty_threshold() -> f64 {
        0.50
    }
    fn default_boost_factor() -> f64 {
        1.20
    }
    fn default_boost_threshold() -> f64 {
        0.90
    }
    fn default_filter_threshold() -> f64 {
        0.20
    }
    fn default_suggestion_threshold() -> f64 {
        0.70
    }
    fn default_score_cap() -> f64 {
        0.95
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            top_k: Self::default_top_k(),
            min_semantic_score: Self::default_min_semantic_score(),
            penalty_factor: Self::default_penalty_factor(),
            penalty_threshold: Self::default_penalty_threshold(),
            boost_factor: Self::default_boost_factor(),
            boost_threshold: Self::default_boost_threshold(),
            filter_threshold: Self::default_filter_threshold(),
            suggestion_threshold: Self::default_suggestion_threshold(),
            score_cap: Self::default_score_cap(),
        }
    }
}

/// Transitive-reliability cache TTL (spec §4.5, §5; 60 seconds).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReliabilityCacheConfig {
    #[serde(default = "ReliabilityCacheConfig::default_ttl_secs")]
    pub ttl_secs: u64,
}

impl ReliabilityCacheConfig {
    fn default_ttl_secs() -> u64 {
        60
    }
}

impl Default for ReliabilityCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
        }
    }
}

/// Top-level configuration for the capability learning core.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CapabilityConfig {
    #[serde(default)]
    pub intent_search: IntentSearchConfig,
    #[serde(default)]
    pub context_search: ContextSearchConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub reliability_cache: ReliabilityCacheConfig,
}

impl CapabilityConfig {
    /// Loads defaults, then an optional `capability.toml` in the current directory, then
    /// `CAPCORE_`-prefixed environment variables, following the host stack's layered
    /// `config::Config::builder()` convention. Never fails on a missing optional file.
    pub fn load() -> crate::error::Result<Self> {
        let defaults = serde_json::to_value(Self::default())
            .map_err(|e| crate::error::CoreError::Configuration(e.to_string()))?;

        let builder = config::Config::builder()
            .add_source(config::File::from_str(
                &defaults.to_string(),
                config::FileFormat::Json,
            ))
            .add_source(config::File::with_name("capability").required(false))
            .add_source(config::Environment::with_prefix("CAPCORE").separator("__"));

        let built = builder
            .build()
            .map_err(|e| crate::error::CoreError::Configuration(e.to_string()))?;
        built
            .try_deserialize()
            .map_err(|e| crate::error::CoreError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = CapabilityConfig::default();
        assert_eq!(cfg.intent_search.min_score, 0.5);
        assert_eq!(cfg.context_search.overlap_threshold, 0.3);
        assert_eq!(cfg.matcher.suggestion_threshold, 0.70);
        assert_eq!(cfg.reliability_cache.ttl_secs, 60);
    }

    #[test]
    fn load_falls_back_to_defaults_without_a_config_file() {
        let cfg = CapabilityConfig::load().expect("defaults alone must load");
        assert_eq!(cfg.matcher.top_k, 5);
    }
}
