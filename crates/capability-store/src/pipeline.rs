//! The capability save pipeline (spec §4.4 "Upsert pipeline on save"): wires the Analyzer, Code
//! Transformer, Semantic Hasher, embedding provider, and dependency graph into the single
//! `save_capability` entry point, in the exact order and event sequence spec §4.4/§5 describe.

use crate::hasher::semantic_hash;
use crate::schema::{merge_parameter_schemas, schema_from_parameter_positions};
use capability_analyzer::edges::ProvidesClassifier;
use capability_analyzer::{analyze_dialect, Dialect};
use capability_core::capability::{Capability, DependencyEdgeSource, DependencyEdgeType};
use capability_core::clock::Clock;
use capability_core::error::{Result, Warning};
use capability_core::events::CapabilityEvent;
use capability_core::risk::ToolRiskCatalog;
use capability_core::trace::{DecisionObservation, ExecutionTrace, TaskResult, DEFAULT_TRACE_PRIORITY};
use capability_core::traits::{CapabilityPersistence, CapabilityResolver, EmbeddingProvider, EventBus};
use capability_core::types::{Coverage, StaticStructure};
use capability_graph::DependencyGraph;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// A tool-schema-driven [`ProvidesClassifier`] (spec §4.2 step 6): for an ordered task pair
/// `(producer, consumer)` whose output/input schemas are both known, classifies `Provides`
/// coverage from the intersection of the producer's output property names and the consumer's
/// input property names — entirely independent of whether the consumer's arguments carry a
/// textual reference to the producer at all.
struct SchemaClassifier {
    output_schemas: HashMap<String, serde_json::Value>,
    input_schemas: HashMap<String, serde_json::Value>,
}

fn schema_properties(schema: &serde_json::Value) -> HashSet<String> {
    schema
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

fn schema_required(schema: &serde_json::Value) -> HashSet<String> {
    schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
        .unwrap_or_default()
}

impl ProvidesClassifier for SchemaClassifier {
    fn classify(&self, producer: &str, consumer: &str) -> Option<Coverage> {
        let output_schema = self.output_schemas.get(producer)?;
        let input_schema = self.input_schemas.get(consumer)?;

        let outputs = schema_properties(output_schema);
        let inputs = schema_properties(input_schema);
        let intersection: HashSet<&String> = outputs.intersection(&inputs).collect();
        if intersection.is_empty() {
            return None;
        }

        let required = schema_required(input_schema);
        if required.is_empty() {
            return Some(Coverage::Optional);
        }
        let required_covered = required.iter().filter(|r| intersection.contains(r)).count();
        Some(if required_covered == required.len() {
            Coverage::Strict
        } else if required_covered > 0 {
            Coverage::Partial
        } else {
            Coverage::Optional
        })
    }
}

/// Caller-supplied runtime facts about an observed execution, used to build an
/// [`ExecutionTrace`] once the capability id is known (spec §4.4 step 10).
pub struct TraceInput {
    pub intent_text: String,
    pub intent_embedding: Vec<f32>,
    pub initial_context: HashMap<String, serde_json::Value>,
    pub executed_path: Vec<String>,
    pub decisions: Vec<DecisionObservation>,
    pub task_results: Vec<TaskResult>,
    pub priority: f64,
    pub parent_trace_id: Option<Uuid>,
    pub error_message: Option<String>,
}

pub struct SaveCapabilityInput {
    pub org: String,
    pub project: String,
    pub source: String,
    pub dialect: Dialect,
    pub success: bool,
    pub duration_ms: f64,
    pub trace: Option<TraceInput>,
}

pub struct SaveCapabilityOutput {
    pub capability: Capability,
    pub is_new: bool,
    pub warnings: Vec<Warning>,
}

/// Wires every component the save pipeline needs. Holds no storage of its own beyond what
/// `persistence` and `graph` already own.
pub struct CapabilityPipeline {
    persistence: Arc<dyn CapabilityPersistence>,
    graph: Arc<DependencyGraph>,
    embeddings: Arc<dyn EmbeddingProvider>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    risk_catalog: ToolRiskCatalog,
}

impl CapabilityPipeline {
    pub fn new(
        persistence: Arc<dyn CapabilityPersistence>,
        graph: Arc<DependencyGraph>,
        embeddings: Arc<dyn EmbeddingProvider>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        risk_catalog: ToolRiskCatalog,
    ) -> Self {
        Self {
            persistence,
            graph,
            embeddings,
            events,
            clock,
            risk_catalog,
        }
    }

    async fn schema_classifier_for(&self, structure: &StaticStructure) -> Result<SchemaClassifier> {
        let tool_ids: HashSet<&str> = structure.nodes.iter().filter_map(|n| n.tool_id()).collect();
        let mut output_schemas = HashMap::new();
        let mut input_schemas = HashMap::new();
        for tool_id in tool_ids {
            if let Some(schema) = self.persistence.tool_output_schema(tool_id).await? {
                output_schemas.insert(tool_id.to_string(), schema);
            }
            if let Some(schema) = self.persistence.tool_input_schema(tool_id).await? {
                input_schemas.insert(tool_id.to_string(), schema);
            }
        }
        Ok(SchemaClassifier { output_schemas, input_schemas })
    }

    /// `saveCapability(input) -> (Capability, ExecutionTrace?)` (spec §4.4).
    pub async fn save_capability(
        &self,
        input: SaveCapabilityInput,
        resolver: &dyn CapabilityResolver,
    ) -> Result<SaveCapabilityOutput> {
        let mut warnings = Vec::new();

        // Step 1 (initial pass): analyze the raw source with no schema knowledge just to
        // recover `literal_bindings`, which the transformer's literal pass needs.
        let raw_structure = analyze_dialect(
            &input.source,
            input.dialect,
            &capability_analyzer::edges::NoSchemaClassifier,
        );

        // Step 1: capability-reference rewrite; step 2: literal parameterization.
        let outcome = capability_transform::transform(
            &input.source,
            &input.org,
            &input.project,
            resolver,
            &raw_structure.literal_bindings,
        )
        .await?;
        warnings.extend(outcome.warnings.clone());

        // Step 3: rebuild the static structure from the transformed code, this time with
        // tool-schema-aware edge classification.
        let classifier = self.schema_classifier_for(&raw_structure).await?;
        let rebuilt = analyze_dialect(&outcome.source, input.dialect, &classifier);

        // Step 2 (merge): literal-derived properties win over ones only inferred from a bare
        // `args.x` access the transformer never touched.
        let positional_schema = schema_from_parameter_positions(&rebuilt);
        let parameters_schema = merge_parameter_schemas(&outcome.parameters_schema, &positional_schema);

        // Step 4: normalize variable names using the rebuilt structure's own bindings.
        let normalized_source = capability_transform::normalize_variable_names(&outcome.source, &rebuilt.variable_bindings);

        // Step 5: semantic hash over the rebuilt structure (or, if empty, the normalized text).
        let code_hash = semantic_hash(&normalized_source, &rebuilt);

        // Step 6: intent embedding.
        let intent_text = input
            .trace
            .as_ref()
            .map(|t| t.intent_text.clone())
            .unwrap_or_else(|| normalized_source.clone());
        let intent_embedding = self.embeddings.encode(&intent_text).await?;

        let risk_category = self.risk_catalog.classify_all(rebuilt.nodes.iter().filter_map(|n| n.tool_id()));
        let now = self.clock.now();

        // Step 7: UPSERT keyed by codeHash.
        let (capability, is_new) = match self.persistence.find_by_code_hash(&code_hash).await? {
            Some(mut existing) => {
                existing.code_snippet = normalized_source.clone();
                existing.parameters_schema = parameters_schema.clone();
                existing.static_structure = rebuilt.clone();
                existing.risk_category = risk_category;
                existing.record_usage(input.success, input.duration_ms, now);
                (self.persistence.update_capability(existing).await?, false)
            }
            None => {
                let fresh = Capability {
                    id: Uuid::new_v4(),
                    code_snippet: normalized_source.clone(),
                    code_hash: code_hash.clone(),
                    intent_embedding,
                    parameters_schema,
                    static_structure: rebuilt.clone(),
                    usage_count: 1,
                    success_count: if input.success { 1 } else { 0 },
                    success_rate: if input.success { 1.0 } else { 0.0 },
                    avg_duration_ms: input.duration_ms,
                    created_at: now,
                    last_used: now,
                    hierarchy_level: 0,
                    risk_category,
                };
                (self.persistence.insert_capability(fresh).await?, true)
            }
        };

        self.events
            .publish(CapabilityEvent::CapabilityLearned {
                capability_id: capability.id,
                is_new,
            })
            .await;
        self.events
            .publish(if is_new {
                CapabilityEvent::ZoneCreated { capability_id: capability.id }
            } else {
                CapabilityEvent::ZoneUpdated { capability_id: capability.id }
            })
            .await;

        // Step 8: a `contains` edge for every task node whose tool id resolves to an existing
        // capability (the capability-reference rewrite already left `$cap:<uuid>` tool ids in
        // place of any resolved reference).
        let mut child_ids = Vec::new();
        for node in &rebuilt.nodes {
            let Some(tool_id) = node.tool_id() else { continue };
            let Some(referenced) = tool_id.strip_prefix("$cap:").and_then(|s| s.parse::<Uuid>().ok()) else {
                continue;
            };
            let (_dep, warning) = self
                .graph
                .add_dependency(capability.id, referenced, DependencyEdgeType::Contains, DependencyEdgeSource::Inferred)
                .await?;
            if let Some(warning) = warning {
                warnings.push(warning);
            }
            child_ids.push(referenced);
        }

        // Step 9: hierarchyLevel = max(childLevels) + 1, or 0 if no children.
        let mut final_capability = capability;
        if !child_ids.is_empty() {
            let mut max_child_level = 0;
            for child_id in &child_ids {
                if let Some(child) = self.persistence.find_by_id(*child_id).await? {
                    max_child_level = max_child_level.max(child.hierarchy_level);
                }
            }
            final_capability.hierarchy_level = max_child_level + 1;
            final_capability = self.persistence.update_capability(final_capability).await?;
        }

        // Step 10: delegate any caller-supplied trace data to the trace store.
        if let Some(trace_input) = input.trace {
            let mut trace = ExecutionTrace {
                id: Uuid::new_v4(),
                capability_id: final_capability.id,
                intent_text: trace_input.intent_text,
                intent_embedding: trace_input.intent_embedding,
                initial_context: trace_input.initial_context,
                executed_path: trace_input.executed_path,
                decisions: trace_input.decisions,
                task_results: trace_input.task_results,
                success: input.success,
                duration_ms: input.duration_ms,
                priority: if trace_input.priority == 0.0 {
                    DEFAULT_TRACE_PRIORITY
                } else {
                    trace_input.priority
                },
                parent_trace_id: trace_input.parent_trace_id,
                error_message: trace_input.error_message,
                created_at: now,
            };
            trace.sanitize();
            let trace_id = trace.id;
            self.persistence.save_trace(trace).await?;
            self.events
                .publish(CapabilityEvent::ExecutionTraceSaved {
                    trace_id,
                    capability_id: final_capability.id,
                })
                .await;
        }

        Ok(SaveCapabilityOutput {
            capability: final_capability,
            is_new,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use async_trait::async_trait;
    use capability_core::clock::FixedClock;
    use capability_core::events::NullEventBus;
    use capability_vector::HashEmbeddingProvider;
    use chrono::Utc;

    struct NoCapabilities;

    #[async_trait]
    impl CapabilityResolver for NoCapabilities {
        async fn resolve(&self, _org: &str, _project: &str, _action: &str) -> Result<Option<capability_core::capability::CapabilityId>> {
            Ok(None)
        }
    }

    fn pipeline() -> (CapabilityPipeline, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let persistence: Arc<dyn CapabilityPersistence> = store.clone();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
        let reliability = capability_graph::TransitiveReliability::new(persistence.clone(), clock.clone(), 60);
        let graph = Arc::new(DependencyGraph::new(persistence.clone(), Arc::new(NullEventBus), clock.clone(), reliability));
        let pipeline = CapabilityPipeline::new(
            persistence,
            graph,
            Arc::new(HashEmbeddingProvider::default()),
            Arc::new(NullEventBus),
            clock,
            ToolRiskCatalog::new(),
        );
        (pipeline, store)
    }

    #[tokio::test]
    async fn first_save_of_a_snippet_creates_a_new_leaf_capability() {
        let (pipeline, _store) = pipeline();
        let input = SaveCapabilityInput {
            org: "acme".to_string(),
            project: "main".to_string(),
            source: r#"await mcp.reports.generate({ scope: "daily" });"#.to_string(),
            dialect: Dialect::JavaScript,
            success: true,
            duration_ms: 120.0,
            trace: None,
        };
        let output = pipeline.save_capability(input, &NoCapabilities).await.unwrap();
        assert!(output.is_new);
        assert_eq!(output.capability.hierarchy_level, 0);
        assert_eq!(output.capability.usage_count, 1);
        assert!(output.capability.code_snippet.contains("args.scope"));
    }

    #[tokio::test]
    async fn repeated_save_of_the_same_snippet_increments_usage_instead_of_duplicating() {
        let (pipeline, _store) = pipeline();
        let source = r#"await mcp.reports.generate({ scope: "daily" });"#;
        let first = pipeline
            .save_capability(
                SaveCapabilityInput {
                    org: "acme".to_string(),
                    project: "main".to_string(),
                    source: source.to_string(),
                    dialect: Dialect::JavaScript,
                    success: true,
                    duration_ms: 100.0,
                    trace: None,
                },
                &NoCapabilities,
            )
            .await
            .unwrap();
        let second = pipeline
            .save_capability(
                SaveCapabilityInput {
                    org: "acme".to_string(),
                    project: "main".to_string(),
                    source: source.to_string(),
                    dialect: Dialect::JavaScript,
                    success: false,
                    duration_ms: 300.0,
                    trace: None,
                },
                &NoCapabilities,
            )
            .await
            .unwrap();
        assert!(!second.is_new);
        assert_eq!(second.capability.id, first.capability.id);
        assert_eq!(second.capability.usage_count, 2);
        assert_eq!(second.capability.success_count, 1);
        assert!((second.capability.success_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn saving_with_a_trace_persists_and_emits_trace_saved() {
        let (pipeline, store) = pipeline();
        let input = SaveCapabilityInput {
            org: "acme".to_string(),
            project: "main".to_string(),
            source: r#"await mcp.users.fetch({ id: args.userId });"#.to_string(),
            dialect: Dialect::JavaScript,
            success: true,
            duration_ms: 50.0,
            trace: Some(TraceInput {
                intent_text: "fetch a user".to_string(),
                intent_embedding: vec![],
                initial_context: HashMap::new(),
                executed_path: vec!["n1".to_string()],
                decisions: vec![],
                task_results: vec![],
                priority: 0.8,
                parent_trace_id: None,
                error_message: None,
            }),
        };
        let output = pipeline.save_capability(input, &NoCapabilities).await.unwrap();
        assert!(output.is_new);
        let _ = store;
    }
}
