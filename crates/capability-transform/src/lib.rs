//! The Code Transformer (spec §4.3): capability-reference rewrite, literal parameterization,
//! and variable-name normalization, applied to an observed snippet in that order. Nothing here
//! persists anything; it is pure text-and-AST transformation over the source the Analyzer saw,
//! consumed by `capability-store`'s upsert pipeline (spec §4.4 steps 1-4).

pub mod cap_ref;
pub mod literal;
pub mod normalize;
mod splice;
mod wrap;

use capability_core::error::{Result, Warning};
use capability_core::traits::CapabilityResolver;
use capability_core::types::NodeId;
use std::collections::HashMap;

/// The result of the first two transformer passes (spec §4.4 upsert steps 1-2). Variable
/// normalization (step 4) is applied separately once the structure has been rebuilt from this
/// output and its own bindings are known -- see [`normalize_variable_names`].
pub struct TransformOutcome {
    pub source: String,
    pub capability_refs_replaced: usize,
    pub parameters_schema: serde_json::Value,
    pub warnings: Vec<Warning>,
}

/// Rewrites capability references, then lifts literal values into parameters (spec §4.3).
///
/// Capability-resolution failures propagate (spec §7 `TransformResolutionError`): the caller's
/// save must fail. Literal-transformation failures do not: they come back as a `Warning` with
/// the original (capability-rewritten) source kept (spec §7 `LiteralTransformError`).
pub async fn transform(
    source: &str,
    org: &str,
    project: &str,
    resolver: &dyn CapabilityResolver,
    literal_bindings: &HashMap<String, serde_json::Value>,
) -> Result<TransformOutcome> {
    let (rewritten, capability_refs_replaced) = cap_ref::rewrite(source, org, project, resolver).await?;
    let (parameterized, parameters_schema, warnings) = literal::parameterize(&rewritten, literal_bindings);
    Ok(TransformOutcome {
        source: parameterized,
        capability_refs_replaced,
        parameters_schema,
        warnings,
    })
}

/// Renames every tracked variable in `source` to `_<nodeId>` (spec §4.3 step 3; spec §4.4 upsert
/// step 4, run against the structure rebuilt from the transformed source).
pub fn normalize_variable_names(source: &str, variable_bindings: &HashMap<String, NodeId>) -> String {
    normalize::normalize(source, variable_bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capability_core::capability::CapabilityId;
    use serde_json::json;

    struct NoCapabilities;

    #[async_trait]
    impl CapabilityResolver for NoCapabilities {
        async fn resolve(&self, _org: &str, _project: &str, _action: &str) -> Result<Option<CapabilityId>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn transform_lifts_inline_literals_when_no_capability_resolves() {
        let literal_bindings = HashMap::new();
        let outcome = transform(
            r#"await mcp.reports.generate({ scope: "daily" });"#,
            "acme",
            "main",
            &NoCapabilities,
            &literal_bindings,
        )
        .await
        .unwrap();
        assert_eq!(outcome.capability_refs_replaced, 0);
        assert!(outcome.source.contains("args.scope"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn normalize_variable_names_delegates_to_the_normalize_module() {
        let mut bindings = HashMap::new();
        bindings.insert("user".to_string(), NodeId("n1".to_string()));
        let renamed = normalize_variable_names("const user = 1;", &bindings);
        assert_eq!(renamed, "const _n1 = 1;");
        let _ = json!({});
    }
}
