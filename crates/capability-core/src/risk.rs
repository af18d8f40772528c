//! Tool risk classification feeding `Capability::risk_category` (spec §3, supplemented per
//! SPEC_FULL.md §3: spec.md names the derivation but not the scope table).

use crate::capability::RiskCategory;
use std::collections::HashMap;

/// Maps a tool id (or prefix) to its risk tier. Unknown non-`code:*` tools default to
/// `Moderate` rather than `Safe` — an unrecognized remote tool is never assumed harmless.
#[derive(Debug, Clone)]
pub struct ToolRiskCatalog {
    overrides: HashMap<String, RiskCategory>,
}

impl Default for ToolRiskCatalog {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }
}

impl ToolRiskCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, tool_id: impl Into<String>, risk: RiskCategory) -> Self {
        self.overrides.insert(tool_id.into(), risk);
        self
    }

    /// `code:*` pseudo-tools are pure (spec §4.1) and therefore always `Safe`, regardless of
    /// overrides. Everything else is looked up by exact id, then by namespace prefix
    /// (`mcp_ns` from `mcp_ns:action`), falling back to `Moderate`.
    pub fn classify(&self, tool_id: &str) -> RiskCategory {
        if tool_id.starts_with("code:") {
            return RiskCategory::Safe;
        }
        if let Some(risk) = self.overrides.get(tool_id) {
            return *risk;
        }
        if let Some((namespace, _)) = tool_id.split_once(':') {
            if let Some(risk) = self.overrides.get(namespace) {
                return *risk;
            }
        }
        RiskCategory::Moderate
    }

    /// The risk category for a whole capability: the max over every tool it invokes (spec §3).
    /// An empty tool list (a pure orchestration capability with no task nodes) is `Safe`.
    pub fn classify_all<'a>(&self, tool_ids: impl IntoIterator<Item = &'a str>) -> RiskCategory {
        tool_ids
            .into_iter()
            .map(|id| self.classify(id))
            .fold(RiskCategory::Safe, RiskCategory::combine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_pseudo_tools_are_always_safe() {
        let catalog = ToolRiskCatalog::new().with_override("code", RiskCategory::Dangerous);
        assert_eq!(catalog.classify("code:map"), RiskCategory::Safe);
    }

    #[test]
    fn unknown_tool_defaults_to_moderate_not_safe() {
        let catalog = ToolRiskCatalog::new();
        assert_eq!(catalog.classify("mcp.fs.read_file"), RiskCategory::Moderate);
    }

    #[test]
    fn whole_capability_risk_is_the_max_of_its_tools() {
        let catalog = ToolRiskCatalog::new().with_override("mcp.shell", RiskCategory::Dangerous);
        let risk = catalog.classify_all(["code:map", "mcp.fs.read_file", "mcp.shell.exec"]);
        assert_eq!(risk, RiskCategory::Dangerous);
    }
}
