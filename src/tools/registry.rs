//! Per-check tool registry: quota enforcement and advertised-schema
//! filtering (spec §4.4).

use super::{builtin::*, CheckTool, ToolContext, ToolError, ToolOutcome};
use crate::clients::llm::ToolSchema;
use dashmap::DashMap;
use std::sync::Arc;

/// Names of the tools the agent loop (C5) is allowed to call, per spec
/// §4.5 — `preprocess_inputs`, `extract_image_urls`, `summarise_report`,
/// and `translate_text` are pipeline-invoked directly (§4.6 steps 6/9/10)
/// and never offered to the planner.
pub const AGENT_LOOP_TOOL_NAMES: &[&str] = &[
    "search_google",
    "get_website_screenshot",
    "check_malicious_url",
    "search_internal",
    "submit_report_for_review",
];

/// Tools whose remaining quota the agent-loop system message must report
/// (spec §4.5 step 1: "remaining quotas for the three externally-billed
/// tools").
pub const EXTERNALLY_BILLED_TOOL_NAMES: &[&str] =
    &["search_google", "get_website_screenshot", "check_malicious_url"];

pub struct ToolRegistry {
    tools: Vec<Arc<dyn CheckTool>>,
    remaining_quota: DashMap<String, u32>,
}

impl ToolRegistry {
    /// Builds the canonical tool set (spec §4.4) with default per-check
    /// quotas drawn from each tool's `quota_limit()`.
    pub fn new() -> Self {
        let tools: Vec<Arc<dyn CheckTool>> = vec![
            Arc::new(SearchGoogleTool),
            Arc::new(ScreenshotTool),
            Arc::new(UrlScanTool),
            Arc::new(SearchInternalTool),
            Arc::new(PreprocessInputsTool),
            Arc::new(ExtractImageUrlsTool),
            Arc::new(SummariseReportTool),
            Arc::new(TranslateTextTool),
            Arc::new(SubmitReportForReviewTool),
        ];
        let remaining_quota = DashMap::new();
        for tool in &tools {
            if let Some(limit) = tool.quota_limit() {
                remaining_quota.insert(tool.name().to_string(), limit);
            }
        }
        Self { tools, remaining_quota }
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn CheckTool>> {
        // `scan_url` is an alias for `check_malicious_url` (spec §4.4).
        let name = if name == "scan_url" { "check_malicious_url" } else { name };
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn remaining_quota(&self, name: &str) -> Option<u32> {
        self.remaining_quota.get(name).map(|v| *v)
    }

    /// Schemas for the subset of `names` whose quota has not reached zero
    /// (spec §4.4: "MUST suppress a tool from the advertised set once its
    /// remaining quota reaches zero").
    pub fn advertised_schemas(&self, names: &[&str]) -> Vec<ToolSchema> {
        names
            .iter()
            .filter_map(|name| self.find(name))
            .filter(|tool| self.remaining_quota.get(tool.name()).map(|q| *q > 0).unwrap_or(true))
            .map(|tool| tool.schema())
            .collect()
    }

    /// Enforces quota (before calling the underlying service, per spec
    /// §4.4) then executes the tool.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> ToolOutcome {
        let Some(tool) = self.find(name) else {
            return Err(ToolError::new(format!("unknown tool '{name}'")));
        };

        if let Some(mut remaining) = self.remaining_quota.get_mut(name) {
            if *remaining == 0 {
                return Err(ToolError::with_code(
                    format!("quota exhausted for tool '{name}'"),
                    "QuotaExhausted",
                ));
            }
            *remaining -= 1;
        }

        tool.execute(params, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_filters_advertised_schemas() {
        let registry = ToolRegistry::new();
        for _ in 0..5 {
            registry.remaining_quota.get_mut("search_google").map(|mut q| *q -= 1);
        }
        let schemas = registry.advertised_schemas(AGENT_LOOP_TOOL_NAMES);
        assert!(!schemas.iter().any(|s| s.name == "search_google"));
        assert!(schemas.iter().any(|s| s.name == "submit_report_for_review"));
    }
}
