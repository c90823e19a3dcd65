//! Tool Registry (C4, spec §4.4).
//!
//! `CheckTool` generalizes the teacher's `BaseTool` trait
//! (`tools/base_tool.rs`: name/description/schema/run) to this domain's
//! uniform `(name, schema, execute)` triple, dropping the CrewAI-specific
//! surface (env vars, result-as-answer, per-instance usage caps) this
//! service doesn't need and adding the `{success, error}` envelope spec
//! §4.4 requires every tool to return.

pub mod builtin;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clients::llm::{LlmClient, ToolSchema};
use crate::clients::{Embedder, ImageHashClient, ScreenshotClient, SearchClient, UrlScanClient};

/// `{success:false, error:{message, code?}}` (spec §4.4, §7).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolError {
    pub message: String,
    pub code: Option<String>,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { message: message.into(), code: Some(code.into()) }
    }
}

pub type ToolOutcome = Result<Value, ToolError>;

/// Per-check mutable scratch the registry's tools read and write (spec
/// §4.4: "a mutable per-check scratch (intent, type, imageUrl, caption,
/// text)").
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    pub intent: Option<String>,
    pub check_type: Option<String>,
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub text: Option<String>,
    pub extracted_image_urls: Vec<String>,
    pub starting_content: Option<String>,
}

/// Injected per-check context every tool executes against.
pub struct ToolContext {
    pub request_id: String,
    pub scratch: Arc<parking_lot::Mutex<Scratch>>,
    pub embedder: Arc<dyn Embedder>,
    pub image_hasher: Arc<dyn ImageHashClient>,
    pub screenshot: Arc<dyn ScreenshotClient>,
    pub search: Arc<dyn SearchClient>,
    pub url_scan: Arc<dyn UrlScanClient>,
    pub llm: Arc<dyn LlmClient>,
}

#[async_trait]
pub trait CheckTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters: names, types, required set, and
    /// `additionalProperties: false` (spec §4.4).
    fn parameters_schema(&self) -> Value;

    /// `None` means unlimited; `Some(n)` means this tool is one of the
    /// "externally-billed" tools the agent-loop system message must report
    /// remaining quota for (spec §4.5 step 1).
    fn quota_limit(&self) -> Option<u32> {
        None
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Helper for building a strict JSON-schema object.
pub fn object_schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

pub type ToolParams = HashMap<String, Value>;
