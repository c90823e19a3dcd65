//! Agent Loop (C5, spec §4.5).
//!
//! A bounded step loop over an injected `LlmClient`, generalizing the
//! teacher's `CrewAgentExecutor` iteration loop
//! (`agents/crew_agent_executor.rs`) and its
//! `MaxIterationsExceededError` (`utilities/exceptions`).

use crate::clients::llm::{ChatMessage, ChatRequest, ChatResponse, LlmClient, ToolCallRequest};
use crate::error::CoreError;
use crate::tools::registry::{ToolRegistry, AGENT_LOOP_TOOL_NAMES, EXTERNALLY_BILLED_TOOL_NAMES};
use crate::tools::{ToolContext, ToolError};
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;

pub const LLM_CALL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AgentLoopOutcome {
    pub report: String,
    pub sources: Vec<String>,
    pub is_controversial: bool,
    pub steps_taken: usize,
}

pub struct AgentLoop<'a> {
    registry: &'a ToolRegistry,
    llm: Arc<dyn LlmClient>,
    max_steps: usize,
    max_history: usize,
}

impl<'a> AgentLoop<'a> {
    pub fn new(registry: &'a ToolRegistry, llm: Arc<dyn LlmClient>, max_steps: usize, max_history: usize) -> Self {
        Self { registry, llm, max_steps, max_history }
    }

    pub async fn run(&self, ctx: &ToolContext, starting_content: &str) -> Result<AgentLoopOutcome, CoreError> {
        let mut history = vec![ChatMessage::user_text(starting_content.to_string())];

        for step in 0..self.max_steps {
            if history.len() >= self.max_history {
                return Err(CoreError::AgentLoopExhausted(format!(
                    "message history reached {} entries",
                    history.len()
                )));
            }

            let system = self.system_message();
            let schemas = self.registry.advertised_schemas(AGENT_LOOP_TOOL_NAMES);

            let mut messages = vec![system];
            messages.extend(history.clone());

            let req = ChatRequest {
                tools: schemas,
                tool_choice_required: true,
                temperature: 0.0,
                seed: Some(11),
                ..ChatRequest::new(messages)
            };

            let response: ChatResponse = tokio::time::timeout(
                std::time::Duration::from_secs(LLM_CALL_TIMEOUT_SECS),
                self.llm.chat(req),
            )
            .await
            .map_err(|_| CoreError::UpstreamTimeout("agent loop llm call".to_string()))??;

            if response.tool_calls.is_empty() {
                return Err(CoreError::AgentLoopExhausted(
                    "llm did not emit a tool call under tool_choice=required".to_string(),
                ));
            }

            history.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));

            let outcomes = join_all(
                response
                    .tool_calls
                    .iter()
                    .map(|call| self.execute_call(call, ctx)),
            )
            .await;

            for outcome in &outcomes {
                if let CallOutcome::Terminal(final_outcome) = outcome {
                    return Ok(AgentLoopOutcome {
                        steps_taken: step + 1,
                        ..final_outcome.clone()
                    });
                }
            }

            // Flatten: all tool-role entries precede any user-role entries
            // (spec §4.5 step 4 — screenshot results split into an
            // acknowledgement and a synthetic user message).
            let mut tool_messages = Vec::new();
            let mut user_messages = Vec::new();
            for outcome in outcomes {
                let (tool_msg, user_msg) = outcome.into_messages();
                tool_messages.push(tool_msg);
                if let Some(m) = user_msg {
                    user_messages.push(m);
                }
            }
            history.extend(tool_messages);
            history.extend(user_messages);
        }

        Err(CoreError::AgentLoopExhausted(format!(
            "exceeded {} steps without a passing review",
            self.max_steps
        )))
    }

    fn system_message(&self) -> ChatMessage {
        let now = chrono::Utc::now().to_rfc3339();
        let quotas: Vec<String> = EXTERNALLY_BILLED_TOOL_NAMES
            .iter()
            .map(|name| format!("{name}: {}", self.registry.remaining_quota(name).unwrap_or(0)))
            .collect();
        ChatMessage::system(format!(
            "Current datetime: {now}\nRemaining quotas — {}\n\nYou are a fact-checking research agent. Use tools to investigate the claim, then call submit_report_for_review when you have a complete, sourced report.",
            quotas.join(", ")
        ))
    }

    async fn execute_call(&self, call: &ToolCallRequest, ctx: &ToolContext) -> CallOutcome {
        if call.name == "submit_report_for_review" {
            let outcome = self.registry.execute(&call.name, call.arguments.clone(), ctx).await;
            match outcome {
                Ok(value) if value.get("passedReview").and_then(|v| v.as_bool()) == Some(true) => {
                    return CallOutcome::Terminal(AgentLoopOutcome {
                        report: value.get("report").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        sources: value
                            .get("sources")
                            .and_then(|v| v.as_array())
                            .map(|a| a.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
                            .unwrap_or_default(),
                        is_controversial: value.get("isControversial").and_then(|v| v.as_bool()).unwrap_or(false),
                        steps_taken: 0,
                    });
                }
                Ok(value) => return CallOutcome::Tool(call.id.clone(), Ok(value)),
                Err(e) => return CallOutcome::Tool(call.id.clone(), Err(e)),
            }
        }

        if call.name == "get_website_screenshot" {
            let outcome = self.registry.execute(&call.name, call.arguments.clone(), ctx).await;
            return CallOutcome::Screenshot(call.id.clone(), call.arguments.clone(), outcome);
        }

        let outcome = self.registry.execute(&call.name, call.arguments.clone(), ctx).await;
        CallOutcome::Tool(call.id.clone(), outcome)
    }
}

enum CallOutcome {
    Tool(String, Result<Value, ToolError>),
    /// Screenshot tool calls split into a `tool` acknowledgement and an
    /// optional synthetic `user` message carrying the image (spec §4.5
    /// step 5).
    Screenshot(String, Value, Result<Value, ToolError>),
    Terminal(AgentLoopOutcome),
}

impl CallOutcome {
    fn into_messages(self) -> (ChatMessage, Option<ChatMessage>) {
        match self {
            CallOutcome::Tool(id, Ok(value)) => (ChatMessage::tool_result(id, value.to_string()), None),
            CallOutcome::Tool(id, Err(e)) => (
                ChatMessage::tool_result(id, json!({"success": false, "error": {"message": e.message}}).to_string()),
                None,
            ),
            CallOutcome::Screenshot(id, args, Ok(value)) => {
                let image_url = value.get("imageUrl").and_then(|v| v.as_str());
                match image_url {
                    Some(url) => {
                        let ack = ChatMessage::tool_result(id, "screenshot captured".to_string());
                        let user_msg = ChatMessage::user_multimodal(json!([
                            {"type": "text", "text": format!("Here is the screenshot for {url}")},
                            {"type": "image_url", "image_url": {"url": url}},
                        ]));
                        (ack, Some(user_msg))
                    }
                    // Lacks imageUrl: emit only a failure acknowledgement
                    // (spec §4.5 step 5).
                    None => {
                        let requested_url = args.get("url").and_then(|v| v.as_str()).unwrap_or("unknown url");
                        (
                            ChatMessage::tool_result(id, format!("screenshot for {requested_url} failed: no image returned")),
                            None,
                        )
                    }
                }
            }
            CallOutcome::Screenshot(id, _args, Err(e)) => {
                (ChatMessage::tool_result(id, format!("screenshot failed: {}", e.message)), None)
            }
            CallOutcome::Terminal(_) => unreachable!("terminal outcomes are handled before flattening"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::embedder::Embedder;
    use crate::clients::image_hash::{ImageHashClient, PdqResult};
    use crate::clients::screenshot::{ScreenshotClient, ScreenshotResult};
    use crate::clients::search::SearchClient;
    use crate::clients::url_scan::{UrlScanClient, UrlScanResult};
    use crate::tools::Scratch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopEmbedder;
    #[async_trait]
    impl Embedder for NoopEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
            Ok(vec![0.0; 384])
        }
    }
    struct NoopImageHash;
    #[async_trait]
    impl ImageHashClient for NoopImageHash {
        async fn hash_bytes(&self, _b: &[u8]) -> Result<PdqResult, CoreError> {
            Ok(PdqResult { hash_hex: "a".repeat(64), quality: 1.0 })
        }
        async fn hash_url(&self, _u: &str) -> Result<PdqResult, CoreError> {
            Ok(PdqResult { hash_hex: "a".repeat(64), quality: 1.0 })
        }
    }
    struct NoopScreenshot;
    #[async_trait]
    impl ScreenshotClient for NoopScreenshot {
        async fn screenshot(&self, _u: &str, _id: &str) -> Result<ScreenshotResult, CoreError> {
            Ok(ScreenshotResult { image_url: Some("https://img/x.png".to_string()), base64: None })
        }
    }
    struct NoopSearch;
    #[async_trait]
    impl SearchClient for NoopSearch {
        async fn search(&self, _q: &str, _id: &str) -> Result<Value, CoreError> {
            Ok(json!({"results": []}))
        }
    }
    struct NoopUrlScan;
    #[async_trait]
    impl UrlScanClient for NoopUrlScan {
        async fn scan(&self, _u: &str, _id: &str) -> Result<UrlScanResult, CoreError> {
            Ok(UrlScanResult { malicious: false, categories: vec![], tags: vec![], has_verdicts: false })
        }
    }

    /// Always calls `submit_report_for_review` with `passedReview=true`
    /// on the first turn (spec §8 property 5: terminates in <= 3 steps).
    struct AlwaysPassLlm;
    #[async_trait]
    impl LlmClient for AlwaysPassLlm {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, CoreError> {
            Ok(ChatResponse {
                content: Some(r#"{"passedReview": true, "feedback": "looks good"}"#.to_string()),
                tool_calls: vec![ToolCallRequest {
                    id: "call-1".to_string(),
                    name: "submit_report_for_review".to_string(),
                    arguments: json!({
                        "report": "The claim is false.",
                        "sources": ["https://example.com/a"],
                        "isControversial": false,
                    }),
                }],
            })
        }
    }

    fn make_context(llm: Arc<dyn LlmClient>) -> ToolContext {
        ToolContext {
            request_id: "req-1".to_string(),
            scratch: Arc::new(parking_lot::Mutex::new(Scratch::default())),
            embedder: Arc::new(NoopEmbedder),
            image_hasher: Arc::new(NoopImageHash),
            screenshot: Arc::new(NoopScreenshot),
            search: Arc::new(NoopSearch),
            url_scan: Arc::new(NoopUrlScan),
            llm,
        }
    }

    #[tokio::test]
    async fn terminates_within_three_steps_on_immediate_pass() {
        let registry = ToolRegistry::new();
        let llm: Arc<dyn LlmClient> = Arc::new(AlwaysPassLlm);
        let agent_loop = AgentLoop::new(&registry, llm.clone(), 50, 50);
        let ctx = make_context(llm);

        let outcome = agent_loop.run(&ctx, "Is the moon made of cheese?").await.unwrap();
        assert!(outcome.steps_taken <= 3);
        assert_eq!(outcome.report, "The claim is false.");
        assert!(!outcome.is_controversial);
    }

    /// Never terminates — used to verify the step-cap bound fires.
    struct NeverPassLlm(AtomicUsize);
    #[async_trait]
    impl LlmClient for NeverPassLlm {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, CoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call-x".to_string(),
                    name: "search_google".to_string(),
                    arguments: json!({"query": "x"}),
                }],
            })
        }
    }

    #[tokio::test]
    async fn exhausts_after_step_cap() {
        let registry = ToolRegistry::new();
        let llm: Arc<dyn LlmClient> = Arc::new(NeverPassLlm(AtomicUsize::new(0)));
        let agent_loop = AgentLoop::new(&registry, llm.clone(), 3, 50);
        let ctx = make_context(llm);

        let err = agent_loop.run(&ctx, "investigate").await.unwrap_err();
        assert!(matches!(err, CoreError::AgentLoopExhausted(_)));
    }
}
