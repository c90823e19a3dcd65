//! Concrete tools (spec §4.4 canonical set).

use super::{object_schema, CheckTool, ToolContext, ToolError, ToolOutcome};
use crate::clients::llm::{ChatMessage, ChatRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

fn param_str(params: &Value, name: &str) -> Result<String, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ToolError::new(format!("missing required parameter '{name}'")))
}

// ---------------------------------------------------------------------------
// search_google
// ---------------------------------------------------------------------------

pub struct SearchGoogleTool;

#[async_trait]
impl CheckTool for SearchGoogleTool {
    fn name(&self) -> &str {
        "search_google"
    }

    fn description(&self) -> &str {
        "Search the public web for information relevant to the claim under review."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"query": {"type": "string", "description": "search query"}}), &["query"])
    }

    fn quota_limit(&self) -> Option<u32> {
        Some(5)
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let query = param_str(&params, "query")?;
        ctx.search
            .search(&query, &ctx.request_id)
            .await
            .map_err(|e| ToolError::new(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// get_website_screenshot
// ---------------------------------------------------------------------------

pub struct ScreenshotTool;

#[async_trait]
impl CheckTool for ScreenshotTool {
    fn name(&self) -> &str {
        "get_website_screenshot"
    }

    fn description(&self) -> &str {
        "Capture a screenshot of the given URL for visual inspection."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"url": {"type": "string", "description": "URL to capture"}}), &["url"])
    }

    fn quota_limit(&self) -> Option<u32> {
        Some(5)
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let url = param_str(&params, "url")?;
        let result = ctx
            .screenshot
            .screenshot(&url, &ctx.request_id)
            .await
            .map_err(|e| ToolError::new(e.to_string()))?;
        serde_json::to_value(&serde_json::Map::from_iter([
            ("imageUrl".to_string(), json!(result.image_url)),
            ("base64".to_string(), json!(result.base64)),
        ]))
        .map_err(|e| ToolError::new(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// check_malicious_url (alias scan_url)
// ---------------------------------------------------------------------------

pub struct UrlScanTool;

#[async_trait]
impl CheckTool for UrlScanTool {
    fn name(&self) -> &str {
        "check_malicious_url"
    }

    fn description(&self) -> &str {
        "Check whether a URL is flagged as malicious or suspicious by a reputation scanner."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"url": {"type": "string"}}), &["url"])
    }

    fn quota_limit(&self) -> Option<u32> {
        Some(5)
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let url = param_str(&params, "url")?;
        let result = ctx
            .url_scan
            .scan(&url, &ctx.request_id)
            .await
            .map_err(|e| ToolError::new(e.to_string()))?;
        serde_json::to_value(result).map_err(|e| ToolError::new(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// search_internal
// ---------------------------------------------------------------------------

/// Internal-search reuses the same search collaborator interface as
/// `search_google` — the internal document index is an out-of-scope
/// collaborator per spec §1, so this tool only differs in intent, not in
/// wire shape.
pub struct SearchInternalTool;

#[async_trait]
impl CheckTool for SearchInternalTool {
    fn name(&self) -> &str {
        "search_internal"
    }

    fn description(&self) -> &str {
        "Search CheckMate's own archive of prior fact-checks for related context."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"query": {"type": "string"}}), &["query"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let query = param_str(&params, "query")?;
        ctx.search
            .search(&query, &ctx.request_id)
            .await
            .map_err(|e| ToolError::new(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// preprocess_inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PreprocessResponse {
    intent: String,
    #[serde(rename = "isAccessBlocked")]
    is_access_blocked: bool,
    #[serde(rename = "isVideo")]
    is_video: bool,
    title: String,
    #[serde(rename = "startingContent")]
    starting_content: String,
}

pub struct PreprocessInputsTool;

#[async_trait]
impl CheckTool for PreprocessInputsTool {
    fn name(&self) -> &str {
        "preprocess_inputs"
    }

    fn description(&self) -> &str {
        "Infer the user's intent and starting research content from the raw submission."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"content": {"type": "string"}}), &["content"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let content = param_str(&params, "content")?;
        let schema = json!({
            "type": "json_schema",
            "json_schema": {
                "name": "preprocess_result",
                "schema": {
                    "type": "object",
                    "properties": {
                        "intent": {"type": "string"},
                        "isAccessBlocked": {"type": "boolean"},
                        "isVideo": {"type": "boolean"},
                        "title": {"type": "string"},
                        "startingContent": {"type": "string"},
                    },
                    "required": ["intent", "isAccessBlocked", "isVideo", "title", "startingContent"],
                    "additionalProperties": false,
                },
                "strict": true,
            }
        });
        let prompt = format!(
            "Given this submission, infer the user's intent, whether it references access-blocked content, whether it is a video, a short title, and the starting research content.\n\n{content}"
        );
        let req = ChatRequest {
            response_format: Some(schema),
            ..ChatRequest::new(vec![ChatMessage::user_text(prompt)])
        };
        let resp = ctx.llm.chat(req).await.map_err(|e| ToolError::new(e.to_string()))?;
        let text = resp.content.ok_or_else(|| ToolError::new("preprocess llm returned no content"))?;
        let parsed: PreprocessResponse =
            serde_json::from_str(&text).map_err(|e| ToolError::new(format!("unparsable preprocess output: {e}")))?;

        {
            let mut scratch = ctx.scratch.lock();
            scratch.intent = Some(parsed.intent.clone());
            scratch.starting_content = Some(parsed.starting_content.clone());
        }

        Ok(json!({
            "intent": parsed.intent,
            "isAccessBlocked": parsed.is_access_blocked,
            "isVideo": parsed.is_video,
            "title": parsed.title,
            "startingContent": parsed.starting_content,
        }))
    }
}

// ---------------------------------------------------------------------------
// extract_image_urls
// ---------------------------------------------------------------------------

pub struct ExtractImageUrlsTool;

impl ExtractImageUrlsTool {
    fn regex() -> &'static regex::Regex {
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new(r"https?://[^\s<>\)\]]+").unwrap());
        &RE
    }
}

#[async_trait]
impl CheckTool for ExtractImageUrlsTool {
    fn name(&self) -> &str {
        "extract_image_urls"
    }

    fn description(&self) -> &str {
        "Extract and deduplicate URLs referenced in the submission text (regex scan), optionally supplemented by OCR of an attached image."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "text": {"type": "string"},
                "imageBase64": {"type": ["string", "null"]},
            }),
            &["text"],
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let text = param_str(&params, "text")?;
        let mut urls: Vec<String> = Self::regex().find_iter(&text).map(|m| m.as_str().to_string()).collect();

        if let Some(image_b64) = params.get("imageBase64").and_then(|v| v.as_str()) {
            let prompt = format!(
                "List every URL visible in this image (one per line). If the image is given as base64 below, read any rendered text for URLs.\n\n{image_b64}"
            );
            if let Ok(resp) = ctx.llm.chat(ChatRequest::new(vec![ChatMessage::user_text(prompt)])).await {
                if let Some(text) = resp.content {
                    urls.extend(Self::regex().find_iter(&text).map(|m| m.as_str().to_string()));
                }
            }
        }

        let mut seen = HashSet::new();
        let deduped: Vec<String> = urls
            .into_iter()
            .filter(|u| seen.insert(crate::fingerprint::hash_url(u)))
            .collect();

        ctx.scratch.lock().extracted_image_urls = deduped.clone();
        Ok(json!({ "urls": deduped }))
    }
}

// ---------------------------------------------------------------------------
// summarise_report
// ---------------------------------------------------------------------------

pub struct SummariseReportTool;

#[async_trait]
impl CheckTool for SummariseReportTool {
    fn name(&self) -> &str {
        "summarise_report"
    }

    fn description(&self) -> &str {
        "Summarise a long-form fact-check report into a 50-100 word community note."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(json!({"report": {"type": "string"}}), &["report"])
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let report = param_str(&params, "report")?;
        let prompt = format!(
            "Summarise this fact-check report into a neutral community note of 50 to 100 words:\n\n{report}"
        );
        let resp = ctx
            .llm
            .chat(ChatRequest::new(vec![ChatMessage::user_text(prompt)]))
            .await
            .map_err(|e| ToolError::new(e.to_string()))?;
        let summary = resp.content.ok_or_else(|| ToolError::new("summarise llm returned no content"))?;
        Ok(json!({ "summary": summary }))
    }
}

// ---------------------------------------------------------------------------
// translate_text
// ---------------------------------------------------------------------------

pub struct TranslateTextTool;

#[async_trait]
impl CheckTool for TranslateTextTool {
    fn name(&self) -> &str {
        "translate_text"
    }

    fn description(&self) -> &str {
        "Translate text into the given target language."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({"text": {"type": "string"}, "targetLanguage": {"type": "string"}}),
            &["text", "targetLanguage"],
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let text = param_str(&params, "text")?;
        let target = param_str(&params, "targetLanguage")?;
        let prompt = format!("Translate the following text into {target}. Return only the translation.\n\n{text}");
        let resp = ctx
            .llm
            .chat(ChatRequest::new(vec![ChatMessage::user_text(prompt)]))
            .await
            .map_err(|e| ToolError::new(e.to_string()))?;
        let translation = resp.content.ok_or_else(|| ToolError::new("translate llm returned no content"))?;
        Ok(json!({ "translation": translation }))
    }
}

// ---------------------------------------------------------------------------
// submit_report_for_review
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReviewVerdict {
    #[serde(rename = "passedReview")]
    passed_review: bool,
    #[allow(dead_code)]
    feedback: String,
}

pub struct SubmitReportForReviewTool;

#[async_trait]
impl CheckTool for SubmitReportForReviewTool {
    fn name(&self) -> &str {
        "submit_report_for_review"
    }

    fn description(&self) -> &str {
        "Submit the draft report, sources, and controversy flag for reviewer sign-off. Terminates the agent loop when the reviewer approves."
    }

    fn parameters_schema(&self) -> Value {
        object_schema(
            json!({
                "report": {"type": "string"},
                "sources": {"type": "array", "items": {"type": "string"}},
                "isControversial": {"type": "boolean"},
            }),
            &["report", "sources", "isControversial"],
        )
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let report = param_str(&params, "report")?;
        let sources: Vec<String> = params
            .get("sources")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let is_controversial = params.get("isControversial").and_then(|v| v.as_bool()).unwrap_or(false);

        let intent = ctx.scratch.lock().intent.clone().unwrap_or_default();
        let formatted_sources = sources.join("\n");
        let prompt = format!(
            "User intent: {intent}\n\nDraft report:\n{report}\n\nSources:\n{formatted_sources}\n\nRespond strictly as JSON: {{\"passedReview\": bool, \"feedback\": string}}"
        );
        let schema = json!({"type": "json_object"});
        let req = ChatRequest {
            response_format: Some(schema),
            ..ChatRequest::new(vec![ChatMessage::user_text(prompt)])
        };

        // Parse failure defaults to passedReview=true to avoid infinite
        // loops (spec §4.5 review sub-protocol). A reviewer-LLM call
        // failure is a different, broader failure class — it surfaces as
        // a tool error rather than silently auto-approving.
        let resp = ctx.llm.chat(req).await.map_err(|e| ToolError::new(format!("reviewer llm call failed: {e}")))?;
        let passed_review = match resp.content.and_then(|c| serde_json::from_str::<ReviewVerdict>(&c).ok()) {
            Some(verdict) => verdict.passed_review,
            None => true,
        };

        Ok(json!({
            "passedReview": passed_review,
            "report": report,
            "sources": sources,
            "isControversial": is_controversial,
        }))
    }
}
