//! Pipeline Orchestrator (C6, spec §4.6).
//!
//! Sequences the full check lifecycle. Structured as an explicit step
//! machine per spec §9's design note ("transitions driven by the outcome
//! of each step, not call-stack unwinding"), closer to the teacher's
//! `Crew::kickoff` task-sequencing loop (`crew.rs`) than a single linear
//! function, so the error-kind-to-status mapping in §7 has one obvious
//! place to live.

use crate::agent_loop::AgentLoop;
use crate::clients::voting::VotingWebhookPayload;
use crate::clients::{Embedder, ImageHashClient, ScreenshotClient, SearchClient, UrlScanClient, VotingClient};
use crate::clients::llm::LlmClient;
use crate::config::Config;
use crate::error::CoreError;
use crate::fingerprint::{hash_text, hash_url};
use crate::ledger::{new_submission, SubmissionLedger};
use crate::model::{Check, CheckId, CheckStatus, CheckType, GenerationStatus, ReportResponse};
use crate::moderator::{community_note_buttons, ModeratorClient, ModeratorMessage, NotificationKind};
use crate::similarity::{SimilarityEngine, SubmissionShape};
use crate::store::CheckStore;
use crate::tools::registry::ToolRegistry;
use crate::tools::{ToolContext, Scratch};
use base64::Engine as _;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One inbound request to `/getAgentResult` or `/getCommunityNote` (spec
/// §6).
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub consumer_name: String,
    pub find_similar: bool,
}

/// Content-addressed, read-many-write-once image cache (spec §5 "blob
/// cache for images"). In-process rather than a standalone service since
/// no such collaborator is named among the out-of-scope list in spec §1.
#[derive(Default)]
pub struct BlobCache {
    bytes_by_hash: DashMap<String, Vec<u8>>,
}

impl BlobCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch(&self, url: &str) -> Result<Vec<u8>, CoreError> {
        let key = hash_url(url);
        if let Some(cached) = self.bytes_by_hash.get(&key) {
            return Ok(cached.clone());
        }
        let bytes = reqwest::get(url)
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?
            .to_vec();
        self.bytes_by_hash.insert(key, bytes.clone());
        Ok(bytes)
    }
}

pub struct PipelineOrchestrator {
    store: Arc<dyn CheckStore>,
    ledger: Arc<SubmissionLedger>,
    similarity: Arc<SimilarityEngine>,
    tools: Arc<ToolRegistry>,
    embedder: Arc<dyn Embedder>,
    image_hasher: Arc<dyn ImageHashClient>,
    screenshot: Arc<dyn ScreenshotClient>,
    search: Arc<dyn SearchClient>,
    url_scan: Arc<dyn UrlScanClient>,
    llm: Arc<dyn LlmClient>,
    moderator: Arc<dyn ModeratorClient>,
    voting: Arc<dyn VotingClient>,
    blob_cache: Arc<BlobCache>,
    config: Config,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn CheckStore>,
        ledger: Arc<SubmissionLedger>,
        similarity: Arc<SimilarityEngine>,
        tools: Arc<ToolRegistry>,
        embedder: Arc<dyn Embedder>,
        image_hasher: Arc<dyn ImageHashClient>,
        screenshot: Arc<dyn ScreenshotClient>,
        search: Arc<dyn SearchClient>,
        url_scan: Arc<dyn UrlScanClient>,
        llm: Arc<dyn LlmClient>,
        moderator: Arc<dyn ModeratorClient>,
        voting: Arc<dyn VotingClient>,
        config: Config,
    ) -> Self {
        Self {
            store,
            ledger,
            similarity,
            tools,
            embedder,
            image_hasher,
            screenshot,
            search,
            url_scan,
            llm,
            moderator,
            voting,
            blob_cache: Arc::new(BlobCache::new()),
            config,
        }
    }

    pub async fn process(&self, req: CheckRequest) -> Result<Check, CoreError> {
        let check_type = if req.image_url.is_some() { CheckType::Image } else { CheckType::Text };
        let submission = new_submission(
            req.consumer_name.clone(),
            check_type,
            req.text.clone(),
            req.image_url.clone(),
            req.caption.clone(),
        );
        let request_id = submission.request_id;
        self.ledger.record(submission).await?;

        // Step 2: similarity check, opt-in.
        if req.find_similar {
            let shape = self.submission_shape(&req).await?;
            let result = self.similarity.evaluate(shape).await;
            if result.is_match {
                if let Some(matched_id) = result.matched_check_id {
                    self.ledger.resolve(request_id, matched_id, CheckStatus::Completed).await?;
                    if let Some(check) = self.store.find_by_id(matched_id).await? {
                        return Ok(check);
                    }
                }
            }
        }

        // Step 3: reserve check id, create the check record with
        // precomputed hashes.
        let check = self.build_check_skeleton(&req).await?;
        let check_id = check.id;
        self.store.insert(check.clone()).await?;
        self.ledger.resolve(request_id, check_id, CheckStatus::Pending).await?;
        self.spawn_background_embedding(check_id, req.clone());

        // Step 4: notify moderators of the new check. The notificationId
        // threads all later moderator messages (spec §4.6 step 4, §4.8), so
        // unlike the background embedding write (step 3, best-effort per
        // spec §4.6), a failure here fails the check rather than silently
        // persisting with notification_id=None.
        let step4 = self
            .moderator
            .send(ModeratorMessage {
                kind: NotificationKind::NewCheck,
                text: format!("New check {}: {}", check_id.to_hex(), req.text.as_deref().unwrap_or("[image]")),
                reply_to_message_id: None,
                buttons: vec![],
            })
            .await
            .map_err(|e| CoreError::UpstreamFailure(format!("moderator notify: {e}")));

        match step4 {
            Ok(notification_id) => {
                let mut partial = HashMap::new();
                partial.insert("notification_id".to_string(), json!(notification_id));
                self.store.update_fields(check_id, partial).await?;

                match self.run_generation(check_id, &req).await {
                    Ok(()) => {}
                    Err(e) => self.finish_with_error(check_id, &e).await,
                }
            }
            Err(e) => self.finish_with_error(check_id, &e).await,
        }

        self.store
            .find_by_id(check_id)
            .await?
            .ok_or_else(|| CoreError::InternalError("check vanished after generation".to_string()))
    }

    async fn submission_shape(&self, req: &CheckRequest) -> Result<SubmissionShape, CoreError> {
        if let Some(text) = &req.text {
            return Ok(SubmissionShape::Text { text: text.clone() });
        }
        let image_url = req.image_url.as_deref().ok_or_else(|| {
            CoreError::InvalidInput("request must carry exactly one of text/imageUrl".to_string())
        })?;
        let image_bytes = self.blob_cache.get_or_fetch(image_url).await?;
        if let Some(caption) = req.caption.clone() {
            return Ok(SubmissionShape::ImageWithCaption { image_bytes, caption });
        }
        Ok(SubmissionShape::Image { image_bytes })
    }

    async fn build_check_skeleton(&self, req: &CheckRequest) -> Result<Check, CoreError> {
        let id = CheckId::new();
        if let Some(text) = &req.text {
            let hash = hash_text(text);
            return Ok(Check::new_text(id, text.clone(), hash));
        }
        let image_url = req
            .image_url
            .clone()
            .ok_or_else(|| CoreError::InvalidInput("request must carry exactly one of text/imageUrl".to_string()))?;
        let bytes = self.blob_cache.get_or_fetch(&image_url).await?;
        let pdq = self.image_hasher.hash_bytes(&bytes).await?;
        let caption_hash = req.caption.as_deref().map(hash_text);
        Ok(Check::new_image(id, image_url, req.caption.clone(), pdq.hash_hex, caption_hash))
    }

    /// Fires off the embedding write as a detached task; failures are
    /// logged but never surfaced (spec §4.6 step 3, §4.6 "Background
    /// fan-out").
    fn spawn_background_embedding(&self, check_id: CheckId, req: CheckRequest) {
        let store = self.store.clone();
        let embedder = self.embedder.clone();
        tokio::spawn(async move {
            let text_for_embedding = req.text.clone().or_else(|| req.caption.clone());
            let Some(text) = text_for_embedding else { return };
            let field = if req.text.is_some() { "text_embedding" } else { "caption_embedding" };
            match embedder.embed(&text).await {
                Ok(embedding) => {
                    let mut partial = HashMap::new();
                    partial.insert(field.to_string(), json!(embedding));
                    if let Err(e) = store.update_fields(check_id, partial).await {
                        tracing::warn!(check_id = %check_id, error = %e, "background embedding persist failed");
                    }
                }
                Err(e) => tracing::warn!(check_id = %check_id, error = %e, "background embedding fetch failed"),
            }
        });
    }

    /// Steps 5-13. Each failure here is caught by `process` and mapped to
    /// a terminal status.
    async fn run_generation(&self, check_id: CheckId, req: &CheckRequest) -> Result<(), CoreError> {
        let scratch = Arc::new(parking_lot::Mutex::new(Scratch::default()));
        let ctx = ToolContext {
            request_id: check_id.to_hex(),
            scratch: scratch.clone(),
            embedder: self.embedder.clone(),
            image_hasher: self.image_hasher.clone(),
            screenshot: self.screenshot.clone(),
            search: self.search.clone(),
            url_scan: self.url_scan.clone(),
            llm: self.llm.clone(),
        };

        // Step 5: download image, base64 for downstream prompts.
        let image_base64 = if let Some(url) = &req.image_url {
            let bytes = self.blob_cache.get_or_fetch(url).await?;
            Some(base64::engine::general_purpose::STANDARD.encode(bytes))
        } else {
            None
        };

        // Step 6: extract URLs.
        let source_text = req.text.clone().unwrap_or_else(|| req.caption.clone().unwrap_or_default());
        let mut extract_params = serde_json::Map::new();
        extract_params.insert("text".to_string(), json!(source_text));
        if let Some(b64) = &image_base64 {
            extract_params.insert("imageBase64".to_string(), json!(b64));
        }
        let extracted = self
            .tools
            .execute("extract_image_urls", Value::Object(extract_params), &ctx)
            .await
            .map_err(|e| CoreError::UpstreamFailure(format!("url extraction: {}", e.message)))?;
        let urls: Vec<String> = extracted
            .get("urls")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        // Step 7: preprocess. Screenshot every extracted URL in parallel.
        let screenshots: Vec<Value> = join_all(urls.iter().map(|url| async {
            self.screenshot.screenshot(url, &check_id.to_hex()).await.ok().and_then(|r| r.image_url)
        }))
        .await
        .into_iter()
        .flatten()
        .map(|image_url| json!({"type": "image_url", "image_url": {"url": image_url}}))
        .collect();

        let mut content = format!("Claim: {source_text}");
        if let Some(caption) = &req.caption {
            content = format!("Caption: {caption}\n{content}");
        }
        if !screenshots.is_empty() {
            content.push_str(&format!("\n({} reference screenshot(s) attached)", screenshots.len()));
        }

        let preprocess = self
            .tools
            .execute("preprocess_inputs", json!({"content": content}), &ctx)
            .await
            .map_err(|e| CoreError::UpstreamFailure(format!("preprocessing: {}", e.message)))?;

        let mut partial = HashMap::new();
        partial.insert("title".to_string(), preprocess.get("title").cloned().unwrap_or(Value::Null));
        partial.insert("is_access_blocked".to_string(), preprocess.get("isAccessBlocked").cloned().unwrap_or(json!(false)));
        partial.insert("is_video".to_string(), preprocess.get("isVideo").cloned().unwrap_or(json!(false)));
        self.store.update_fields(check_id, partial).await?;

        let starting_content = preprocess
            .get("startingContent")
            .and_then(|v| v.as_str())
            .unwrap_or(&content)
            .to_string();

        // Step 8: agent loop.
        let agent_loop = AgentLoop::new(&self.tools, self.llm.clone(), self.config.agent_loop_max_steps, self.config.agent_loop_max_history);
        let outcome = agent_loop
            .run(&ctx, &starting_content)
            .await
            .map_err(|e| CoreError::UpstreamFailure(format!("agent loop: {e}")))?;

        let mut partial = HashMap::new();
        partial.insert(
            "longform_response".to_string(),
            json!(ReportResponse { en: Some(outcome.report.clone()), links: outcome.sources.clone(), timestamp: Some(chrono::Utc::now()), ..Default::default() }),
        );
        partial.insert("is_controversial".to_string(), json!(outcome.is_controversial));
        self.store.update_fields(check_id, partial).await?;

        // Step 9: summarise.
        let summary = self
            .tools
            .execute("summarise_report", json!({"report": outcome.report}), &ctx)
            .await
            .map_err(|e| CoreError::UpstreamFailure(format!("summarise: {}", e.message)))?;
        let summary_text = summary.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();

        // Step 10: translate in parallel. A translation failure fails
        // generation rather than persisting with a missing field — spec
        // §4.6's error policy maps a `translate` failure to
        // `error-translation`, which only `finish_with_error` can set, so
        // this step must surface `Err` the same way step 9 does.
        const LANGUAGES: [(&str, &str); 4] = [("cn", "Chinese"), ("ms", "Malay"), ("id", "Indonesian"), ("ta", "Tamil")];
        let translations: Vec<Result<(&str, String), CoreError>> = join_all(LANGUAGES.iter().map(|(code, name)| {
            let ctx = &ctx;
            let summary_text = summary_text.clone();
            async move {
                let result = self
                    .tools
                    .execute("translate_text", json!({"text": summary_text, "targetLanguage": name}), ctx)
                    .await
                    .map_err(|e| CoreError::UpstreamFailure(format!("translate ({name}): {}", e.message)))?;
                let translation = result
                    .get("translation")
                    .and_then(|t| t.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| CoreError::UpstreamFailure(format!("translate ({name}): missing translation field")))?;
                Ok((*code, translation))
            }
        }))
        .await;

        let mut shortform = ReportResponse { en: Some(summary_text), links: outcome.sources.clone(), timestamp: Some(chrono::Utc::now()), ..Default::default() };
        for result in translations {
            let (code, translation) = result?;
            match code {
                "cn" => shortform.cn = Some(translation),
                "ms" => shortform.ms = Some(translation),
                "id" => shortform.id = Some(translation),
                "ta" => shortform.ta = Some(translation),
                _ => unreachable!(),
            }
        }

        // Step 11: persist short-form response, mark completed.
        let mut partial = HashMap::new();
        partial.insert("shortform_response".to_string(), json!(shortform));
        partial.insert("generation_status".to_string(), json!(GenerationStatus::Completed));
        self.store.update_fields(check_id, partial).await?;

        // Step 12: notify moderators of the completed note.
        let buttons = community_note_buttons(check_id, outcome.is_controversial, false, &format!("https://langfuse.internal/checks/{}", check_id.to_hex()));
        let note_notification_id = self
            .moderator
            .send(ModeratorMessage {
                kind: NotificationKind::CommunityNote,
                text: format!("Community note ready for {}", check_id.to_hex()),
                reply_to_message_id: self.store.find_by_id(check_id).await?.and_then(|c| c.notification_id),
                buttons,
            })
            .await
            .ok();
        if let Some(id) = note_notification_id {
            let mut partial = HashMap::new();
            partial.insert("community_note_notification_id".to_string(), json!(id));
            self.store.update_fields(check_id, partial).await?;
        }

        // Step 13: trigger voting exactly once; tolerate 409 as success.
        self.trigger_voting(check_id, req).await?;

        Ok(())
    }

    async fn trigger_voting(&self, check_id: CheckId, req: &CheckRequest) -> Result<(), CoreError> {
        let Some(check) = self.store.find_by_id(check_id).await? else {
            return Err(CoreError::NotFound(format!("check {}", check_id.to_hex())));
        };
        let longform = check.longform_response.clone().unwrap_or_default();
        let shortform = check.shortform_response.clone().unwrap_or_default();
        let longform_value = serde_json::to_value(&longform).unwrap_or(Value::Null);
        let shortform_value = serde_json::to_value(&shortform).unwrap_or(Value::Null);
        let check_id_hex = check_id.to_hex();
        let payload = VotingWebhookPayload {
            check_id: &check_id_hex,
            text: req.text.as_deref(),
            image_url: req.image_url.as_deref(),
            caption: req.caption.as_deref(),
            longform_response: &longform_value,
            shortform_response: &shortform_value,
        };
        let poll_id = self.voting.trigger(payload).await?;
        let mut partial = HashMap::new();
        partial.insert("is_vote_triggered".to_string(), json!(true));
        partial.insert("poll_id".to_string(), json!(poll_id.0));
        self.store.update_fields(check_id, partial).await?;
        Ok(())
    }

    /// Error policy (spec §4.6): classify the failing phase, persist a
    /// terminal status, still run the completion notification with
    /// `isError=true`, and still attempt to trigger voting.
    async fn finish_with_error(&self, check_id: CheckId, err: &CoreError) {
        let phase = err.to_string();
        let keyword = CoreError::phase_status_keyword(&phase);
        let status = GenerationStatus::from_phase_keyword(keyword);

        let mut partial = HashMap::new();
        partial.insert("generation_status".to_string(), json!(status));
        if let Err(e) = self.store.update_fields(check_id, partial).await {
            tracing::error!(check_id = %check_id, error = %e, "failed to persist terminal error status");
        }

        let _ = self
            .moderator
            .send(ModeratorMessage {
                kind: NotificationKind::CommunityNote,
                text: format!("Check {} failed during generation: {err}", check_id.to_hex()),
                reply_to_message_id: self.store.find_by_id(check_id).await.ok().flatten().and_then(|c| c.notification_id),
                buttons: vec![],
            })
            .await;

        if let Ok(Some(check)) = self.store.find_by_id(check_id).await {
            let req = CheckRequest {
                text: check.text.clone(),
                image_url: check.image_url.clone(),
                caption: check.caption.clone(),
                consumer_name: String::new(),
                find_similar: false,
            };
            let _ = self.trigger_voting(check_id, &req).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::image_hash::PdqResult;
    use crate::clients::llm::{ChatRequest, ChatResponse, ToolCallRequest};
    use crate::clients::screenshot::ScreenshotResult;
    use crate::clients::url_scan::UrlScanResult;
    use crate::clients::voting::PollId;
    use crate::moderator::InlineButton;
    use crate::store::SqliteCheckStore;
    use async_trait::async_trait;

    struct FakeEmbedder;
    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
            Ok(vec![0.0; crate::clients::embedder::TEXT_EMBEDDING_DIM])
        }
    }

    struct FakeImageHash;
    #[async_trait]
    impl ImageHashClient for FakeImageHash {
        async fn hash_bytes(&self, _b: &[u8]) -> Result<PdqResult, CoreError> {
            Ok(PdqResult { hash_hex: "c".repeat(64), quality: 1.0 })
        }
        async fn hash_url(&self, _u: &str) -> Result<PdqResult, CoreError> {
            Ok(PdqResult { hash_hex: "c".repeat(64), quality: 1.0 })
        }
    }

    struct FakeScreenshot;
    #[async_trait]
    impl ScreenshotClient for FakeScreenshot {
        async fn screenshot(&self, _url: &str, _id: &str) -> Result<ScreenshotResult, CoreError> {
            Ok(ScreenshotResult { image_url: Some("https://img/cached.png".to_string()), base64: None })
        }
    }

    struct FakeSearch;
    #[async_trait]
    impl SearchClient for FakeSearch {
        async fn search(&self, _q: &str, _id: &str) -> Result<Value, CoreError> {
            Ok(json!({"results": [{"title": "source"}]}))
        }
    }

    struct FakeUrlScan;
    #[async_trait]
    impl UrlScanClient for FakeUrlScan {
        async fn scan(&self, _u: &str, _id: &str) -> Result<UrlScanResult, CoreError> {
            Ok(UrlScanResult { malicious: false, categories: vec![], tags: vec![], has_verdicts: false })
        }
    }

    /// A single fake LLM that discriminates by prompt shape, since every
    /// pipeline step reuses the same `LlmClient` for a different purpose.
    struct ScriptedLlm;
    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, CoreError> {
            if req.tool_choice_required {
                return Ok(ChatResponse {
                    content: None,
                    tool_calls: vec![ToolCallRequest {
                        id: "call-1".to_string(),
                        name: "submit_report_for_review".to_string(),
                        arguments: json!({
                            "report": "The claim does not hold up to scrutiny.",
                            "sources": ["https://example.com/a"],
                            "isControversial": false,
                        }),
                    }],
                });
            }
            let first_text = req
                .messages
                .first()
                .and_then(|m| m.content.as_str())
                .unwrap_or_default()
                .to_string();
            if first_text.contains("infer the user's intent") {
                return Ok(ChatResponse {
                    content: Some(
                        json!({
                            "intent": "verify claim",
                            "isAccessBlocked": false,
                            "isVideo": false,
                            "title": "Claim under review",
                            "startingContent": "Claim: the moon is made of cheese",
                        })
                        .to_string(),
                    ),
                    tool_calls: vec![],
                });
            }
            if first_text.contains("Respond strictly as JSON") {
                return Ok(ChatResponse {
                    content: Some(json!({"passedReview": true, "feedback": "solid"}).to_string()),
                    tool_calls: vec![],
                });
            }
            if first_text.contains("Summarise this fact-check report") {
                return Ok(ChatResponse { content: Some("Short community note summary.".to_string()), tool_calls: vec![] });
            }
            if first_text.contains("Translate the following text") {
                return Ok(ChatResponse { content: Some("translated text".to_string()), tool_calls: vec![] });
            }
            Ok(ChatResponse { content: Some("{}".to_string()), tool_calls: vec![] })
        }
    }

    #[derive(Default)]
    struct RecordingModerator;
    #[async_trait]
    impl ModeratorClient for RecordingModerator {
        async fn send(&self, _message: ModeratorMessage) -> Result<String, CoreError> {
            Ok("moderator-msg-1".to_string())
        }
        async fn edit_buttons(&self, _id: &str, _buttons: Vec<InlineButton>) -> Result<(), CoreError> {
            Ok(())
        }
    }

    struct FakeVoting;
    #[async_trait]
    impl VotingClient for FakeVoting {
        async fn trigger(&self, _payload: VotingWebhookPayload<'_>) -> Result<PollId, CoreError> {
            Ok(PollId("poll-1".to_string()))
        }
    }

    fn make_orchestrator() -> PipelineOrchestrator {
        let store: Arc<dyn CheckStore> = Arc::new(SqliteCheckStore::open_in_memory().unwrap());
        let ledger = Arc::new(SubmissionLedger::open_in_memory().unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder);
        let image_hasher: Arc<dyn ImageHashClient> = Arc::new(FakeImageHash);
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm);
        let similarity = Arc::new(SimilarityEngine::new(store.clone(), embedder.clone(), image_hasher.clone(), llm.clone(), Config::from_env()));
        let tools = Arc::new(ToolRegistry::new());
        PipelineOrchestrator::new(
            store,
            ledger,
            similarity,
            tools,
            embedder,
            image_hasher,
            Arc::new(FakeScreenshot),
            Arc::new(FakeSearch),
            Arc::new(FakeUrlScan),
            llm,
            Arc::new(RecordingModerator),
            Arc::new(FakeVoting),
            Config::from_env(),
        )
    }

    /// S5: fresh check happy path (spec §8 scenario S5).
    #[tokio::test]
    async fn s5_fresh_check_completes_with_translations_and_vote_triggered() {
        let orchestrator = make_orchestrator();
        let req = CheckRequest {
            text: Some("The moon is made of cheese".to_string()),
            image_url: None,
            caption: None,
            consumer_name: "acme".to_string(),
            find_similar: false,
        };

        let check = orchestrator.process(req).await.unwrap();

        assert_eq!(check.generation_status, GenerationStatus::Completed);
        let shortform = check.shortform_response.unwrap();
        assert!(shortform.en.is_some());
        assert!(shortform.cn.is_some());
        assert!(shortform.ms.is_some());
        assert!(shortform.id.is_some());
        assert!(shortform.ta.is_some());
        assert!(check.is_vote_triggered);
        assert_eq!(check.poll_id, Some("poll-1".to_string()));
    }

    #[tokio::test]
    async fn text_hash_hit_returns_cached_check_without_regenerating() {
        let orchestrator = make_orchestrator();
        let first = orchestrator
            .process(CheckRequest {
                text: Some("Donald Trump is the president".to_string()),
                image_url: None,
                caption: None,
                consumer_name: "acme".to_string(),
                find_similar: false,
            })
            .await
            .unwrap();

        let second = orchestrator
            .process(CheckRequest {
                text: Some("Donald Trump is the president".to_string()),
                image_url: None,
                caption: None,
                consumer_name: "acme".to_string(),
                find_similar: true,
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
    }
}
