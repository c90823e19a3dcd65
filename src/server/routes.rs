//! Axum route handlers for the checkmate-core HTTP server (spec §6).

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::admission::ConsumerRegistry;
use crate::clients::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::clients::Embedder;
use crate::config::Config;
use crate::error::CoreError;
use crate::model::{Check, CheckId, Consumer, HumanResponse, RateLimitConfig};
use crate::moderator::{community_note_buttons, parse_callback, CallbackAction, ModeratorClient};
use crate::pipeline::{CheckRequest, PipelineOrchestrator};
use crate::reconciler::{AssessmentReconciler, AssessmentUpdate};
use crate::store::CheckStore;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CheckStore>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub reconciler: Arc<AssessmentReconciler>,
    pub registry: Arc<ConsumerRegistry>,
    pub moderator: Arc<dyn ModeratorClient>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmClient>,
    pub config: Config,
}

/// Wraps a `CoreError` into the `{success:false, error:{message}}` envelope
/// (spec §7 "user-visible surfaces"), carrying `Retry-After` for 429s.
struct AppError(CoreError);

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = Json(json!({
            "success": false,
            "error": { "message": self.0.to_string() },
        }))
        .into_response();
        *response.status_mut() = self.0.status_code();
        if let CoreError::RateLimited { retry_after_secs } = self.0 {
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", v);
            }
        }
        response
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/getAgentResult", post(get_agent_result_handler))
        .route("/getCommunityNote", post(get_community_note_handler))
        .route("/getEmbedding", post(get_embedding_handler))
        .route("/getNeedsChecking", post(get_needs_checking_handler))
        .route("/check/{id}", get(get_check_handler).patch(patch_check_handler))
        .route("/check/{id}/humanNote", axum::routing::patch(patch_human_note_handler))
        .route("/moderatorCallback", post(moderator_callback_handler))
        .route("/consumers", post(create_consumer_handler).get(list_consumers_handler))
        .route("/consumer/details", get(consumer_details_handler))
        .route(
            "/consumers/{name}",
            axum::routing::delete(delete_consumer_handler).patch(patch_consumer_handler),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Echoes `x-request-id` on every response, generating one if the caller
/// didn't send one (spec §6 "a `x-request-id` header is echoed on every
/// response").
async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let Ok(header_value) = HeaderValue::from_str(&request_id) else {
        return next.run(req).await;
    };
    req.headers_mut().insert("x-request-id", header_value.clone());
    let mut response = next.run(req).await;
    response.headers_mut().insert("x-request-id", header_value);
    response
}

fn consumer_api_key(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError(CoreError::Unauthorized))
}

/// Admits the request against the caller's token bucket and ACL (spec
/// §4.7), returning the consumer so the handler can record call counters
/// on success.
fn authenticate(state: &AppState, headers: &HeaderMap, api: &str) -> Result<Consumer, AppError> {
    let key = consumer_api_key(headers)?;
    state.registry.admit(key, api)?;
    state.registry.find_by_api_key(key).ok_or_else(|| AppError(CoreError::Unauthorized))
}

/// Admin endpoints authenticate via a shared secret rather than a
/// per-consumer key (spec §6: "admin endpoints using signed headers").
fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let provided = headers.get("x-admin-key").and_then(|v| v.to_str().ok());
    if !state.config.admin_api_key.is_empty() && provided == Some(state.config.admin_api_key.as_str()) {
        Ok(())
    } else {
        Err(AppError(CoreError::Unauthorized))
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "checkmate" }))
}

// ---------------------------------------------------------------------------
// getAgentResult / getCommunityNote / check/:id
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CheckRequestBody {
    text: Option<String>,
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
    caption: Option<String>,
    /// Accepted but unused — a single configured `LlmClient` serves every
    /// request rather than switching providers per call.
    #[serde(default)]
    #[allow(dead_code)]
    provider: Option<String>,
    #[serde(rename = "findSimilar", default)]
    find_similar: bool,
}

fn check_result_json(check: &Check, include_report: bool) -> Value {
    let mut result = serde_json::Map::new();
    if include_report {
        result.insert(
            "report".to_string(),
            json!(check.longform_response.as_ref().and_then(|r| r.en.clone())),
        );
    }
    result.insert("communityNote".to_string(), json!(check.shortform_response));
    result.insert("humanNote".to_string(), json!(check.human_response));
    result.insert("isControversial".to_string(), json!(check.is_controversial));
    result.insert("text".to_string(), json!(check.text));
    result.insert("imageUrl".to_string(), json!(check.image_url));
    result.insert("caption".to_string(), json!(check.caption));
    result.insert("isVideo".to_string(), json!(check.is_video));
    result.insert("isAccessBlocked".to_string(), json!(check.is_access_blocked));
    result.insert("title".to_string(), json!(check.title));
    result.insert("slug".to_string(), json!(check.slug));
    result.insert("timestamp".to_string(), json!(check.timestamp));
    result.insert("isHumanAssessed".to_string(), json!(check.is_human_assessed));
    result.insert("isVoteTriggered".to_string(), json!(check.is_vote_triggered));
    result.insert("crowdsourcedCategory".to_string(), json!(check.crowdsourced_category));
    Value::Object(result)
}

async fn run_check(state: &AppState, consumer_name: String, body: CheckRequestBody) -> Result<Check, AppError> {
    if body.text.is_none() == body.image_url.is_none() {
        return Err(AppError(CoreError::InvalidInput(
            "request must carry exactly one of text/imageUrl".to_string(),
        )));
    }
    let req = CheckRequest {
        text: body.text,
        image_url: body.image_url,
        caption: body.caption,
        consumer_name,
        find_similar: body.find_similar,
    };
    Ok(state.orchestrator.process(req).await?)
}

async fn get_agent_result_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CheckRequestBody>,
) -> Result<Json<Value>, AppError> {
    let consumer = authenticate(&state, &headers, "getAgentResult")?;
    let check = run_check(&state, consumer.name.clone(), body).await?;
    state.registry.record_success(&consumer.name, "getAgentResult");
    Ok(Json(json!({
        "success": true,
        "id": check.id.to_hex(),
        "result": check_result_json(&check, true),
    })))
}

async fn get_community_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CheckRequestBody>,
) -> Result<Json<Value>, AppError> {
    let consumer = authenticate(&state, &headers, "getCommunityNote")?;
    let check = run_check(&state, consumer.name.clone(), body).await?;
    state.registry.record_success(&consumer.name, "getCommunityNote");
    Ok(Json(json!({
        "success": true,
        "id": check.id.to_hex(),
        "result": check_result_json(&check, false),
    })))
}

async fn get_check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let consumer = authenticate(&state, &headers, "getAgentResult")?;
    let check_id = CheckId::from_hex(&id).ok_or_else(|| AppError(CoreError::InvalidInput("malformed check id".to_string())))?;
    let check = state
        .store
        .find_by_id(check_id)
        .await?
        .ok_or_else(|| AppError(CoreError::NotFound(format!("check {id}"))))?;
    state.registry.record_success(&consumer.name, "getAgentResult");
    Ok(Json(json!({
        "success": true,
        "id": check.id.to_hex(),
        "result": check_result_json(&check, true),
    })))
}

// ---------------------------------------------------------------------------
// getEmbedding / getNeedsChecking
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EmbeddingRequestBody {
    text: String,
}

async fn get_embedding_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<EmbeddingRequestBody>,
) -> Result<Json<Value>, AppError> {
    let consumer = authenticate(&state, &headers, "getEmbedding")?;
    let embedding = state.embedder.embed(&body.text).await?;
    state.registry.record_success(&consumer.name, "getEmbedding");
    Ok(Json(json!({ "success": true, "result": { "embedding": embedding } })))
}

#[derive(Debug, Deserialize)]
struct NeedsCheckingRequestBody {
    text: String,
}

#[derive(Debug, Deserialize)]
struct NeedsCheckingVerdict {
    #[serde(rename = "needsChecking")]
    needs_checking: bool,
}

async fn get_needs_checking_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NeedsCheckingRequestBody>,
) -> Result<Json<Value>, AppError> {
    let consumer = authenticate(&state, &headers, "getNeedsChecking")?;
    let prompt = format!(
        "Does the following text contain a specific, fact-checkable claim, as opposed to an opinion, greeting, or question? Respond strictly as JSON: {{\"needsChecking\": bool}}\n\n{}",
        body.text
    );
    let req = ChatRequest {
        response_format: Some(json!({"type": "json_object"})),
        ..ChatRequest::new(vec![ChatMessage::user_text(prompt)])
    };
    let resp = state.llm.chat(req).await?;
    let content = resp
        .content
        .ok_or_else(|| AppError(CoreError::UpstreamFailure("needs-checking llm returned no content".to_string())))?;
    let verdict: NeedsCheckingVerdict = serde_json::from_str(&content)
        .map_err(|e| AppError(CoreError::UpstreamFailure(format!("unparsable needs-checking output: {e}"))))?;
    state.registry.record_success(&consumer.name, "getNeedsChecking");
    Ok(Json(json!({ "success": true, "result": { "needsChecking": verdict.needs_checking } })))
}

// ---------------------------------------------------------------------------
// check/:id PATCH routes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct PatchCheckBody {
    #[serde(rename = "isHumanAssessed")]
    is_human_assessed: Option<bool>,
    #[serde(rename = "crowdsourcedCategory")]
    crowdsourced_category: Option<String>,
    #[serde(rename = "isCommunityNoteDownvoted")]
    is_community_note_downvoted: Option<bool>,
}

async fn patch_check_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<PatchCheckBody>,
) -> Result<Json<Value>, AppError> {
    let consumer = authenticate(&state, &headers, "updateCheck")?;
    let check_id = CheckId::from_hex(&id).ok_or_else(|| AppError(CoreError::InvalidInput("malformed check id".to_string())))?;
    state
        .reconciler
        .apply(
            check_id,
            AssessmentUpdate {
                is_human_assessed: body.is_human_assessed,
                crowdsourced_category: body.crowdsourced_category,
                is_community_note_downvoted: body.is_community_note_downvoted,
            },
        )
        .await?;
    state.registry.record_success(&consumer.name, "updateCheck");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct HumanNoteBody {
    en: Option<String>,
    cn: Option<String>,
    ms: Option<String>,
    id: Option<String>,
    ta: Option<String>,
    #[serde(default)]
    links: Vec<String>,
    #[serde(rename = "updatedBy")]
    updated_by: Option<String>,
}

async fn patch_human_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<HumanNoteBody>,
) -> Result<Json<Value>, AppError> {
    let consumer = authenticate(&state, &headers, "updateCheck")?;
    let check_id = CheckId::from_hex(&id).ok_or_else(|| AppError(CoreError::InvalidInput("malformed check id".to_string())))?;
    let human_response = HumanResponse {
        en: body.en,
        cn: body.cn,
        ms: body.ms,
        id: body.id,
        ta: body.ta,
        links: body.links,
        timestamp: Some(chrono::Utc::now()),
        updated_by: body.updated_by,
    };
    let mut partial = HashMap::new();
    partial.insert("human_response".to_string(), json!(human_response));
    state.store.update_fields(check_id, partial).await?;
    state.registry.record_success(&consumer.name, "updateCheck");
    Ok(Json(json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// Moderator webhook (spec §4.8)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ModeratorCallbackBody {
    payload: String,
    #[serde(rename = "senderId")]
    sender_id: Option<String>,
}

async fn moderator_callback_handler(
    State(state): State<AppState>,
    Json(body): Json<ModeratorCallbackBody>,
) -> Result<Json<Value>, AppError> {
    match parse_callback(&body.payload) {
        CallbackAction::Publish(check_id) => {
            let mut partial = HashMap::new();
            partial.insert("is_approved_for_publishing".to_string(), json!(true));
            partial.insert("approved_by".to_string(), json!(body.sender_id));
            state.store.update_fields(check_id, partial).await?;
            rewrite_note_buttons(&state, check_id, true).await;
            Ok(Json(json!({ "success": true })))
        }
        CallbackAction::Unpublish(check_id) => {
            let mut partial = HashMap::new();
            partial.insert("is_approved_for_publishing".to_string(), json!(false));
            partial.insert("approved_by".to_string(), Value::Null);
            state.store.update_fields(check_id, partial).await?;
            rewrite_note_buttons(&state, check_id, false).await;
            Ok(Json(json!({ "success": true })))
        }
        // Acknowledges without raising (spec §4.8).
        CallbackAction::Unknown(_) => Ok(Json(json!({ "success": true, "message": "Unknown action" }))),
    }
}

async fn rewrite_note_buttons(state: &AppState, check_id: CheckId, is_approved: bool) {
    let Ok(Some(check)) = state.store.find_by_id(check_id).await else { return };
    let Some(message_id) = check.community_note_notification_id.clone() else { return };
    let langfuse_url = format!("https://langfuse.internal/checks/{}", check_id.to_hex());
    let buttons = community_note_buttons(check_id, check.is_controversial, is_approved, &langfuse_url);
    let _ = state.moderator.edit_buttons(&message_id, buttons).await;
}

// ---------------------------------------------------------------------------
// Consumer admin routes (spec §4.7, §6)
// ---------------------------------------------------------------------------

fn consumer_json(c: &Consumer) -> Value {
    json!({
        "name": c.name,
        "allowedAPIs": c.allowed_apis,
        "isActive": c.is_active,
        "rateLimit": {
            "millisecondsPerRequest": c.rate_limit.milliseconds_per_request,
            "capacity": c.rate_limit.capacity,
            "millisecondsForUpdates": c.rate_limit.milliseconds_for_updates,
        },
        "totalCalls": c.total_calls,
        "monthlyCalls": c.monthly_calls,
    })
}

#[derive(Debug, Deserialize)]
struct CreateConsumerBody {
    name: String,
    #[serde(rename = "allowedAPIs")]
    allowed_apis: Vec<String>,
    #[serde(rename = "millisecondsPerRequest")]
    milliseconds_per_request: Option<u64>,
    capacity: Option<u32>,
    #[serde(rename = "millisecondsForUpdates")]
    milliseconds_for_updates: Option<u64>,
}

async fn create_consumer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateConsumerBody>,
) -> Result<Json<Value>, AppError> {
    authenticate_admin(&state, &headers)?;
    let defaults = RateLimitConfig::default();
    let rate_limit = RateLimitConfig {
        milliseconds_per_request: body.milliseconds_per_request.unwrap_or(defaults.milliseconds_per_request),
        capacity: body.capacity.unwrap_or(defaults.capacity),
        milliseconds_for_updates: body.milliseconds_for_updates.unwrap_or(defaults.milliseconds_for_updates),
    };
    let consumer = state.registry.create(body.name, body.allowed_apis, rate_limit)?;
    Ok(Json(json!({
        "success": true,
        "result": { "name": consumer.name, "apiKey": consumer.api_key },
    })))
}

async fn list_consumers_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    authenticate_admin(&state, &headers)?;
    let consumers: Vec<Value> = state.registry.list().iter().map(consumer_json).collect();
    Ok(Json(json!({ "success": true, "result": consumers })))
}

/// Self-service: a consumer's own record, looked up by their `x-api-key`
/// rather than an admin secret.
async fn consumer_details_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    let key = consumer_api_key(&headers)?;
    let consumer = state.registry.find_by_api_key(key).ok_or_else(|| AppError(CoreError::Unauthorized))?;
    Ok(Json(json!({ "success": true, "result": consumer_json(&consumer) })))
}

async fn delete_consumer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Value>, AppError> {
    authenticate_admin(&state, &headers)?;
    state
        .registry
        .delete(&name)
        .ok_or_else(|| AppError(CoreError::NotFound(format!("consumer '{name}'"))))?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct PatchConsumerBody {
    #[serde(rename = "allowedAPIs")]
    allowed_apis: Vec<String>,
}

async fn patch_consumer_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<PatchConsumerBody>,
) -> Result<Json<Value>, AppError> {
    authenticate_admin(&state, &headers)?;
    let consumer = state.registry.update_allowed_apis(&name, body.allowed_apis)?;
    Ok(Json(json!({ "success": true, "result": consumer_json(&consumer) })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::image_hash::{ImageHashClient, PdqResult};
    use crate::clients::llm::ChatResponse;
    use crate::clients::screenshot::{ScreenshotClient, ScreenshotResult};
    use crate::clients::search::SearchClient;
    use crate::clients::url_scan::{UrlScanClient, UrlScanResult};
    use crate::clients::voting::{PollId, VotingClient, VotingWebhookPayload};
    use crate::ledger::SubmissionLedger;
    use crate::moderator::InlineButton;
    use crate::similarity::SimilarityEngine;
    use crate::store::SqliteCheckStore;
    use crate::tools::registry::ToolRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    struct NoopEmbedder;
    #[async_trait]
    impl Embedder for NoopEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
            Ok(vec![0.0; crate::clients::embedder::TEXT_EMBEDDING_DIM])
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
        async fn screenshot(&self, _url: &str, _id: &str) -> Result<ScreenshotResult, CoreError> {
            Ok(ScreenshotResult { image_url: None, base64: None })
        }
    }

    struct NoopSearch;
    #[async_trait]
    impl SearchClient for NoopSearch {
        async fn search(&self, _q: &str, _id: &str) -> Result<Value, CoreError> {
            Ok(json!({}))
        }
    }

    struct NoopUrlScan;
    #[async_trait]
    impl UrlScanClient for NoopUrlScan {
        async fn scan(&self, _u: &str, _id: &str) -> Result<UrlScanResult, CoreError> {
            Ok(UrlScanResult { malicious: false, categories: vec![], tags: vec![], has_verdicts: false })
        }
    }

    struct EchoJsonLlm;
    #[async_trait]
    impl LlmClient for EchoJsonLlm {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, CoreError> {
            Ok(ChatResponse { content: Some(json!({"needsChecking": true}).to_string()), tool_calls: vec![] })
        }
    }

    #[derive(Default)]
    struct NoopModerator;
    #[async_trait]
    impl ModeratorClient for NoopModerator {
        async fn send(&self, _message: crate::moderator::ModeratorMessage) -> Result<String, CoreError> {
            Ok("msg-1".to_string())
        }
        async fn edit_buttons(&self, _id: &str, _buttons: Vec<InlineButton>) -> Result<(), CoreError> {
            Ok(())
        }
    }

    struct NoopVoting;
    #[async_trait]
    impl VotingClient for NoopVoting {
        async fn trigger(&self, _payload: VotingWebhookPayload<'_>) -> Result<PollId, CoreError> {
            Ok(PollId("poll-1".to_string()))
        }
    }

    fn make_state() -> AppState {
        let store: Arc<dyn CheckStore> = Arc::new(SqliteCheckStore::open_in_memory().unwrap());
        let ledger = Arc::new(SubmissionLedger::open_in_memory().unwrap());
        let embedder: Arc<dyn Embedder> = Arc::new(NoopEmbedder);
        let image_hasher: Arc<dyn ImageHashClient> = Arc::new(NoopImageHash);
        let llm: Arc<dyn LlmClient> = Arc::new(EchoJsonLlm);
        let config = Config { admin_api_key: "admin-secret".to_string(), ..Config::from_env() };
        let similarity = Arc::new(SimilarityEngine::new(store.clone(), embedder.clone(), image_hasher.clone(), llm.clone(), config.clone()));
        let tools = Arc::new(ToolRegistry::new());
        let moderator: Arc<dyn ModeratorClient> = Arc::new(NoopModerator);
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            store.clone(),
            ledger,
            similarity,
            tools,
            embedder.clone(),
            image_hasher,
            Arc::new(NoopScreenshot),
            Arc::new(NoopSearch),
            Arc::new(NoopUrlScan),
            llm.clone(),
            moderator.clone(),
            Arc::new(NoopVoting),
            config.clone(),
        ));
        let reconciler = Arc::new(AssessmentReconciler::new(store.clone(), moderator.clone()));
        AppState {
            store,
            orchestrator,
            reconciler,
            registry: Arc::new(ConsumerRegistry::new()),
            moderator,
            embedder,
            llm,
            config,
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = app_router(make_state());
        let response = app.oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_api_key_is_unauthorized() {
        let app = app_router(make_state());
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/getEmbedding")
            .header("content-type", "application/json")
            .body(Body::from(json!({"text": "hello"}).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn request_id_is_echoed() {
        let app = app_router(make_state());
        let request = HttpRequest::builder().uri("/health").header("x-request-id", "abc-123").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers().get("x-request-id").unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn consumer_lifecycle_and_rate_limit() {
        let state = make_state();
        let app = app_router(state.clone());

        let create_req = HttpRequest::builder()
            .method("POST")
            .uri("/consumers")
            .header("content-type", "application/json")
            .header("x-admin-key", "admin-secret")
            .body(Body::from(
                json!({
                    "name": "acme",
                    "allowedAPIs": ["getEmbedding"],
                    "capacity": 1,
                    "millisecondsPerRequest": 1000,
                    "millisecondsForUpdates": 1000,
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(create_req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 65536).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        let api_key = json["result"]["apiKey"].as_str().unwrap().to_string();

        let first = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/getEmbedding")
                    .header("content-type", "application/json")
                    .header("x-api-key", &api_key)
                    .body(Body::from(json!({"text": "hello"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/getEmbedding")
                    .header("content-type", "application/json")
                    .header("x-api-key", &api_key)
                    .body(Body::from(json!({"text": "hello"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers().get("retry-after").unwrap(), "1");
    }
}
