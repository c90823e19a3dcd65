//! checkmate-core HTTP server binary.
//!
//! Starts an axum HTTP server exposing the consumer-facing check-fact
//! endpoints and the admin consumer-management surface.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `CHECKMATE_SQLITE_PATH` — check-store database file (default: checkmate.db)
//! - `ADMIN_API_KEY` — shared secret for `/consumers*` admin endpoints
//! - `LLM_BASE_URL`, `LLM_API_KEY` — OpenAI-compatible chat-completions endpoint
//! - `EMBEDDER_URL`, `IMAGE_HASH_URL`, `SCREENSHOT_URL`, `SEARCH_URL`, `URL_SCAN_URL`
//! - `VOTING_WEBHOOK_URL`, `MODERATOR_WEBHOOK_URL`
//! - `RUST_LOG` — tracing filter (default: "info,checkmate_core=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use checkmate_core::admission::ConsumerRegistry;
use checkmate_core::clients::embedder::HttpEmbedder;
use checkmate_core::clients::image_hash::HttpImageHashClient;
use checkmate_core::clients::llm::OpenAiCompatClient;
use checkmate_core::clients::screenshot::HttpScreenshotClient;
use checkmate_core::clients::search::HttpSearchClient;
use checkmate_core::clients::url_scan::HttpUrlScanClient;
use checkmate_core::clients::voting::HttpVotingClient;
use checkmate_core::config::Config;
use checkmate_core::ledger::SubmissionLedger;
use checkmate_core::moderator::HttpModeratorClient;
use checkmate_core::pipeline::PipelineOrchestrator;
use checkmate_core::reconciler::AssessmentReconciler;
use checkmate_core::server::{app_router, AppState};
use checkmate_core::similarity::SimilarityEngine;
use checkmate_core::store::SqliteCheckStore;
use checkmate_core::tools::registry::ToolRegistry;
use std::sync::Arc;

/// Model served behind `LLM_BASE_URL`; overridable since the chat-completions
/// API is OpenAI-compatible but hosted by a variety of providers.
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,checkmate_core=debug".into()),
        )
        .init();

    let config = Config::from_env();
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let llm_model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());

    let store: Arc<dyn checkmate_core::store::CheckStore> =
        Arc::new(SqliteCheckStore::open(&config.sqlite_path).expect("failed to open check store"));
    let ledger = Arc::new(SubmissionLedger::open(&config.sqlite_path).expect("failed to open submission ledger"));

    let embedder: Arc<dyn checkmate_core::clients::Embedder> =
        Arc::new(HttpEmbedder::new(config.embedder_base_url.clone()));
    let image_hasher: Arc<dyn checkmate_core::clients::ImageHashClient> =
        Arc::new(HttpImageHashClient::new(config.image_hash_base_url.clone()));
    let screenshot: Arc<dyn checkmate_core::clients::ScreenshotClient> =
        Arc::new(HttpScreenshotClient::new(config.screenshot_base_url.clone()));
    let search: Arc<dyn checkmate_core::clients::SearchClient> =
        Arc::new(HttpSearchClient::new(config.search_base_url.clone()));
    let url_scan: Arc<dyn checkmate_core::clients::UrlScanClient> =
        Arc::new(HttpUrlScanClient::new(config.url_scan_base_url.clone()));
    let llm: Arc<dyn checkmate_core::clients::LlmClient> =
        Arc::new(OpenAiCompatClient::new(config.llm_base_url.clone(), config.llm_api_key.clone(), llm_model));
    let moderator: Arc<dyn checkmate_core::moderator::ModeratorClient> =
        Arc::new(HttpModeratorClient::new(config.moderator_webhook_url.clone()));
    let voting: Arc<dyn checkmate_core::clients::VotingClient> =
        Arc::new(HttpVotingClient::new(config.voting_webhook_url.clone()));

    let similarity = Arc::new(SimilarityEngine::new(
        store.clone(),
        embedder.clone(),
        image_hasher.clone(),
        llm.clone(),
        config.clone(),
    ));
    let tools = Arc::new(ToolRegistry::new());
    let registry = Arc::new(ConsumerRegistry::new());
    let reconciler = Arc::new(AssessmentReconciler::new(store.clone(), moderator.clone()));

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        store.clone(),
        ledger,
        similarity,
        tools,
        embedder.clone(),
        image_hasher,
        screenshot,
        search,
        url_scan,
        llm.clone(),
        moderator.clone(),
        voting,
        config.clone(),
    ));

    let state = AppState {
        store,
        orchestrator,
        reconciler,
        registry,
        moderator,
        embedder,
        llm,
        config,
    };

    let app = app_router(state);

    tracing::info!("checkmate-core server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                — liveness probe");
    tracing::info!("  POST /getAgentResult         — run or reuse a check, full report");
    tracing::info!("  POST /getCommunityNote       — same, minus report");
    tracing::info!("  POST /getEmbedding           — raw text embedding");
    tracing::info!("  POST /getNeedsChecking       — checkability classifier");
    tracing::info!("  GET  /check/{{id}}             — fetch a check");
    tracing::info!("  PATCH /check/{{id}}            — apply a human/voting assessment");
    tracing::info!("  PATCH /check/{{id}}/humanNote  — set the human-authored note");
    tracing::info!("  POST /moderatorCallback      — moderator inline-button webhook");
    tracing::info!("  POST /consumers              — create a consumer (admin)");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.expect("failed to bind");

    axum::serve(listener, app).await.expect("server failed");
}
