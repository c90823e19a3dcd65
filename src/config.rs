//! Runtime configuration, loaded from the environment.
//!
//! Mirrors the teacher's `src/bin/server.rs` pattern of reading `PORT` /
//! `DATABASE_URL` / `RUST_LOG` with sane defaults, extended with the
//! thresholds spec §4.2 requires to stay "configurable without code change".

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub sqlite_path: String,

    /// Cosine-similarity threshold above which a text vector match is
    /// considered a candidate (spec §4.2, default 0.85).
    pub text_similarity_threshold: f64,
    /// Hamming-distance threshold below which a PDQ candidate is a match
    /// (spec §4.2, default 31).
    pub pdq_hamming_threshold: u32,
    /// Whether to additionally filter vector search candidates by
    /// `isHumanAssessed=true` (spec §9 Open Question — production only).
    pub filter_human_assessed_in_vector_search: bool,

    pub embedder_base_url: String,
    pub image_hash_base_url: String,
    pub screenshot_base_url: String,
    pub search_base_url: String,
    pub url_scan_base_url: String,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub voting_webhook_url: String,
    pub moderator_webhook_url: String,

    /// Shared secret admin endpoints (`/consumers*`) require in `x-admin-key`
    /// (spec §6: "admin endpoints using signed headers").
    pub admin_api_key: String,

    pub same_claim_llm_timeout_secs: u64,
    pub agent_loop_max_steps: usize,
    pub agent_loop_max_history: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 8080),
            sqlite_path: env::var("CHECKMATE_SQLITE_PATH")
                .unwrap_or_else(|_| "checkmate.db".to_string()),
            text_similarity_threshold: env_parse("TEXT_SIMILARITY_THRESHOLD", 0.85),
            pdq_hamming_threshold: env_parse("PDQ_HAMMING_THRESHOLD", 31),
            filter_human_assessed_in_vector_search: env::var("ENVIRONMENT")
                .map(|v| v == "production")
                .unwrap_or(false),
            embedder_base_url: env::var("EMBEDDER_URL")
                .unwrap_or_else(|_| "http://localhost:9001".to_string()),
            image_hash_base_url: env::var("IMAGE_HASH_URL")
                .unwrap_or_else(|_| "http://localhost:9002".to_string()),
            screenshot_base_url: env::var("SCREENSHOT_URL")
                .unwrap_or_else(|_| "http://localhost:9003".to_string()),
            search_base_url: env::var("SEARCH_URL")
                .unwrap_or_else(|_| "http://localhost:9004".to_string()),
            url_scan_base_url: env::var("URL_SCAN_URL")
                .unwrap_or_else(|_| "http://localhost:9005".to_string()),
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            voting_webhook_url: env::var("VOTING_WEBHOOK_URL")
                .unwrap_or_else(|_| "http://localhost:9006/polls/webhook".to_string()),
            moderator_webhook_url: env::var("MODERATOR_WEBHOOK_URL")
                .unwrap_or_else(|_| "http://localhost:9007".to_string()),
            admin_api_key: env::var("ADMIN_API_KEY").unwrap_or_default(),
            same_claim_llm_timeout_secs: env_parse("SAME_CLAIM_LLM_TIMEOUT_SECS", 30),
            agent_loop_max_steps: env_parse("AGENT_LOOP_MAX_STEPS", 50),
            agent_loop_max_history: env_parse("AGENT_LOOP_MAX_HISTORY", 50),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
