//! Shared error taxonomy for the checkmate core.
//!
//! One enum rather than per-kind structs (contrast the teacher's
//! `utilities::exceptions`, which keeps one struct per error) because the
//! pipeline orchestrator (§4.6) and admission layer (§4.7) both need to
//! pattern-match a failure down to a terminal status or HTTP code, and a
//! single enum is the natural match target for that.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("agent loop exhausted: {0}")]
    AgentLoopExhausted(String),

    #[error("similarity upstream failure: {0}")]
    SimilarityUpstreamFailure(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl CoreError {
    /// HTTP status code for this error, per spec §6 HTTP semantics.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::InvalidFingerprint(_) => StatusCode::BAD_REQUEST,
            CoreError::UpstreamTimeout(_)
            | CoreError::UpstreamFailure(_)
            | CoreError::QuotaExhausted(_)
            | CoreError::AgentLoopExhausted(_)
            | CoreError::SimilarityUpstreamFailure(_)
            | CoreError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps an orchestrator step failure message to a terminal generation
    /// status keyword, per spec §4.6 error policy.
    pub fn phase_status_keyword(phase: &str) -> &'static str {
        if phase.contains("preprocess") {
            "error-preprocessing"
        } else if phase.contains("agent loop") || phase.contains("agent_loop") {
            "error-agentLoop"
        } else if phase.contains("summaris") || phase.contains("summariz") {
            "error-summarization"
        } else if phase.contains("translat") {
            "error-translation"
        } else {
            "error-other"
        }
    }
}
