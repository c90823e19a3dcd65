//! HTTP server for the check-fact pipeline (spec §6).
//!
//! # Endpoints
//!
//! - `GET  /health`                      — liveness probe
//! - `POST /getAgentResult`               — run or reuse a check, full report
//! - `POST /getCommunityNote`             — same, minus `report`
//! - `POST /getEmbedding`                 — raw text embedding
//! - `POST /getNeedsChecking`              — checkability classifier
//! - `GET  /check/:id`                    — fetch a check, as getAgentResult
//! - `PATCH /check/:id`                   — apply a human/voting assessment
//! - `PATCH /check/:id/humanNote`         — set the human-authored note
//! - `POST /moderatorCallback`            — moderator inline-button webhook
//! - `POST /consumers`                    — create a consumer (admin)
//! - `GET  /consumers`                    — list consumers (admin)
//! - `GET  /consumer/details`             — caller's own consumer record
//! - `DELETE /consumers/:name`            — remove a consumer (admin)
//! - `PATCH /consumers/:name`             — replace a consumer's allowedAPIs (admin)

pub mod routes;

pub use routes::{app_router, AppState};
