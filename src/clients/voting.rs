//! `POST /polls/webhook` voting trigger (spec §6, §4.6 step 13).
//!
//! `2xx` returns `{id}`; `409` returns the existing `{id}` — both are
//! treated as success by the caller, which is what makes the trigger
//! idempotent (spec §8 property 6).

use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct VotingWebhookPayload<'a> {
    #[serde(rename = "checkId")]
    pub check_id: &'a str,
    pub text: Option<&'a str>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<&'a str>,
    pub caption: Option<&'a str>,
    #[serde(rename = "longformResponse")]
    pub longform_response: &'a serde_json::Value,
    #[serde(rename = "shortformResponse")]
    pub shortform_response: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    id: String,
}

/// Outcome of triggering the voting webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollId(pub String);

#[async_trait]
pub trait VotingClient: Send + Sync {
    async fn trigger(&self, payload: VotingWebhookPayload<'_>) -> Result<PollId, CoreError>;
}

pub struct HttpVotingClient {
    client: reqwest::Client,
    webhook_url: String,
}

impl HttpVotingClient {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl VotingClient for HttpVotingClient {
    async fn trigger(&self, payload: VotingWebhookPayload<'_>) -> Result<PollId, CoreError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;

        let status = resp.status();
        // 2xx and 409 (duplicate: existing poll id returned) are both
        // success paths — spec §4.6 step 13 / §8 property 6.
        if status.is_success() || status.as_u16() == 409 {
            let body: WebhookResponse = resp
                .json()
                .await
                .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
            Ok(PollId(body.id))
        } else {
            Err(CoreError::UpstreamFailure(format!(
                "voting webhook returned {}",
                status
            )))
        }
    }
}
