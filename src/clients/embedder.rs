//! `embed({text}) -> {embedding: float[384]}` (spec §6).

use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const TEXT_EMBEDDING_DIM: usize = 384;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError>;
}

pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let resp = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::UpstreamFailure(format!(
                "embedder returned {}",
                resp.status()
            )));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;

        if body.embedding.len() != TEXT_EMBEDDING_DIM {
            return Err(CoreError::InvalidFingerprint(format!(
                "embedding dimension {} != {}",
                body.embedding.len(),
                TEXT_EMBEDDING_DIM
            )));
        }
        Ok(body.embedding)
    }
}
