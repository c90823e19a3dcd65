//! `POST /pdq` with raw bytes or `{url}` -> `{hash_hex, quality}` (spec §6).

use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct PdqUrlRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PdqResult {
    pub hash_hex: String,
    pub quality: f64,
}

#[async_trait]
pub trait ImageHashClient: Send + Sync {
    async fn hash_bytes(&self, bytes: &[u8]) -> Result<PdqResult, CoreError>;
    async fn hash_url(&self, url: &str) -> Result<PdqResult, CoreError>;
}

pub struct HttpImageHashClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpImageHashClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ImageHashClient for HttpImageHashClient {
    async fn hash_bytes(&self, bytes: &[u8]) -> Result<PdqResult, CoreError> {
        let resp = self
            .client
            .post(format!("{}/pdq", self.base_url))
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        parse_pdq_response(resp).await
    }

    async fn hash_url(&self, url: &str) -> Result<PdqResult, CoreError> {
        let resp = self
            .client
            .post(format!("{}/pdq", self.base_url))
            .json(&PdqUrlRequest { url })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        parse_pdq_response(resp).await
    }
}

async fn parse_pdq_response(resp: reqwest::Response) -> Result<PdqResult, CoreError> {
    if !resp.status().is_success() {
        return Err(CoreError::UpstreamFailure(format!(
            "image hash service returned {}",
            resp.status()
        )));
    }
    let result: PdqResult = resp
        .json()
        .await
        .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
    if result.hash_hex.len() != 64 {
        return Err(CoreError::InvalidFingerprint(format!(
            "pdq hash length {} != 64",
            result.hash_hex.len()
        )));
    }
    Ok(result)
}
