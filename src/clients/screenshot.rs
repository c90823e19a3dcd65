//! `screenshot({url,id}) -> {result:{imageUrl, base64?}}` on success (spec §6).

use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ScreenshotRequest<'a> {
    url: &'a str,
    id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotResult {
    pub image_url: Option<String>,
    pub base64: Option<String>,
}

#[async_trait]
pub trait ScreenshotClient: Send + Sync {
    async fn screenshot(&self, url: &str, request_id: &str) -> Result<ScreenshotResult, CoreError>;
}

pub struct HttpScreenshotClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScreenshotClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ScreenshotClient for HttpScreenshotClient {
    async fn screenshot(&self, url: &str, request_id: &str) -> Result<ScreenshotResult, CoreError> {
        let resp = self
            .client
            .post(format!("{}/screenshot", self.base_url))
            .json(&ScreenshotRequest { url, id: request_id })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::UpstreamFailure(format!(
                "screenshot service returned {}",
                resp.status()
            )));
        }

        #[derive(Deserialize)]
        struct Wrapper {
            result: ScreenshotResult,
        }
        let wrapper: Wrapper = resp
            .json()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        Ok(wrapper.result)
    }
}
