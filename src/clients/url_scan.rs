//! `urlScan({url,id}) -> {result:{malicious, categories[], tags[], hasVerdicts}}`
//! (spec §6).

use crate::error::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct UrlScanRequest<'a> {
    url: &'a str,
    id: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlScanResult {
    pub malicious: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub has_verdicts: bool,
}

#[async_trait]
pub trait UrlScanClient: Send + Sync {
    async fn scan(&self, url: &str, request_id: &str) -> Result<UrlScanResult, CoreError>;
}

pub struct HttpUrlScanClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUrlScanClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UrlScanClient for HttpUrlScanClient {
    async fn scan(&self, url: &str, request_id: &str) -> Result<UrlScanResult, CoreError> {
        let resp = self
            .client
            .post(format!("{}/scan", self.base_url))
            .json(&UrlScanRequest { url, id: request_id })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::UpstreamFailure(format!(
                "url scan service returned {}",
                resp.status()
            )));
        }

        #[derive(Deserialize)]
        struct Wrapper {
            result: UrlScanResult,
        }
        let wrapper: Wrapper = resp
            .json()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        Ok(wrapper.result)
    }
}
