//! `search({q,id}) -> {result: object}` (spec §6).

use crate::error::CoreError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    id: &'a str,
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, request_id: &str) -> Result<Value, CoreError>;
}

pub struct HttpSearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, query: &str, request_id: &str) -> Result<Value, CoreError> {
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest { q: query, id: request_id })
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CoreError::UpstreamFailure(format!(
                "search service returned {}",
                resp.status()
            )));
        }

        #[derive(serde::Deserialize)]
        struct Wrapper {
            result: Value,
        }
        let wrapper: Wrapper = resp
            .json()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        Ok(wrapper.result)
    }
}
