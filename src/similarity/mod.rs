//! Similarity Engine (C2, spec §4.2).

use crate::clients::embedder::TEXT_EMBEDDING_DIM;
use crate::clients::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::clients::Embedder;
use crate::config::Config;
use crate::error::CoreError;
use crate::fingerprint::{hamming_distance, hash_text};
use crate::model::CheckId;
use crate::store::CheckStore;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Text,
    Image,
    Both,
}

#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub matched_check_id: Option<CheckId>,
    pub match_type: Option<MatchType>,
    pub similarity_score: Option<f64>,
    pub hamming_distance: Option<u32>,
    pub reasoning: String,
    pub is_match: bool,
}

impl SimilarityResult {
    fn no_match(reasoning: impl Into<String>) -> Self {
        Self {
            matched_check_id: None,
            match_type: None,
            similarity_score: None,
            hamming_distance: None,
            reasoning: reasoning.into(),
            is_match: false,
        }
    }
}

pub enum SubmissionShape {
    Text { text: String },
    Image { image_bytes: Vec<u8> },
    ImageWithCaption { image_bytes: Vec<u8>, caption: String },
}

#[derive(Debug, Deserialize)]
struct SameClaimResponse {
    are_variants_of_same_claim: bool,
    #[allow(dead_code)]
    reasoning: String,
}

pub struct SimilarityEngine {
    store: Arc<dyn CheckStore>,
    embedder: Arc<dyn Embedder>,
    image_hasher: Arc<dyn crate::clients::ImageHashClient>,
    llm: Arc<dyn LlmClient>,
    config: Config,
}

impl SimilarityEngine {
    pub fn new(
        store: Arc<dyn CheckStore>,
        embedder: Arc<dyn Embedder>,
        image_hasher: Arc<dyn crate::clients::ImageHashClient>,
        llm: Arc<dyn LlmClient>,
        config: Config,
    ) -> Self {
        Self {
            store,
            embedder,
            image_hasher,
            llm,
            config,
        }
    }

    pub async fn evaluate(&self, shape: SubmissionShape) -> SimilarityResult {
        match shape {
            SubmissionShape::Text { text } => self.evaluate_text(&text).await,
            SubmissionShape::Image { image_bytes } => self.evaluate_image(&image_bytes, None).await,
            SubmissionShape::ImageWithCaption { image_bytes, caption } => {
                self.evaluate_image(&image_bytes, Some(&caption)).await
            }
        }
    }

    async fn evaluate_text(&self, text: &str) -> SimilarityResult {
        let text_hash = hash_text(text);

        match self.store.find_by_text_hash(&text_hash).await {
            Ok(Some(existing)) => {
                return SimilarityResult {
                    matched_check_id: Some(existing.id),
                    match_type: Some(MatchType::Text),
                    similarity_score: Some(1.0),
                    hamming_distance: None,
                    reasoning: "exact text hash match".to_string(),
                    is_match: true,
                };
            }
            Ok(None) => {}
            Err(e) => return SimilarityResult::no_match(format!("text hash lookup failed: {e}")),
        }

        let embedding = match self.embedder.embed(text).await {
            Ok(e) => e,
            Err(e) => return SimilarityResult::no_match(format!("embedder unavailable: {e}")),
        };
        debug_assert_eq!(embedding.len(), TEXT_EMBEDDING_DIM);

        let k = 5;
        let hits = match self
            .store
            .find_similar_text_embedding(&embedding, k, self.config.filter_human_assessed_in_vector_search)
            .await
        {
            Ok(h) => h,
            Err(e) => return SimilarityResult::no_match(format!("vector search failed: {e}")),
        };

        let Some(top) = hits.into_iter().next() else {
            return SimilarityResult::no_match("no similar checks found");
        };

        if top.score <= self.config.text_similarity_threshold {
            return SimilarityResult::no_match(format!(
                "top vector score {:.3} below threshold",
                top.score
            ));
        }

        let existing = match self.store.find_by_id(top.check_id).await {
            Ok(Some(c)) => c,
            _ => return SimilarityResult::no_match("matched check vanished"),
        };
        let existing_text = existing.text.clone().unwrap_or_default();

        match self.same_claim_check(text, &existing_text).await {
            Some(true) => SimilarityResult {
                matched_check_id: Some(top.check_id),
                match_type: Some(MatchType::Text),
                similarity_score: Some(top.score),
                hamming_distance: None,
                reasoning: "llm confirmed same claim".to_string(),
                is_match: true,
            },
            Some(false) => SimilarityResult::no_match("llm rejected same-claim hypothesis"),
            // Timeout/unparsable LLM output never blocks the pipeline — the
            // threshold decision is authoritative instead (spec §4.2).
            None => SimilarityResult {
                matched_check_id: Some(top.check_id),
                match_type: Some(MatchType::Text),
                similarity_score: Some(top.score),
                hamming_distance: None,
                reasoning: format!("threshold match at {:.3}, same-claim llm unavailable", top.score),
                is_match: true,
            },
        }
    }

    /// Returns `Some(bool)` when the LLM answered; `None` on timeout or
    /// unparsable output (spec §4.2: "propagated as no-match proceed
    /// fresh" — here, callers fall back to the threshold decision instead
    /// of hard-failing).
    async fn same_claim_check(&self, a: &str, b: &str) -> Option<bool> {
        let prompt = format!(
            "Do these two statements make the same fact-checkable claim?\n\nA: {a}\nB: {b}\n\nRespond as JSON: {{\"are_variants_of_same_claim\": bool, \"reasoning\": string}}"
        );
        let req = ChatRequest {
            response_format: Some(json!({"type": "json_object"})),
            ..ChatRequest::new(vec![ChatMessage::user_text(prompt)])
        };

        let call = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.same_claim_llm_timeout_secs),
            self.llm.chat(req),
        )
        .await;

        let resp = match call {
            Ok(Ok(r)) => r,
            _ => return None,
        };
        let content = resp.content?;
        let parsed: SameClaimResponse = serde_json::from_str(&content).ok()?;
        Some(parsed.are_variants_of_same_claim)
    }

    async fn evaluate_image(&self, image_bytes: &[u8], caption: Option<&str>) -> SimilarityResult {
        let pdq = match self.image_hasher.hash_bytes(image_bytes).await {
            Ok(r) => r.hash_hex,
            Err(e) => return SimilarityResult::no_match(format!("image hash service unavailable: {e}")),
        };
        let caption_hash = caption.map(hash_text);

        match caption {
            None => self.evaluate_image_only(&pdq).await,
            Some(_) => self.evaluate_image_with_caption(&pdq, caption_hash.as_deref().unwrap()).await,
        }
    }

    async fn evaluate_image_only(&self, pdq: &str) -> SimilarityResult {
        if let Ok(Some(existing)) = self.store.find_by_image_hash(pdq, None).await {
            return SimilarityResult {
                matched_check_id: Some(existing.id),
                match_type: Some(MatchType::Image),
                similarity_score: None,
                hamming_distance: Some(0),
                reasoning: "exact image hash match".to_string(),
                is_match: true,
            };
        }

        let vector = match crate::fingerprint::pdq_to_vector(pdq) {
            Ok(v) => v,
            Err(e) => return SimilarityResult::no_match(format!("invalid pdq hash: {e}")),
        };
        let hits = match self
            .store
            .find_similar_image_embedding(&vector, 1, Some(false), self.config.filter_human_assessed_in_vector_search)
            .await
        {
            Ok(h) => h,
            Err(e) => return SimilarityResult::no_match(format!("vector search failed: {e}")),
        };
        let Some(top) = hits.into_iter().next() else {
            return SimilarityResult::no_match("no similar images found");
        };
        let Ok(Some(candidate)) = self.store.find_by_id(top.check_id).await else {
            return SimilarityResult::no_match("matched check vanished");
        };
        let Some(candidate_hash) = candidate.image_hash.as_deref() else {
            return SimilarityResult::no_match("candidate missing image hash");
        };
        let distance = match hamming_distance(pdq, candidate_hash) {
            Ok(d) => d,
            Err(e) => return SimilarityResult::no_match(format!("hamming distance failed: {e}")),
        };

        if distance < self.config.pdq_hamming_threshold {
            SimilarityResult {
                matched_check_id: Some(top.check_id),
                match_type: Some(MatchType::Image),
                similarity_score: None,
                hamming_distance: Some(distance),
                reasoning: format!("hamming distance {distance} below threshold"),
                is_match: true,
            }
        } else {
            SimilarityResult::no_match(format!("hamming distance {distance} above threshold"))
        }
    }

    async fn evaluate_image_with_caption(&self, pdq: &str, caption_hash: &str) -> SimilarityResult {
        if let Ok(Some(existing)) = self.store.find_by_image_hash(pdq, Some(caption_hash)).await {
            return SimilarityResult {
                matched_check_id: Some(existing.id),
                match_type: Some(MatchType::Both),
                similarity_score: None,
                hamming_distance: Some(0),
                reasoning: "exact image+caption hash match".to_string(),
                is_match: true,
            };
        }

        let vector = match crate::fingerprint::pdq_to_vector(pdq) {
            Ok(v) => v,
            Err(e) => return SimilarityResult::no_match(format!("invalid pdq hash: {e}")),
        };
        let hits = match self
            .store
            .find_similar_image_embedding(&vector, 5, Some(true), self.config.filter_human_assessed_in_vector_search)
            .await
        {
            Ok(h) => h,
            Err(e) => return SimilarityResult::no_match(format!("vector search failed: {e}")),
        };

        for hit in hits {
            let Ok(Some(candidate)) = self.store.find_by_id(hit.check_id).await else {
                continue;
            };
            let (Some(candidate_image_hash), Some(candidate_caption_hash)) =
                (candidate.image_hash.as_deref(), candidate.caption_hash.as_deref())
            else {
                continue;
            };
            let Ok(distance) = hamming_distance(pdq, candidate_image_hash) else {
                continue;
            };
            if distance < self.config.pdq_hamming_threshold && candidate_caption_hash == caption_hash {
                return SimilarityResult {
                    matched_check_id: Some(hit.check_id),
                    match_type: Some(MatchType::Both),
                    similarity_score: None,
                    hamming_distance: Some(distance),
                    reasoning: format!("hamming distance {distance} and caption hash match"),
                    is_match: true,
                };
            }
        }

        SimilarityResult::no_match("no candidate matched both image and caption")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::embedder::Embedder;
    use crate::clients::image_hash::{ImageHashClient, PdqResult};
    use crate::clients::llm::{ChatResponse, LlmClient};
    use crate::model::Check;
    use crate::store::SqliteCheckStore;
    use async_trait::async_trait;

    struct FakeEmbedder(Vec<f32>);
    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, CoreError> {
            Ok(self.0.clone())
        }
    }

    struct FakeImageHasher(String);
    #[async_trait]
    impl ImageHashClient for FakeImageHasher {
        async fn hash_bytes(&self, _bytes: &[u8]) -> Result<PdqResult, CoreError> {
            Ok(PdqResult { hash_hex: self.0.clone(), quality: 100.0 })
        }
        async fn hash_url(&self, _url: &str) -> Result<PdqResult, CoreError> {
            Ok(PdqResult { hash_hex: self.0.clone(), quality: 100.0 })
        }
    }

    struct FakeLlmSameClaim(bool);
    #[async_trait]
    impl LlmClient for FakeLlmSameClaim {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse, CoreError> {
            Ok(ChatResponse {
                content: Some(format!(
                    "{{\"are_variants_of_same_claim\": {}, \"reasoning\": \"x\"}}",
                    self.0
                )),
                tool_calls: vec![],
            })
        }
    }

    fn dim384(first: f32) -> Vec<f32> {
        let mut v = vec![0.0f32; TEXT_EMBEDDING_DIM];
        v[0] = first;
        v
    }

    #[tokio::test]
    async fn s1_text_hash_hit_short_circuits_embedding() {
        let store: Arc<dyn CheckStore> = Arc::new(SqliteCheckStore::open_in_memory().unwrap());
        let hash = hash_text("Donald Trump is the president");
        let check = Check::new_text(CheckId::new(), "Donald Trump is the president".to_string(), hash);
        let existing_id = check.id;
        store.insert(check).await.unwrap();

        let engine = SimilarityEngine::new(
            store,
            Arc::new(FakeEmbedder(dim384(1.0))),
            Arc::new(FakeImageHasher("a".repeat(64))),
            Arc::new(FakeLlmSameClaim(true)),
            Config::from_env(),
        );

        let result = engine.evaluate(SubmissionShape::Text { text: "Donald Trump is the president".to_string() }).await;
        assert!(result.is_match);
        assert_eq!(result.matched_check_id, Some(existing_id));
        assert_eq!(result.similarity_score, Some(1.0));
    }

    #[tokio::test]
    async fn s3_image_exact_match_has_zero_hamming() {
        let store: Arc<dyn CheckStore> = Arc::new(SqliteCheckStore::open_in_memory().unwrap());
        let pdq = "b".repeat(64);
        let check = Check::new_image(CheckId::new(), "https://x/img.png".to_string(), None, pdq.clone(), None);
        let existing_id = check.id;
        store.insert(check).await.unwrap();

        let engine = SimilarityEngine::new(
            store,
            Arc::new(FakeEmbedder(dim384(1.0))),
            Arc::new(FakeImageHasher(pdq)),
            Arc::new(FakeLlmSameClaim(true)),
            Config::from_env(),
        );

        let result = engine.evaluate(SubmissionShape::Image { image_bytes: b"fakebytes".to_vec() }).await;
        assert!(result.is_match);
        assert_eq!(result.matched_check_id, Some(existing_id));
        assert_eq!(result.hamming_distance, Some(0));
        assert_eq!(result.match_type, Some(MatchType::Image));
    }
}
