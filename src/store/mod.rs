//! Check Store Adapter (C3, spec §4.3).
//!
//! `CheckStore` generalizes the teacher's `rag::core::BaseClient` trait
//! (collection create/add/search) to this domain's single `checks`
//! collection, paired with a concrete `sqlite` backend the way the teacher
//! pairs `BaseClient` with `rag::qdrant::QdrantClient`.

pub mod sqlite;

use crate::error::CoreError;
use crate::model::{Check, CheckId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub use sqlite::SqliteCheckStore;

/// A similar-document hit returned by a vector search, carrying either a
/// cosine score (text/caption) or a Hamming distance (pdq) depending on
/// which search method produced it.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub check_id: CheckId,
    pub score: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Before/after deltas returned by an atomic before-image update (spec
/// §4.3, consumed by the reconciler C10).
#[derive(Debug, Clone, Default)]
pub struct UpdateDelta {
    pub became_human_assessed: bool,
    pub became_downvoted: bool,
    pub previous_crowdsourced_category: Option<String>,
}

#[async_trait]
pub trait CheckStore: Send + Sync {
    async fn insert(&self, check: Check) -> Result<CheckId, CoreError>;

    async fn find_by_id(&self, id: CheckId) -> Result<Option<Check>, CoreError>;

    async fn find_by_text_hash(&self, hash: &str) -> Result<Option<Check>, CoreError>;

    /// Exact image-hash lookup. When `caption_hash` is `Some`, both hashes
    /// must match (spec §9 Open Question, resolved: "both hashes must
    /// match"). When `None`, only checks with no caption are eligible.
    async fn find_by_image_hash(
        &self,
        image_hash: &str,
        caption_hash: Option<&str>,
    ) -> Result<Option<Check>, CoreError>;

    /// Sparse partial update, applied with set-semantics so retries are
    /// idempotent.
    async fn update_fields(&self, id: CheckId, partial: HashMap<String, Value>) -> Result<(), CoreError>;

    /// Atomic read-modify-write; returns the deltas the reconciler needs.
    async fn update_fields_with_before_image(
        &self,
        id: CheckId,
        partial: HashMap<String, Value>,
    ) -> Result<UpdateDelta, CoreError>;

    async fn find_similar_text_embedding(
        &self,
        v: &[f32],
        k: usize,
        filter_human_assessed: bool,
    ) -> Result<Vec<VectorHit>, CoreError>;

    async fn find_similar_caption_embedding(
        &self,
        v: &[f32],
        k: usize,
        filter_human_assessed: bool,
    ) -> Result<Vec<VectorHit>, CoreError>;

    async fn find_similar_image_embedding(
        &self,
        v: &[u8],
        k: usize,
        only_captioned: Option<bool>,
        filter_human_assessed: bool,
    ) -> Result<Vec<VectorHit>, CoreError>;
}

/// Cosine similarity between two equal-length float vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Euclidean distance between two equal-length binary vectors — the PDQ
/// index's vector-search metric, which only approximates Hamming distance
/// (spec §9: "re-verify Hamming on the returned candidate").
pub fn euclidean_distance(a: &[u8], b: &[u8]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| ((*x as f64) - (*y as f64)).powi(2))
        .sum::<f64>()
        .sqrt()
}
