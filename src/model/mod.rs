//! Persistent data model — Check, Submission, Consumer (spec §3).
//!
//! Newtype ids and a `#[serde(rename_all = "...")]` enum style follow the
//! teacher's `agent/core.rs` (`Uuid` identity field) and
//! `CodeExecutionMode` conventions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque 24-byte check id, rendered as a 48-char hex string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckId(pub [u8; 24]);

impl Serialize for CheckId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CheckId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        CheckId::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid check id"))
    }
}

impl CheckId {
    pub fn new() -> Self {
        let mut bytes = [0u8; 24];
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        bytes[..16].copy_from_slice(a.as_bytes());
        bytes[16..].copy_from_slice(&b.as_bytes()[..8]);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 24 {
            return None;
        }
        let mut arr = [0u8; 24];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }
}

impl Default for CheckId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Text,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationStatus {
    Pending,
    Completed,
    Unusable,
    Error,
    ErrorPreprocessing,
    ErrorAgentLoop,
    ErrorSummarization,
    ErrorTranslation,
    ErrorOther,
}

impl GenerationStatus {
    pub fn is_terminal_error(&self) -> bool {
        !matches!(self, GenerationStatus::Pending | GenerationStatus::Completed)
    }

    pub fn from_phase_keyword(keyword: &str) -> Self {
        match keyword {
            "error-preprocessing" => GenerationStatus::ErrorPreprocessing,
            "error-agentLoop" => GenerationStatus::ErrorAgentLoop,
            "error-summarization" => GenerationStatus::ErrorSummarization,
            "error-translation" => GenerationStatus::ErrorTranslation,
            _ => GenerationStatus::ErrorOther,
        }
    }
}

/// A long-form or short-form multilingual report body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportResponse {
    pub en: Option<String>,
    pub cn: Option<String>,
    pub ms: Option<String>,
    pub id: Option<String>,
    pub ta: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub downvoted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HumanResponse {
    pub en: Option<String>,
    pub cn: Option<String>,
    pub ms: Option<String>,
    pub id: Option<String>,
    pub ta: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_by: Option<String>,
}

/// The persistent unit of work (spec §3 "Check").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub id: CheckId,

    pub check_type: CheckType,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub text_hash: Option<String>,
    pub caption_hash: Option<String>,
    pub image_hash: Option<String>,

    pub text_embedding: Option<Vec<f32>>,
    pub caption_embedding: Option<Vec<f32>>,
    pub pdq_embedding: Option<Vec<u8>>,

    pub longform_response: Option<ReportResponse>,
    pub shortform_response: Option<ReportResponse>,
    pub human_response: Option<HumanResponse>,
    pub title: Option<String>,
    pub slug: Option<String>,

    pub generation_status: GenerationStatus,
    pub is_controversial: bool,
    pub is_access_blocked: bool,
    pub is_video: bool,
    pub is_expired: bool,
    pub is_human_assessed: bool,
    pub is_vote_triggered: bool,
    pub is_approved_for_publishing: bool,

    pub machine_category: Option<String>,
    pub crowdsourced_category: String,
    pub poll_id: Option<String>,

    pub notification_id: Option<String>,
    pub community_note_notification_id: Option<String>,
    pub approved_by: Option<String>,
}

impl Check {
    /// A fresh check skeleton for a text submission, hashes precomputed by
    /// the caller (C6 step 3).
    pub fn new_text(id: CheckId, text: String, text_hash: String) -> Self {
        Self {
            id,
            check_type: CheckType::Text,
            text: Some(text),
            image_url: None,
            caption: None,
            timestamp: chrono::Utc::now(),
            text_hash: Some(text_hash),
            caption_hash: None,
            image_hash: None,
            text_embedding: None,
            caption_embedding: None,
            pdq_embedding: None,
            longform_response: None,
            shortform_response: None,
            human_response: None,
            title: None,
            slug: None,
            generation_status: GenerationStatus::Pending,
            is_controversial: false,
            is_access_blocked: false,
            is_video: false,
            is_expired: false,
            is_human_assessed: false,
            is_vote_triggered: false,
            is_approved_for_publishing: false,
            machine_category: None,
            crowdsourced_category: "unsure".to_string(),
            poll_id: None,
            notification_id: None,
            community_note_notification_id: None,
            approved_by: None,
        }
    }

    /// A fresh check skeleton for an image (optionally captioned)
    /// submission.
    pub fn new_image(
        id: CheckId,
        image_url: String,
        caption: Option<String>,
        image_hash: String,
        caption_hash: Option<String>,
    ) -> Self {
        Self {
            id,
            check_type: CheckType::Image,
            text: None,
            image_url: Some(image_url),
            caption,
            timestamp: chrono::Utc::now(),
            text_hash: None,
            caption_hash,
            image_hash: Some(image_hash),
            text_embedding: None,
            caption_embedding: None,
            pdq_embedding: None,
            longform_response: None,
            shortform_response: None,
            human_response: None,
            title: None,
            slug: None,
            generation_status: GenerationStatus::Pending,
            is_controversial: false,
            is_access_blocked: false,
            is_video: false,
            is_expired: false,
            is_human_assessed: false,
            is_vote_triggered: false,
            is_approved_for_publishing: false,
            machine_category: None,
            crowdsourced_category: "unsure".to_string(),
            poll_id: None,
            notification_id: None,
            community_note_notification_id: None,
            approved_by: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Internal,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Completed,
    Error,
}

/// Per-request audit entry (spec §3 "Submission").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub request_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_type: SourceType,
    pub consumer_name: String,
    pub check_type: CheckType,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub caption: Option<String>,
    pub check_id: Option<CheckId>,
    pub check_status: CheckStatus,
}

/// Token-bucket configuration for a consumer (spec §3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub milliseconds_per_request: u64,
    pub capacity: u32,
    pub milliseconds_for_updates: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            milliseconds_per_request: 1000,
            capacity: 10,
            milliseconds_for_updates: 1000,
        }
    }
}

/// Rate-limit and ACL record keyed by API key (spec §3 "Consumer").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    pub name: String,
    pub api_key: String,
    pub allowed_apis: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub is_active: bool,
    /// `total_calls[api] = count`.
    #[serde(default)]
    pub total_calls: std::collections::HashMap<String, u64>,
    /// `monthly_calls["YYYY-MM:{api}"] = count`.
    #[serde(default)]
    pub monthly_calls: std::collections::HashMap<String, u64>,
}
