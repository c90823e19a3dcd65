//! Moderator Channel (C9, spec §4.8).
//!
//! `ModeratorClient` plays the same role the other outbound collaborators
//! do — a trait over an HTTP webhook, injectable for tests — but the
//! threading and inline-button bookkeeping live here rather than in the
//! client, since they're this component's actual responsibility, not wire
//! plumbing.

use crate::error::CoreError;
use crate::model::CheckId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    NewCheck,
    CommunityNote,
    NewlyAssessed,
    CategoryChange,
    CommunityNoteDownvoted,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeratorMessage {
    pub kind: NotificationKind,
    pub text: String,
    /// Threads this message as a reply to an earlier notification (spec
    /// §4.8: "each reply threads under a parent message id").
    pub reply_to_message_id: Option<String>,
    pub buttons: Vec<InlineButton>,
}

#[async_trait]
pub trait ModeratorClient: Send + Sync {
    /// Sends a notification, returning the id of the sent message (used as
    /// `reply_to_message_id` for subsequent threaded notifications).
    async fn send(&self, message: ModeratorMessage) -> Result<String, CoreError>;

    /// Rewrites a previously sent message's button markup in place (spec
    /// §4.8: "reply markup is rewritten to reflect the new state").
    async fn edit_buttons(&self, message_id: &str, buttons: Vec<InlineButton>) -> Result<(), CoreError>;
}

pub struct HttpModeratorClient {
    client: reqwest::Client,
    webhook_url: String,
}

impl HttpModeratorClient {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), webhook_url: webhook_url.into() }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "messageId")]
    message_id: String,
}

#[async_trait]
impl ModeratorClient for HttpModeratorClient {
    async fn send(&self, message: ModeratorMessage) -> Result<String, CoreError> {
        let resp = self
            .client
            .post(format!("{}/send", self.webhook_url))
            .json(&message)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CoreError::UpstreamFailure(format!("moderator channel returned {}", resp.status())));
        }
        let body: SendResponse = resp.json().await.map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        Ok(body.message_id)
    }

    async fn edit_buttons(&self, message_id: &str, buttons: Vec<InlineButton>) -> Result<(), CoreError> {
        let resp = self
            .client
            .post(format!("{}/edit/{message_id}", self.webhook_url))
            .json(&serde_json::json!({ "buttons": buttons }))
            .send()
            .await
            .map_err(|e| CoreError::UpstreamFailure(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CoreError::UpstreamFailure(format!("moderator channel returned {}", resp.status())));
        }
        Ok(())
    }
}

/// The action a webhook callback payload carries, of the form
/// `{action}_{checkId}` (spec §4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Publish(CheckId),
    Unpublish(CheckId),
    Unknown(String),
}

/// Parses a raw `action_checkId` callback payload. Malformed or
/// unrecognized payloads become `Unknown` rather than an error — the
/// webhook handler acknowledges them without raising (spec §4.8).
pub fn parse_callback(payload: &str) -> CallbackAction {
    let Some((action, id_hex)) = payload.rsplit_once('_') else {
        return CallbackAction::Unknown(payload.to_string());
    };
    let Some(check_id) = CheckId::from_hex(id_hex) else {
        return CallbackAction::Unknown(payload.to_string());
    };
    match action {
        "publish" => CallbackAction::Publish(check_id),
        "unpublish" => CallbackAction::Unpublish(check_id),
        _ => CallbackAction::Unknown(payload.to_string()),
    }
}

/// Builds the inline-button set for a `community-note` notification.
/// Approve/unpublish toggle is suppressed for controversial notes (spec
/// §4.8).
pub fn community_note_buttons(check_id: CheckId, is_controversial: bool, is_approved: bool, langfuse_url: &str) -> Vec<InlineButton> {
    let mut buttons = vec![InlineButton {
        label: "View on LangFuse".to_string(),
        callback_data: None,
        url: Some(langfuse_url.to_string()),
    }];
    if !is_controversial {
        let (label, action) = if is_approved {
            ("Unpublish", "unpublish")
        } else {
            ("Approve for publishing", "publish")
        };
        buttons.push(InlineButton {
            label: label.to_string(),
            callback_data: Some(format!("{action}_{}", check_id.to_hex())),
            url: None,
        });
    }
    buttons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_publish_action() {
        let id = CheckId::new();
        let action = parse_callback(&format!("publish_{}", id.to_hex()));
        assert_eq!(action, CallbackAction::Publish(id));
    }

    #[test]
    fn unknown_action_does_not_raise() {
        let action = parse_callback("frobnicate_deadbeef");
        assert!(matches!(action, CallbackAction::Unknown(_)));
    }

    #[test]
    fn controversial_notes_omit_toggle_button() {
        let buttons = community_note_buttons(CheckId::new(), true, false, "https://langfuse/x");
        assert_eq!(buttons.len(), 1);
    }

    #[test]
    fn non_controversial_notes_include_toggle_button() {
        let buttons = community_note_buttons(CheckId::new(), false, false, "https://langfuse/x");
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[1].label, "Approve for publishing");
    }
}
