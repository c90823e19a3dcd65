//! Assessment Reconciler (C10, spec §4.9).
//!
//! Consumes human/voting updates and applies them through the store's
//! atomic before-image update (C3), then emits the notifications the
//! resulting deltas call for.

use crate::error::CoreError;
use crate::model::CheckId;
use crate::moderator::{ModeratorClient, ModeratorMessage, NotificationKind};
use crate::store::CheckStore;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// `{isHumanAssessed, crowdsourcedCategory, isCommunityNoteDownvoted}`
/// (spec §4.9).
#[derive(Debug, Clone, Default)]
pub struct AssessmentUpdate {
    pub is_human_assessed: Option<bool>,
    pub crowdsourced_category: Option<String>,
    pub is_community_note_downvoted: Option<bool>,
}

pub struct AssessmentReconciler {
    store: Arc<dyn CheckStore>,
    moderator: Arc<dyn ModeratorClient>,
}

impl AssessmentReconciler {
    pub fn new(store: Arc<dyn CheckStore>, moderator: Arc<dyn ModeratorClient>) -> Self {
        Self { store, moderator }
    }

    pub async fn apply(&self, check_id: CheckId, update: AssessmentUpdate) -> Result<(), CoreError> {
        let Some(check) = self.store.find_by_id(check_id).await? else {
            return Err(CoreError::NotFound(format!("check {}", check_id.to_hex())));
        };

        let mut partial: HashMap<String, serde_json::Value> = HashMap::new();
        if let Some(v) = update.is_human_assessed {
            partial.insert("is_human_assessed".to_string(), json!(v));
        }
        if let Some(ref v) = update.crowdsourced_category {
            partial.insert("crowdsourced_category".to_string(), json!(v));
        }
        if let Some(v) = update.is_community_note_downvoted {
            // `update_fields_with_before_image` replaces whole top-level
            // fields, so the nested flag is set on a copy of the existing
            // shortform response rather than addressed by a dotted path.
            let mut shortform = check.shortform_response.clone().unwrap_or_default();
            shortform.downvoted = v;
            partial.insert("shortform_response".to_string(), json!(shortform));
        }
        if partial.is_empty() {
            return Ok(());
        }

        let delta = self.store.update_fields_with_before_image(check_id, partial).await?;

        if delta.became_human_assessed {
            self.notify(check_id, NotificationKind::NewlyAssessed, check.notification_id.clone()).await;
        }
        if let Some(previous) = delta.previous_crowdsourced_category {
            if update.crowdsourced_category.as_deref().map(|c| c != previous).unwrap_or(false) {
                self.notify(check_id, NotificationKind::CategoryChange, check.notification_id.clone()).await;
            }
        }
        if delta.became_downvoted {
            self.notify(
                check_id,
                NotificationKind::CommunityNoteDownvoted,
                check.community_note_notification_id.clone(),
            )
            .await;
        }

        Ok(())
    }

    async fn notify(&self, check_id: CheckId, kind: NotificationKind, reply_to: Option<String>) {
        let text = format!("Check {} updated: {:?}", check_id.to_hex(), kind);
        let message = ModeratorMessage { kind, text, reply_to_message_id: reply_to, buttons: vec![] };
        if let Err(e) = self.moderator.send(message).await {
            tracing::warn!(check_id = %check_id, error = %e, "reconciler notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Check;
    use crate::moderator::InlineButton;
    use crate::store::SqliteCheckStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingModerator {
        sent: Mutex<Vec<NotificationKind>>,
    }

    #[async_trait]
    impl ModeratorClient for RecordingModerator {
        async fn send(&self, message: ModeratorMessage) -> Result<String, CoreError> {
            self.sent.lock().push(message.kind);
            Ok("msg-1".to_string())
        }
        async fn edit_buttons(&self, _id: &str, _buttons: Vec<InlineButton>) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn becoming_human_assessed_emits_newly_assessed() {
        let store: Arc<dyn CheckStore> = Arc::new(SqliteCheckStore::open_in_memory().unwrap());
        let check = Check::new_text(CheckId::new(), "claim".to_string(), "hash".to_string());
        let id = check.id;
        store.insert(check).await.unwrap();

        let moderator = Arc::new(RecordingModerator::default());
        let reconciler = AssessmentReconciler::new(store, moderator.clone());

        reconciler
            .apply(id, AssessmentUpdate { is_human_assessed: Some(true), ..Default::default() })
            .await
            .unwrap();

        assert_eq!(moderator.sent.lock().as_slice(), [NotificationKind::NewlyAssessed]);
    }

    #[tokio::test]
    async fn category_change_emits_category_change() {
        let store: Arc<dyn CheckStore> = Arc::new(SqliteCheckStore::open_in_memory().unwrap());
        let check = Check::new_text(CheckId::new(), "claim".to_string(), "hash".to_string());
        let id = check.id;
        store.insert(check).await.unwrap();

        let moderator = Arc::new(RecordingModerator::default());
        let reconciler = AssessmentReconciler::new(store, moderator.clone());

        reconciler
            .apply(id, AssessmentUpdate { crowdsourced_category: Some("false".to_string()), ..Default::default() })
            .await
            .unwrap();

        assert_eq!(moderator.sent.lock().as_slice(), [NotificationKind::CategoryChange]);
    }

    #[tokio::test]
    async fn unknown_check_id_errors() {
        let store: Arc<dyn CheckStore> = Arc::new(SqliteCheckStore::open_in_memory().unwrap());
        let moderator = Arc::new(RecordingModerator::default());
        let reconciler = AssessmentReconciler::new(store, moderator);

        let err = reconciler.apply(CheckId::new(), AssessmentUpdate::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
