//! Submission Ledger (C8, spec §3, §4.6 step 1/3).
//!
//! Per-request audit record linking consumer → submission → check, stored
//! the same way the check document is: a `rusqlite` connection behind
//! `spawn_blocking`, following `store::sqlite`'s pattern rather than
//! duplicating the check document's own table.

use crate::error::CoreError;
use crate::model::{CheckId, CheckStatus, CheckType, SourceType, Submission};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub struct SubmissionLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SubmissionLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|e| CoreError::InternalError(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(|e| CoreError::InternalError(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> Result<(), CoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS submissions (
                request_id TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| CoreError::InternalError(e.to_string()))?;
        Ok(())
    }

    /// Records a new submission row immediately on admission, before any
    /// check id is known (spec §4.6 step 1).
    pub async fn record(&self, submission: Submission) -> Result<(), CoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || Self::upsert(&conn.lock(), &submission))
            .await
            .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    /// Updates a submission's resolved `checkId` and final `checkStatus`
    /// (spec §4.6 steps 2-3, §3 "Submission" lifecycle).
    pub async fn resolve(&self, request_id: Uuid, check_id: CheckId, status: CheckStatus) -> Result<(), CoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let doc: String = conn
                .query_row("SELECT doc FROM submissions WHERE request_id = ?1", params![request_id.to_string()], |row| {
                    row.get(0)
                })
                .map_err(|_| CoreError::NotFound(format!("submission {request_id}")))?;
            let mut submission: Submission =
                serde_json::from_str(&doc).map_err(|e| CoreError::InternalError(e.to_string()))?;
            submission.check_id = Some(check_id);
            submission.check_status = status;
            Self::upsert(&conn, &submission)
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    pub async fn find(&self, request_id: Uuid) -> Result<Option<Submission>, CoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM submissions WHERE request_id = ?1", params![request_id.to_string()], |row| {
                    row.get(0)
                })
                .ok();
            doc.map(|d| serde_json::from_str(&d).map_err(|e| CoreError::InternalError(e.to_string())))
                .transpose()
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    fn upsert(conn: &Connection, submission: &Submission) -> Result<(), CoreError> {
        let doc = serde_json::to_string(submission).map_err(|e| CoreError::InternalError(e.to_string()))?;
        conn.execute(
            "INSERT INTO submissions (request_id, doc) VALUES (?1, ?2)
             ON CONFLICT(request_id) DO UPDATE SET doc = excluded.doc",
            params![submission.request_id.to_string(), doc],
        )
        .map_err(|e| CoreError::InternalError(e.to_string()))?;
        Ok(())
    }
}

/// `sourceType` classification: the WhatsApp bridge submits as the
/// distinguished internal consumer name (spec §4.6 step 1).
pub fn classify_source(consumer_name: &str) -> SourceType {
    if consumer_name == "checkmate-whatsapp" {
        SourceType::Internal
    } else {
        SourceType::Api
    }
}

pub fn new_submission(consumer_name: String, check_type: CheckType, text: Option<String>, image_url: Option<String>, caption: Option<String>) -> Submission {
    Submission {
        request_id: Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        source_type: classify_source(&consumer_name),
        consumer_name,
        check_type,
        text,
        image_url,
        caption,
        check_id: None,
        check_status: CheckStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whatsapp_consumer_classifies_as_internal() {
        assert_eq!(classify_source("checkmate-whatsapp"), SourceType::Internal);
        assert_eq!(classify_source("acme-corp"), SourceType::Api);
    }

    #[tokio::test]
    async fn record_then_resolve_round_trips() {
        let ledger = SubmissionLedger::open_in_memory().unwrap();
        let submission = new_submission("acme".to_string(), CheckType::Text, Some("hi".to_string()), None, None);
        let request_id = submission.request_id;
        ledger.record(submission).await.unwrap();

        let check_id = CheckId::new();
        ledger.resolve(request_id, check_id, CheckStatus::Completed).await.unwrap();

        let found = ledger.find(request_id).await.unwrap().unwrap();
        assert_eq!(found.check_id, Some(check_id));
        assert_eq!(found.check_status, CheckStatus::Completed);
    }
}
