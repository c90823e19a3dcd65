//! SQLite-backed `CheckStore`.
//!
//! Follows the teacher's `memory::storage::ltm_sqlite_storage` pattern: a
//! thin synchronous wrapper around `rusqlite`, run off the async executor
//! via `tokio::task::spawn_blocking` so callers never block the reactor.
//! The check document itself is stored as a JSON blob (spec §6: "Check
//! document keys match attribute names 1:1") alongside a handful of
//! indexed scalar columns used for the exact-hash lookups of §4.3.

use super::{cosine_similarity, euclidean_distance, CheckStore, UpdateDelta, VectorHit};
use crate::error::CoreError;
use crate::model::{Check, CheckId};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub struct SqliteCheckStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|e| CoreError::InternalError(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(|e| CoreError::InternalError(e.to_string()))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), CoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checks (
                id TEXT PRIMARY KEY,
                text_hash TEXT,
                image_hash TEXT,
                caption_hash TEXT,
                has_caption INTEGER NOT NULL,
                is_human_assessed INTEGER NOT NULL,
                is_expired INTEGER NOT NULL,
                doc TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| CoreError::InternalError(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_checks_text_hash ON checks(text_hash)",
            [],
        )
        .map_err(|e| CoreError::InternalError(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_checks_image_hash ON checks(image_hash)",
            [],
        )
        .map_err(|e| CoreError::InternalError(e.to_string()))?;
        Ok(())
    }

    fn row_to_check(doc: &str) -> Result<Check, CoreError> {
        serde_json::from_str(doc).map_err(|e| CoreError::InternalError(e.to_string()))
    }

    fn upsert(conn: &Connection, check: &Check) -> Result<(), CoreError> {
        let doc = serde_json::to_string(check).map_err(|e| CoreError::InternalError(e.to_string()))?;
        conn.execute(
            "INSERT INTO checks (id, text_hash, image_hash, caption_hash, has_caption, is_human_assessed, is_expired, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                text_hash = excluded.text_hash,
                image_hash = excluded.image_hash,
                caption_hash = excluded.caption_hash,
                has_caption = excluded.has_caption,
                is_human_assessed = excluded.is_human_assessed,
                is_expired = excluded.is_expired,
                doc = excluded.doc",
            params![
                check.id.to_hex(),
                check.text_hash,
                check.image_hash,
                check.caption_hash,
                check.caption.is_some() as i64,
                check.is_human_assessed as i64,
                check.is_expired as i64,
                doc,
            ],
        )
        .map_err(|e| CoreError::InternalError(e.to_string()))?;
        Ok(())
    }

    fn all_checks(conn: &Connection, filter_human_assessed: bool) -> Result<Vec<Check>, CoreError> {
        let sql = if filter_human_assessed {
            "SELECT doc FROM checks WHERE is_expired = 0 AND is_human_assessed = 1"
        } else {
            "SELECT doc FROM checks WHERE is_expired = 0"
        };
        let mut stmt = conn.prepare(sql).map_err(|e| CoreError::InternalError(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| CoreError::InternalError(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let doc = row.map_err(|e| CoreError::InternalError(e.to_string()))?;
            out.push(Self::row_to_check(&doc)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl CheckStore for SqliteCheckStore {
    async fn insert(&self, check: Check) -> Result<CheckId, CoreError> {
        let conn = self.conn.clone();
        let id = check.id;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            Self::upsert(&conn, &check)?;
            Ok::<_, CoreError>(())
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))??;
        Ok(id)
    }

    async fn find_by_id(&self, id: CheckId) -> Result<Option<Check>, CoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM checks WHERE id = ?1",
                    params![id.to_hex()],
                    |row| row.get(0),
                )
                .ok();
            doc.map(|d| Self::row_to_check(&d)).transpose()
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    async fn find_by_text_hash(&self, hash: &str) -> Result<Option<Check>, CoreError> {
        let conn = self.conn.clone();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM checks WHERE text_hash = ?1 AND is_expired = 0 LIMIT 1",
                    params![hash],
                    |row| row.get(0),
                )
                .ok();
            doc.map(|d| Self::row_to_check(&d)).transpose()
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    async fn find_by_image_hash(
        &self,
        image_hash: &str,
        caption_hash: Option<&str>,
    ) -> Result<Option<Check>, CoreError> {
        let conn = self.conn.clone();
        let image_hash = image_hash.to_string();
        let caption_hash = caption_hash.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let doc: Option<String> = match &caption_hash {
                // Both hashes must match (spec §9 resolved ambiguity).
                Some(ch) => conn
                    .query_row(
                        "SELECT doc FROM checks WHERE image_hash = ?1 AND caption_hash = ?2 AND is_expired = 0 LIMIT 1",
                        params![image_hash, ch],
                        |row| row.get(0),
                    )
                    .ok(),
                None => conn
                    .query_row(
                        "SELECT doc FROM checks WHERE image_hash = ?1 AND has_caption = 0 AND is_expired = 0 LIMIT 1",
                        params![image_hash],
                        |row| row.get(0),
                    )
                    .ok(),
            };
            doc.map(|d| Self::row_to_check(&d)).transpose()
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    async fn update_fields(&self, id: CheckId, partial: HashMap<String, Value>) -> Result<(), CoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let doc: String = conn
                .query_row("SELECT doc FROM checks WHERE id = ?1", params![id.to_hex()], |row| row.get(0))
                .map_err(|_| CoreError::NotFound(id.to_hex()))?;
            let mut check = Self::row_to_check(&doc)?;
            apply_partial(&mut check, &partial)?;
            Self::upsert(&conn, &check)
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    async fn update_fields_with_before_image(
        &self,
        id: CheckId,
        partial: HashMap<String, Value>,
    ) -> Result<UpdateDelta, CoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let doc: String = conn
                .query_row("SELECT doc FROM checks WHERE id = ?1", params![id.to_hex()], |row| row.get(0))
                .map_err(|_| CoreError::NotFound(id.to_hex()))?;
            let mut check = Self::row_to_check(&doc)?;

            let before_human_assessed = check.is_human_assessed;
            let before_downvoted = check
                .shortform_response
                .as_ref()
                .map(|r| r.downvoted)
                .unwrap_or(false);
            let before_category = check.crowdsourced_category.clone();

            apply_partial(&mut check, &partial)?;
            Self::upsert(&conn, &check)?;

            let after_downvoted = check
                .shortform_response
                .as_ref()
                .map(|r| r.downvoted)
                .unwrap_or(false);

            Ok(UpdateDelta {
                became_human_assessed: !before_human_assessed && check.is_human_assessed,
                became_downvoted: !before_downvoted && after_downvoted,
                previous_crowdsourced_category: if before_category != check.crowdsourced_category {
                    Some(before_category)
                } else {
                    None
                },
            })
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    async fn find_similar_text_embedding(
        &self,
        v: &[f32],
        k: usize,
        filter_human_assessed: bool,
    ) -> Result<Vec<VectorHit>, CoreError> {
        let conn = self.conn.clone();
        let v = v.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let checks = Self::all_checks(&conn, filter_human_assessed)?;
            let mut hits: Vec<VectorHit> = checks
                .into_iter()
                .filter_map(|c| {
                    c.text_embedding.as_ref().map(|e| VectorHit {
                        check_id: c.id,
                        score: cosine_similarity(&v, e),
                        timestamp: c.timestamp,
                    })
                })
                .collect();
            sort_and_truncate_desc(&mut hits, k);
            Ok(hits)
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    async fn find_similar_caption_embedding(
        &self,
        v: &[f32],
        k: usize,
        filter_human_assessed: bool,
    ) -> Result<Vec<VectorHit>, CoreError> {
        let conn = self.conn.clone();
        let v = v.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let checks = Self::all_checks(&conn, filter_human_assessed)?;
            let mut hits: Vec<VectorHit> = checks
                .into_iter()
                .filter_map(|c| {
                    c.caption_embedding.as_ref().map(|e| VectorHit {
                        check_id: c.id,
                        score: cosine_similarity(&v, e),
                        timestamp: c.timestamp,
                    })
                })
                .collect();
            sort_and_truncate_desc(&mut hits, k);
            Ok(hits)
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }

    async fn find_similar_image_embedding(
        &self,
        v: &[u8],
        k: usize,
        only_captioned: Option<bool>,
        filter_human_assessed: bool,
    ) -> Result<Vec<VectorHit>, CoreError> {
        let conn = self.conn.clone();
        let v = v.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            let checks = Self::all_checks(&conn, filter_human_assessed)?;
            let mut hits: Vec<VectorHit> = checks
                .into_iter()
                .filter(|c| match only_captioned {
                    Some(true) => c.caption.is_some(),
                    Some(false) => c.caption.is_none(),
                    None => true,
                })
                .filter_map(|c| {
                    c.pdq_embedding.as_ref().map(|e| VectorHit {
                        check_id: c.id,
                        // Smaller distance is "closer"; store as negative so
                        // the shared desc-sort picks the nearest first.
                        score: -euclidean_distance(&v, e),
                        timestamp: c.timestamp,
                    })
                })
                .collect();
            sort_and_truncate_desc(&mut hits, k);
            Ok(hits)
        })
        .await
        .map_err(|e| CoreError::InternalError(e.to_string()))?
    }
}

/// Sort by score descending; ties broken by earliest timestamp (spec §4.2
/// tie-break rule).
fn sort_and_truncate_desc(hits: &mut Vec<VectorHit>, k: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
    hits.truncate(k);
}

fn apply_partial(check: &mut Check, partial: &HashMap<String, Value>) -> Result<(), CoreError> {
    let mut value = serde_json::to_value(&*check).map_err(|e| CoreError::InternalError(e.to_string()))?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| CoreError::InternalError("check did not serialize to an object".to_string()))?;
    for (k, v) in partial {
        obj.insert(k.clone(), v.clone());
    }
    *check = serde_json::from_value(value).map_err(|e| CoreError::InternalError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::hash_text;

    #[tokio::test]
    async fn insert_and_find_by_text_hash() {
        let store = SqliteCheckStore::open_in_memory().unwrap();
        let id = CheckId::new();
        let hash = hash_text("Donald Trump is the president");
        let check = Check::new_text(id, "Donald Trump is the president".to_string(), hash.clone());
        store.insert(check).await.unwrap();

        let found = store.find_by_text_hash(&hash).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id.to_hex(), id.to_hex());
    }

    #[tokio::test]
    async fn update_fields_with_before_image_detects_transition() {
        let store = SqliteCheckStore::open_in_memory().unwrap();
        let id = CheckId::new();
        let check = Check::new_text(id, "x".to_string(), hash_text("x"));
        store.insert(check).await.unwrap();

        let mut partial = HashMap::new();
        partial.insert("is_human_assessed".to_string(), Value::Bool(true));
        let delta = store.update_fields_with_before_image(id, partial).await.unwrap();
        assert!(delta.became_human_assessed);
    }

    #[tokio::test]
    async fn vector_search_orders_by_cosine_then_timestamp() {
        let store = SqliteCheckStore::open_in_memory().unwrap();
        let mut a = Check::new_text(CheckId::new(), "a".to_string(), hash_text("a"));
        a.text_embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut b = Check::new_text(CheckId::new(), "b".to_string(), hash_text("b"));
        b.text_embedding = Some(vec![0.0, 1.0, 0.0]);
        store.insert(a).await.unwrap();
        store.insert(b).await.unwrap();

        let hits = store
            .find_similar_text_embedding(&[1.0, 0.0, 0.0], 5, false)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score > hits[1].score);
    }
}
