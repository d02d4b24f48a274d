//! Session database operations
//!
//! One row per session; last write wins (no optimistic-concurrency check,
//! one active requester per session is the intended usage).

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Candidate, Session, SessionStatus};

/// Save (insert or update) a session
///
/// `photo_path` and `archived` are written only on the initial insert; the
/// update path leaves them alone. Both are owned by targeted updates
/// (`set_photo_path`, `archive_session`), which can land while a pipeline
/// task still holds an older in-memory clone of the session.
pub async fn save_session(pool: &SqlitePool, session: &Session) -> Result<()> {
    // Prepare all data before touching the database connection
    let session_id = session.session_id.to_string();
    let status = serde_json::to_string(&session.status)
        .map_err(|e| Error::Internal(format!("Failed to serialize status: {}", e)))?;
    let candidates = serde_json::to_string(&session.candidates)
        .map_err(|e| Error::Internal(format!("Failed to serialize candidates: {}", e)))?;
    let confirmed = session
        .confirmed
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize confirmed: {}", e)))?;
    let details = serde_json::to_string(&session.details)
        .map_err(|e| Error::Internal(format!("Failed to serialize details: {}", e)))?;
    let created_at = session.created_at.to_rfc3339();
    let updated_at = session.updated_at.to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO sessions (
            session_id, query_name, query_hints, status, candidates,
            current_index, confirmed, details, report, failure,
            photo_path, archived, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            status = excluded.status,
            candidates = excluded.candidates,
            current_index = excluded.current_index,
            confirmed = excluded.confirmed,
            details = excluded.details,
            report = excluded.report,
            failure = excluded.failure,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&session_id)
    .bind(&session.query_name)
    .bind(&session.query_hints)
    .bind(&status)
    .bind(&candidates)
    .bind(session.current_index as i64)
    .bind(&confirmed)
    .bind(&details)
    .bind(&session.report)
    .bind(&session.failure)
    .bind(&session.photo_path)
    .bind(session.archived as i64)
    .bind(&created_at)
    .bind(&updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a session by id
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, query_name, query_hints, status, candidates,
               current_index, confirmed, details, report, failure,
               photo_path, archived, created_at, updated_at
        FROM sessions
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(session_from_row).transpose()
}

/// Load all non-archived sessions, newest first
pub async fn list_sessions(pool: &SqlitePool) -> Result<Vec<Session>> {
    let rows = sqlx::query(
        r#"
        SELECT session_id, query_name, query_hints, status, candidates,
               current_index, confirmed, details, report, failure,
               photo_path, archived, created_at, updated_at
        FROM sessions
        WHERE archived = 0
        ORDER BY updated_at DESC, session_id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(session_from_row).collect()
}

/// Find an active (non-archived) session for the same name and hints
///
/// Used for duplicate detection at creation time: re-submitting the same
/// query returns the existing session instead of starting a second search.
pub async fn find_existing(
    pool: &SqlitePool,
    query_name: &str,
    query_hints: &str,
) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, query_name, query_hints, status, candidates,
               current_index, confirmed, details, report, failure,
               photo_path, archived, created_at, updated_at
        FROM sessions
        WHERE archived = 0 AND query_name = ? AND query_hints = ?
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(query_name)
    .bind(query_hints)
    .fetch_optional(pool)
    .await?;

    row.map(session_from_row).transpose()
}

/// Record the uploaded photo's relative path
///
/// Guarded in SQL so the path is set at most once; returns false when the
/// session already has a photo (or the row is gone).
pub async fn set_photo_path(pool: &SqlitePool, session_id: Uuid, path: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET photo_path = ?, updated_at = ?
        WHERE session_id = ? AND photo_path IS NULL
        "#,
    )
    .bind(path)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a session archived (hidden from the active list, kept on disk)
pub async fn archive_session(pool: &SqlitePool, session_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE sessions SET archived = 1, updated_at = ? WHERE session_id = ?",
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a session row
pub async fn delete_session(pool: &SqlitePool, session_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
        .bind(session_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Reconstruct a Session from a database row
fn session_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Session> {
    let session_id_str: String = row.get("session_id");
    let session_id = Uuid::parse_str(&session_id_str)
        .map_err(|e| Error::Internal(format!("Failed to parse session_id: {}", e)))?;

    let status: String = row.get("status");
    let status: SessionStatus = serde_json::from_str(&status)
        .map_err(|e| Error::Internal(format!("Failed to deserialize status: {}", e)))?;

    let candidates: String = row.get("candidates");
    let candidates: Vec<Candidate> = serde_json::from_str(&candidates)
        .map_err(|e| Error::Internal(format!("Failed to deserialize candidates: {}", e)))?;

    let confirmed: Option<String> = row.get("confirmed");
    let confirmed: Option<Candidate> = confirmed
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize confirmed: {}", e)))?;

    let details: String = row.get("details");
    let details = serde_json::from_str(&details)
        .map_err(|e| Error::Internal(format!("Failed to deserialize details: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(Session {
        session_id,
        query_name: row.get("query_name"),
        query_hints: row.get("query_hints"),
        status,
        candidates,
        current_index: row.get::<i64, _>("current_index") as usize,
        confirmed,
        details,
        report: row.get("report"),
        failure: row.get("failure"),
        photo_path: row.get("photo_path"),
        archived: row.get::<i64, _>("archived") != 0,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    fn sample_session() -> Session {
        let mut session = Session::new("Jane Doe".to_string(), "Seattle engineer".to_string());
        session.candidates = vec![
            Candidate {
                title: "Jane Doe - LinkedIn".to_string(),
                url: "https://linkedin.example/janedoe".to_string(),
                snippet: "Software engineer in Seattle".to_string(),
            },
            Candidate {
                title: "Jane Doe (@jdoe)".to_string(),
                url: "https://social.example/jdoe".to_string(),
                snippet: "Posts about Rust".to_string(),
            },
        ];
        session.current_index = 1;
        session.status = SessionStatus::AwaitingConfirmation;
        session
            .details
            .insert("title".to_string(), "Jane Doe | Profile".to_string());
        session
    }

    #[tokio::test]
    async fn round_trip_preserves_all_fields() {
        let pool = init_memory_pool().await.unwrap();
        let mut session = sample_session();
        session.confirmed = Some(session.candidates[1].clone());
        session.report = Some("# Report\nJane Doe".to_string());
        session.photo_path = Some("photos/jane.jpg".to_string());

        save_session(&pool, &session).await.unwrap();
        let loaded = load_session(&pool, session.session_id)
            .await
            .unwrap()
            .expect("session should exist");

        assert_eq!(loaded.session_id, session.session_id);
        assert_eq!(loaded.query_name, session.query_name);
        assert_eq!(loaded.query_hints, session.query_hints);
        assert_eq!(loaded.status, session.status);
        assert_eq!(loaded.candidates, session.candidates);
        assert_eq!(loaded.current_index, session.current_index);
        assert_eq!(loaded.confirmed, session.confirmed);
        assert_eq!(loaded.details, session.details);
        assert_eq!(loaded.report, session.report);
        assert_eq!(loaded.failure, session.failure);
        assert_eq!(loaded.photo_path, session.photo_path);
        assert_eq!(loaded.archived, session.archived);
    }

    #[tokio::test]
    async fn save_is_idempotent_upsert() {
        let pool = init_memory_pool().await.unwrap();
        let mut session = sample_session();
        save_session(&pool, &session).await.unwrap();

        session.transition_to(SessionStatus::Collecting);
        session.confirmed = Some(session.candidates[1].clone());
        save_session(&pool, &session).await.unwrap();

        let loaded = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Collecting);
        assert!(loaded.confirmed.is_some());

        let all = list_sessions(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn archived_sessions_leave_the_active_list() {
        let pool = init_memory_pool().await.unwrap();
        let session = sample_session();
        save_session(&pool, &session).await.unwrap();

        assert!(archive_session(&pool, session.session_id).await.unwrap());
        assert!(list_sessions(&pool).await.unwrap().is_empty());

        // Row still present, just archived
        let loaded = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert!(loaded.archived);
    }

    #[tokio::test]
    async fn stale_pipeline_save_preserves_photo_and_archive() {
        let pool = init_memory_pool().await.unwrap();
        let mut session = sample_session();
        save_session(&pool, &session).await.unwrap();

        // Photo recorded and session archived while a pipeline task still
        // holds a clone carrying neither change
        assert!(
            set_photo_path(&pool, session.session_id, "photos/jane.jpg")
                .await
                .unwrap()
        );
        assert!(archive_session(&pool, session.session_id).await.unwrap());

        session.transition_to(SessionStatus::Collecting);
        save_session(&pool, &session).await.unwrap();

        let loaded = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Collecting);
        assert_eq!(loaded.photo_path.as_deref(), Some("photos/jane.jpg"));
        assert!(loaded.archived);
    }

    #[tokio::test]
    async fn photo_path_is_set_at_most_once() {
        let pool = init_memory_pool().await.unwrap();
        let mut session = sample_session();
        session.photo_path = None;
        save_session(&pool, &session).await.unwrap();

        assert!(
            set_photo_path(&pool, session.session_id, "photos/first.jpg")
                .await
                .unwrap()
        );
        assert!(
            !set_photo_path(&pool, session.session_id, "photos/second.jpg")
                .await
                .unwrap()
        );

        let loaded = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.photo_path.as_deref(), Some("photos/first.jpg"));

        // Unknown session id also reports no update
        assert!(!set_photo_path(&pool, Uuid::new_v4(), "photos/x.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn find_existing_matches_name_and_hints() {
        let pool = init_memory_pool().await.unwrap();
        let session = sample_session();
        save_session(&pool, &session).await.unwrap();

        let found = find_existing(&pool, "Jane Doe", "Seattle engineer")
            .await
            .unwrap();
        assert_eq!(found.map(|s| s.session_id), Some(session.session_id));

        let not_found = find_existing(&pool, "Jane Doe", "Portland artist")
            .await
            .unwrap();
        assert!(not_found.is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_row() {
        let pool = init_memory_pool().await.unwrap();
        let session = sample_session();
        save_session(&pool, &session).await.unwrap();

        assert!(delete_session(&pool, session.session_id).await.unwrap());
        assert!(load_session(&pool, session.session_id).await.unwrap().is_none());
        assert!(!delete_session(&pool, session.session_id).await.unwrap());
    }
}
