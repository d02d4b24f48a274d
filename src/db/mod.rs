//! Database access
//!
//! Single-table SQLite persistence for search sessions. Structured fields
//! (status, candidates, confirmed candidate, details) are stored as
//! serialized JSON text attached to the session row.

pub mod sessions;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory pool for tests
///
/// Capped at one connection: each SQLite `:memory:` connection is its own
/// database, so a wider pool would scatter the table across databases.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the sessions table if it doesn't exist
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            query_name TEXT NOT NULL,
            query_hints TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            candidates TEXT NOT NULL DEFAULT '[]',
            current_index INTEGER NOT NULL DEFAULT 0,
            confirmed TEXT,
            details TEXT NOT NULL DEFAULT '{}',
            report TEXT,
            failure TEXT,
            photo_path TEXT,
            archived INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_archived ON sessions(archived)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (sessions)");

    Ok(())
}
