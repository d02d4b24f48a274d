//! Session API handlers
//!
//! POST /sessions, GET /sessions, GET /sessions/{id},
//! POST /sessions/{id}/signal, PUT /sessions/{id}/photo,
//! POST /sessions/{id}/archive, DELETE /sessions/{id}
//!
//! Pipeline work runs in spawned background tasks; handlers only validate,
//! persist the session row, and kick the flow. Task failures are logged and
//! leave the session in its last-persisted state.

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::sessions as db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Candidate, Session, SessionStatus, UserSignal};
use crate::AppState;

/// POST /sessions request
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    #[serde(default)]
    pub hints: String,
}

/// POST /sessions response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    /// True when an active session for the same query already existed and
    /// was returned instead of starting a new search
    pub existing: bool,
}

/// Session list entry
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub query_name: String,
    pub query_hints: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// GET /sessions/{id} response
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub query_name: String,
    pub query_hints: String,
    pub status: SessionStatus,
    pub candidates: Vec<Candidate>,
    pub current_index: usize,
    /// The candidate currently presented for confirmation, if awaiting one
    pub current_candidate: Option<Candidate>,
    pub confirmed: Option<Candidate>,
    pub details: std::collections::HashMap<String, String>,
    pub report: Option<String>,
    pub failure: Option<String>,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        let current_candidate = if session.status == SessionStatus::AwaitingConfirmation {
            session.current_candidate().cloned()
        } else {
            None
        };
        SessionView {
            session_id: session.session_id,
            query_name: session.query_name,
            query_hints: session.query_hints,
            status: session.status,
            candidates: session.candidates,
            current_index: session.current_index,
            current_candidate,
            confirmed: session.confirmed,
            details: session.details,
            report: session.report,
            failure: session.failure,
            photo_path: session.photo_path,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// POST /sessions/{id}/signal request
#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub signal: String,
}

/// POST /sessions/{id}/signal response
#[derive(Debug, Serialize)]
pub struct SignalResponse {
    pub session_id: Uuid,
    pub accepted: bool,
}

/// PUT /sessions/{id}/photo response
#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub session_id: Uuid,
    pub photo_path: String,
}

/// POST /sessions
///
/// Creates a session and spawns the first pipeline run. Re-submitting the
/// same name and hints returns the existing active session.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<CreateSessionResponse>> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let hints = request.hints.trim().to_string();

    // Duplicate detection before creating a new row
    if let Some(existing) = db::find_existing(&state.db, &name, &hints).await? {
        tracing::info!(
            session_id = %existing.session_id,
            "Returning existing session for duplicate query"
        );
        return Ok(Json(CreateSessionResponse {
            session_id: existing.session_id,
            status: existing.status,
            existing: true,
        }));
    }

    let session = Session::new(name, hints);
    db::save_session(&state.db, &session).await?;

    tracing::info!(
        session_id = %session.session_id,
        name = %session.query_name,
        "Session created"
    );

    let response = CreateSessionResponse {
        session_id: session.session_id,
        status: session.status,
        existing: false,
    };

    spawn_advance(state, session, None);

    Ok(Json(response))
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<SessionSummary>>> {
    let sessions = db::list_sessions(&state.db).await?;
    let summaries = sessions
        .into_iter()
        .map(|s| SessionSummary {
            session_id: s.session_id,
            query_name: s.query_name,
            query_hints: s.query_hints,
            status: s.status,
            created_at: s.created_at,
            updated_at: s.updated_at,
        })
        .collect();
    Ok(Json(summaries))
}

/// GET /sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = load_or_404(&state, session_id).await?;
    Ok(Json(session.into()))
}

/// POST /sessions/{id}/signal
///
/// Accepts a yes/next decision for a session awaiting confirmation and
/// spawns the continuation. 409 when the session is in any other state.
pub async fn post_signal(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SignalRequest>,
) -> ApiResult<Json<SignalResponse>> {
    let signal = UserSignal::parse(&request.signal).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unrecognized signal '{}' (expected yes or next)",
            request.signal
        ))
    })?;

    let session = load_or_404(&state, session_id).await?;
    if session.status != SessionStatus::AwaitingConfirmation {
        return Err(ApiError::Conflict(format!(
            "Session is not awaiting confirmation (status: {})",
            serde_json::to_string(&session.status).unwrap_or_default()
        )));
    }

    tracing::info!(session_id = %session_id, signal = ?signal, "Signal accepted");
    spawn_advance(state, session, Some(signal));

    Ok(Json(SignalResponse {
        session_id,
        accepted: true,
    }))
}

/// PUT /sessions/{id}/photo
///
/// Stores one uploaded image under the configured photo directory and
/// records its relative path on the session. The path is set at most once.
pub async fn upload_photo(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<Json<PhotoResponse>> {
    let session = load_or_404(&state, session_id).await?;
    if session.photo_path.is_some() {
        return Err(ApiError::Conflict(
            "Session already has a photo".to_string(),
        ));
    }

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
        .ok_or_else(|| ApiError::BadRequest("Missing file field".to_string()))?;

    // Strip any directory components from the client-supplied name
    let file_name = field
        .file_name()
        .map(|n| n.to_string())
        .and_then(|n| {
            std::path::Path::new(&n)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
        })
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing file name".to_string()))?;

    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    std::fs::create_dir_all(&state.config.photo_dir).map_err(crate::error::Error::Io)?;
    let relative = format!("{}-{}", session_id, file_name);
    let dest = state.config.photo_dir.join(&relative);
    std::fs::write(&dest, &bytes).map_err(crate::error::Error::Io)?;

    // Targeted update: a concurrently running pipeline task saves the
    // session row too, and must not race the photo path away
    if !db::set_photo_path(&state.db, session_id, &relative).await? {
        return Err(ApiError::Conflict(
            "Session already has a photo".to_string(),
        ));
    }

    tracing::info!(
        session_id = %session_id,
        path = %dest.display(),
        size = bytes.len(),
        "Photo stored"
    );

    Ok(Json(PhotoResponse {
        session_id,
        photo_path: relative,
    }))
}

/// POST /sessions/{id}/archive
pub async fn archive_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !db::archive_session(&state.db, session_id).await? {
        return Err(ApiError::NotFound(format!(
            "Session not found: {}",
            session_id
        )));
    }
    Ok(Json(serde_json::json!({ "session_id": session_id, "archived": true })))
}

/// DELETE /sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !db::delete_session(&state.db, session_id).await? {
        return Err(ApiError::NotFound(format!(
            "Session not found: {}",
            session_id
        )));
    }
    Ok(Json(serde_json::json!({ "session_id": session_id, "deleted": true })))
}

async fn load_or_404(state: &AppState, session_id: Uuid) -> ApiResult<Session> {
    db::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))
}

/// Run one pipeline advance in the background
fn spawn_advance(state: AppState, session: Session, signal: Option<UserSignal>) {
    let session_id = session.session_id;
    tokio::spawn(async move {
        if let Err(e) = state.flow.advance(session, signal).await {
            tracing::error!(
                session_id = %session_id,
                error = %e,
                "Pipeline task failed; session left in last-persisted state"
            );
        }
    });
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/signal", post(post_signal))
        .route("/sessions/:id/photo", put(upload_photo))
        .route("/sessions/:id/archive", post(archive_session))
}
