//! Shared answer document endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::transcript::load_group;
use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;
use crate::db::schemas::{Session, SessionStatus, SharedAnswers};

#[derive(Debug, Deserialize)]
pub struct BulletRequest {
    pub content: String,
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/sessions/:id/groups/:gid/answers", get(get_answers))
        .route("/sessions/:id/groups/:gid/answers/:point_key", post(append_bullet))
        .route(
            "/sessions/:id/groups/:gid/answers/:point_key/:index",
            put(edit_bullet).delete(delete_bullet),
        )
        .route(
            "/sessions/:id/groups/:gid/answers/:point_key/:index/undo",
            post(undo_bullet),
        )
}

/// Loads the session and checks the group belongs to it.
async fn load_scope(state: &ApiState, session_id: &str, group_id: &str) -> ApiResult<Session> {
    let session = state
        .store
        .session(session_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Session {} not found", session_id)))?;
    load_group(state, session_id, group_id).await?;
    Ok(session)
}

/// Bullets change only once a session has run and until it is archived.
async fn writable_scope(state: &ApiState, session_id: &str, group_id: &str) -> ApiResult<()> {
    let session = load_scope(state, session_id, group_id).await?;
    match session.status {
        SessionStatus::Active | SessionStatus::Completed => Ok(()),
        SessionStatus::Draft | SessionStatus::Archived => Err(ApiError::bad_request(format!(
            "session is {}, answers are read-only",
            session.status.as_str()
        ))),
    }
}

fn updated(done: bool, point_key: &str, index: usize) -> ApiResult<Json<Value>> {
    if !done {
        return Err(ApiError::not_found(format!(
            "Bullet {} of {} not found",
            index, point_key
        )));
    }
    Ok(Json(json!({ "success": true })))
}

/// GET /sessions/:id/groups/:gid/answers - Empty document when nothing exists yet.
async fn get_answers(
    State(state): State<ApiState>,
    Path((session_id, group_id)): Path<(String, String)>,
) -> ApiResult<Json<SharedAnswers>> {
    load_scope(&state, &session_id, &group_id).await?;
    let doc = state
        .answers
        .get(&session_id, &group_id)
        .await?
        .unwrap_or_else(|| SharedAnswers::empty(&session_id, &group_id));
    Ok(Json(doc))
}

/// POST /sessions/:id/groups/:gid/answers/:point_key - Add a bullet.
async fn append_bullet(
    State(state): State<ApiState>,
    Path((session_id, group_id, point_key)): Path<(String, String, String)>,
    Json(req): Json<BulletRequest>,
) -> ApiResult<Json<Value>> {
    writable_scope(&state, &session_id, &group_id).await?;
    let index = state
        .answers
        .append(&session_id, &group_id, &point_key, &req.content)
        .await?;
    Ok(Json(json!({ "success": true, "index": index })))
}

/// PUT /sessions/:id/groups/:gid/answers/:point_key/:index - Edit a bullet.
async fn edit_bullet(
    State(state): State<ApiState>,
    Path((session_id, group_id, point_key, index)): Path<(String, String, String, usize)>,
    Json(req): Json<BulletRequest>,
) -> ApiResult<Json<Value>> {
    writable_scope(&state, &session_id, &group_id).await?;
    let done = state
        .answers
        .edit(&session_id, &group_id, &point_key, index, &req.content)
        .await?;
    updated(done, &point_key, index)
}

/// DELETE /sessions/:id/groups/:gid/answers/:point_key/:index - Tombstone a bullet.
async fn delete_bullet(
    State(state): State<ApiState>,
    Path((session_id, group_id, point_key, index)): Path<(String, String, String, usize)>,
) -> ApiResult<Json<Value>> {
    writable_scope(&state, &session_id, &group_id).await?;
    let done = state
        .answers
        .delete(&session_id, &group_id, &point_key, index)
        .await?;
    updated(done, &point_key, index)
}

/// POST /sessions/:id/groups/:gid/answers/:point_key/:index/undo - Restore a bullet.
async fn undo_bullet(
    State(state): State<ApiState>,
    Path((session_id, group_id, point_key, index)): Path<(String, String, String, usize)>,
) -> ApiResult<Json<Value>> {
    writable_scope(&state, &session_id, &group_id).await?;
    let done = state
        .answers
        .undo(&session_id, &group_id, &point_key, index)
        .await?;
    updated(done, &point_key, index)
}
