//! Session lifecycle, group and timer endpoints.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;
use crate::db::schemas::{Group, Point, Session, SessionStatus};
use crate::timer::{now_ms, TimerSnapshot};

const MAX_CHANGE_WAIT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: String,
    pub total_duration_secs: u64,
    pub points: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddGroupRequest {
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    /// Seconds to wait for a change (default 25, at most 60).
    pub timeout: Option<u64>,
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/groups", post(add_group).get(list_groups))
        .route("/sessions/:id/launch", post(launch_session))
        .route("/sessions/:id/end", post(end_session))
        .route("/sessions/:id/archive", post(archive_session))
        .route("/sessions/:id/timer", get(timer))
        .route("/sessions/:id/changes", get(wait_for_change))
}

async fn load_session(state: &ApiState, id: &str) -> ApiResult<Session> {
    state
        .store
        .session(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Session {} not found", id)))
}

/// POST /sessions - Create a draft session.
async fn create_session(
    State(state): State<ApiState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<Json<Session>> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    if req.total_duration_secs == 0 {
        return Err(ApiError::bad_request("totalDurationSecs must be positive"));
    }
    if req.points.is_empty() || req.points.iter().any(|p| p.trim().is_empty()) {
        return Err(ApiError::bad_request("points must be non-empty prompts"));
    }

    let session = Session {
        id: uuid::Uuid::new_v4().to_string(),
        title: title.to_string(),
        launched_at: None,
        total_duration_secs: req.total_duration_secs,
        points: req
            .points
            .iter()
            .enumerate()
            .map(|(i, content)| Point::new(i, content.trim()))
            .collect(),
        current_point: 0,
        status: SessionStatus::Draft,
    };
    state.store.create_session(&session).await?;

    info!("Created session {} ({} points)", session.id, session.points.len());
    Ok(Json(session))
}

/// GET /sessions/:id
async fn get_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    Ok(Json(load_session(&state, &id).await?))
}

/// POST /sessions/:id/groups - Add a group to a session.
async fn add_group(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<AddGroupRequest>>,
) -> ApiResult<Json<Group>> {
    let session = load_session(&state, &id).await?;
    let members = body.map(|Json(req)| req.members).unwrap_or_default();

    let group = Group {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        member_ids: members,
    };
    state.store.add_group(&group).await?;
    if session.status == SessionStatus::Active {
        state.runtime.group_added(&session.id, &group.id).await;
    }

    Ok(Json(group))
}

/// GET /sessions/:id/groups
async fn list_groups(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Group>>> {
    load_session(&state, &id).await?;
    Ok(Json(state.store.groups(&id).await?))
}

/// POST /sessions/:id/launch - draft -> active.
async fn launch_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerSnapshot>> {
    load_session(&state, &id).await?;
    let session = state.runtime.launch(&id).await?;
    Ok(Json(TimerSnapshot::from_session(&session, now_ms())))
}

/// POST /sessions/:id/end - Finish an active session early.
async fn end_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerSnapshot>> {
    load_session(&state, &id).await?;
    state.runtime.end(&id).await?;
    let session = load_session(&state, &id).await?;
    Ok(Json(TimerSnapshot::from_session(&session, now_ms())))
}

/// POST /sessions/:id/archive - completed -> archived.
async fn archive_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session = load_session(&state, &id).await?;
    if !state.store.archive_session(&id).await? {
        return Err(ApiError::bad_request(format!(
            "session is {}, only completed sessions can be archived",
            session.status.as_str()
        )));
    }
    Ok(Json(json!({ "success": true, "status": "archived" })))
}

/// GET /sessions/:id/timer - Authoritative countdown snapshot.
async fn timer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimerSnapshot>> {
    let session = load_session(&state, &id).await?;
    Ok(Json(TimerSnapshot::from_session(&session, now_ms())))
}

/// GET /sessions/:id/changes - Wait until anything in the session changes.
async fn wait_for_change(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<Json<Value>> {
    load_session(&state, &id).await?;
    let wait = Duration::from_secs(query.timeout.unwrap_or(25).min(MAX_CHANGE_WAIT_SECS));

    let mut subscription = state.store.feed().subscribe_all(&id);
    match tokio::time::timeout(wait, subscription.next()).await {
        Ok(Some(event)) => Ok(Json(json!({
            "changed": true,
            "entity": event.entity,
            "groupId": event.group_id,
        }))),
        Ok(None) | Err(_) => Ok(Json(json!({ "changed": false }))),
    }
}
