//! Transcript ingestion.
//!
//! The server stamps each message with the session's current point and its own
//! clock, so extraction watermarks never depend on client clocks. Messages
//! carry an optional client id; resending the same id is a no-op.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;
use crate::db::schemas::{Group, Session, SessionStatus, TranscriptMessage};
use crate::timer::now_ms;

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub author: String,
}

pub fn router() -> Router<ApiState> {
    Router::new().route("/sessions/:id/groups/:gid/messages", post(append_messages))
}

/// Loads a group and checks it belongs to `session_id`.
pub(crate) async fn load_group(state: &ApiState, session_id: &str, group_id: &str) -> ApiResult<Group> {
    state
        .store
        .group(group_id)
        .await?
        .filter(|group| group.session_id == session_id)
        .ok_or_else(|| {
            ApiError::not_found(format!("Group {} not found in session {}", group_id, session_id))
        })
}

/// Stores `messages` for an active session. Returns how many were new.
pub(crate) async fn ingest(
    state: &ApiState,
    session: &Session,
    group_id: &str,
    messages: Vec<IncomingMessage>,
) -> ApiResult<usize> {
    if session.status != SessionStatus::Active {
        return Err(ApiError::bad_request(format!(
            "session is {}, messages are only accepted while active",
            session.status.as_str()
        )));
    }

    let mut appended = 0;
    for incoming in messages {
        let content = incoming.content.trim();
        if content.is_empty() {
            continue;
        }
        let message = TranscriptMessage {
            id: incoming
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            group_id: group_id.to_string(),
            session_id: session.id.clone(),
            point_index: session.current_point,
            content: content.to_string(),
            author: incoming.author,
            timestamp: now_ms(),
        };
        if state.store.append_message(&message).await? {
            appended += 1;
        } else {
            debug!("Message {} already stored", message.id);
        }
    }
    Ok(appended)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AppendRequest {
    Many { messages: Vec<IncomingMessage> },
    One(IncomingMessage),
}

/// POST /sessions/:id/groups/:gid/messages - Append one or more messages.
async fn append_messages(
    State(state): State<ApiState>,
    Path((session_id, group_id)): Path<(String, String)>,
    Json(req): Json<AppendRequest>,
) -> ApiResult<Json<Value>> {
    let session = state
        .store
        .session(&session_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Session {} not found", session_id)))?;
    load_group(&state, &session_id, &group_id).await?;

    let messages = match req {
        AppendRequest::Many { messages } => messages,
        AppendRequest::One(message) => vec![message],
    };
    let appended = ingest(&state, &session, &group_id, messages).await?;

    Ok(Json(json!({
        "success": true,
        "appended": appended,
        "pointIndex": session.current_point,
    })))
}
