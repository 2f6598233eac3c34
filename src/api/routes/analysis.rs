//! Lease-guarded analysis endpoints.
//!
//! Both pipelines answer a lost lease race with
//! `{success:false, status:"in_progress", currentStatus}` and a 200, so
//! callers simply wait for their next poll.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use super::transcript::{ingest, load_group, IncomingMessage};
use crate::api::error::ApiResult;
use crate::api::ApiState;
use crate::db::schemas::SessionStatus;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsQuery {
    pub session_id: String,
}

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/transcript-analysis/:group_id", post(transcript_analysis))
        .route(
            "/ethical-analysis/:group_id",
            post(ethical_analysis).get(ethical_counts),
        )
}

/// Stores any messages sent along with the request. A missing or inactive
/// session is not an error here; the job itself decides what to do.
async fn ingest_body(state: &ApiState, req: &mut AnalysisRequest, group_id: &str) -> ApiResult<()> {
    if req.messages.is_empty() {
        return Ok(());
    }
    let Some(session) = state.store.session(&req.session_id).await? else {
        return Ok(());
    };
    if session.status != SessionStatus::Active {
        debug!(
            "Ignoring {} messages for {} session {}",
            req.messages.len(),
            session.status.as_str(),
            session.id
        );
        return Ok(());
    }
    load_group(state, &session.id, group_id).await?;

    let appended = ingest(state, &session, group_id, std::mem::take(&mut req.messages)).await?;
    debug!("Ingested {} new messages for {}/{}", appended, session.id, group_id);
    Ok(())
}

/// True when `group_id` exists and belongs to `session_id`.
async fn group_in_session(state: &ApiState, session_id: &str, group_id: &str) -> ApiResult<bool> {
    Ok(state
        .store
        .group(group_id)
        .await?
        .is_some_and(|group| group.session_id == session_id))
}

fn respond(kind: &str, result: CoreResult<String>) -> Response {
    match result {
        Ok(message) => Json(json!({ "success": true, "message": message })).into_response(),
        Err(CoreError::LeaseContention { current_status }) => Json(json!({
            "success": false,
            "status": "in_progress",
            "currentStatus": current_status,
        }))
        .into_response(),
        Err(CoreError::NotFound(what)) => {
            debug!("{} analysis skipped, {} not found", kind, what);
            Json(json!({ "success": true, "message": "Nothing to analyse" })).into_response()
        }
        Err(CoreError::Validation(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "status": "invalid", "message": reason })),
        )
            .into_response(),
        Err(CoreError::Upstream(reason)) => {
            error!("{} analysis failed: {}", kind, reason);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "success": false, "status": "failed", "message": reason })),
            )
                .into_response()
        }
    }
}

/// POST /transcript-analysis/:group_id - Extract new key points for a group.
async fn transcript_analysis(
    State(state): State<ApiState>,
    Path(group_id): Path<String>,
    Json(mut req): Json<AnalysisRequest>,
) -> ApiResult<Response> {
    ingest_body(&state, &mut req, &group_id).await?;

    info!("Transcript analysis requested for {}/{}", req.session_id, group_id);
    if !group_in_session(&state, &req.session_id, &group_id).await? {
        let missing = CoreError::not_found(format!("group {} in session {}", group_id, req.session_id));
        return Ok(respond("Transcript", Err(missing)));
    }
    let result = state
        .runtime
        .analysis()
        .run_transcript(&req.session_id, &group_id)
        .await
        .map(|outcome| outcome.message());
    Ok(respond("Transcript", result))
}

/// POST /ethical-analysis/:group_id - Classify unlabelled messages.
async fn ethical_analysis(
    State(state): State<ApiState>,
    Path(group_id): Path<String>,
    Json(mut req): Json<AnalysisRequest>,
) -> ApiResult<Response> {
    ingest_body(&state, &mut req, &group_id).await?;

    info!("Ethical analysis requested for {}/{}", req.session_id, group_id);
    if !group_in_session(&state, &req.session_id, &group_id).await? {
        let missing = CoreError::not_found(format!("group {} in session {}", group_id, req.session_id));
        return Ok(respond("Ethical", Err(missing)));
    }
    let result = state
        .runtime
        .analysis()
        .run_ethics(&req.session_id, &group_id)
        .await
        .map(|outcome| outcome.message());
    Ok(respond("Ethical", result))
}

/// GET /ethical-analysis/:group_id?sessionId= - Per-category counts.
async fn ethical_counts(
    State(state): State<ApiState>,
    Path(group_id): Path<String>,
    Query(query): Query<CountsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let counts = state
        .store
        .classification_counts(&query.session_id, &group_id)
        .await?;
    let total_messages = state.store.message_count(&query.session_id, &group_id).await?;
    Ok(Json(json!({
        "sessionId": query.session_id,
        "groupId": group_id,
        "counts": counts,
        "totalMessages": total_messages,
    })))
}
