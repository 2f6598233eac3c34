//! End-to-end HTTP flow against an in-memory store.

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tower::ServiceExt;

use huddle::analysis::{
    AnalysisCoordinator, AnalysisService, EthicalAnalyzer, IncrementalExtractor,
    MemoryKeyValueStore,
};
use huddle::api::{build_router, ApiState};
use huddle::app::runtime::SessionRuntime;
use huddle::config::Config;
use huddle::llm::{LlmProvider, LlmRequest};
use huddle::store::Store;

/// Answers every call with `reply`, but only after the test opens the gate.
struct GatedLlm {
    reply: String,
    entered: mpsc::UnboundedSender<()>,
    gate: Notify,
}

#[async_trait]
impl LlmProvider for GatedLlm {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn complete(&self, _request: &LlmRequest) -> Result<String> {
        let _ = self.entered.send(());
        self.gate.notified().await;
        Ok(self.reply.clone())
    }
}

struct Harness {
    app: Router,
    llm: Arc<GatedLlm>,
    entered: mpsc::UnboundedReceiver<()>,
}

fn harness(reply: &str) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let llm = Arc::new(GatedLlm {
        reply: reply.to_string(),
        entered: tx,
        gate: Notify::new(),
    });

    let mut config = Config::default();
    config.analysis.auto_poll = false;

    let store = Store::in_memory().unwrap();
    let provider: Arc<dyn LlmProvider> = llm.clone();
    let analysis = AnalysisService::new(
        AnalysisCoordinator::new(Arc::new(MemoryKeyValueStore::new()), Duration::from_secs(30)),
        IncrementalExtractor::new(
            store.clone(),
            Arc::clone(&provider),
            0.7,
            Duration::from_secs(5),
        )
        .unwrap(),
        EthicalAnalyzer::new(store.clone(), provider, Duration::from_secs(5)).unwrap(),
    );
    let runtime = SessionRuntime::new(store.clone(), Arc::new(analysis), &config);

    Harness {
        app: build_router(ApiState::new(store, runtime)),
        llm,
        entered: rx,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Creates, populates and launches a two-point session with one group.
async fn launched_session(app: &Router) -> (String, String) {
    let (status, session) = call(
        app,
        "POST",
        "/sessions",
        Some(json!({
            "title": "Ocean plastics",
            "totalDurationSecs": 600,
            "points": ["Effects on wildlife", "Possible solutions"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["status"], "draft");
    let session_id = session["id"].as_str().unwrap().to_string();

    let (status, group) = call(
        app,
        "POST",
        &format!("/sessions/{session_id}/groups"),
        Some(json!({ "members": ["ana", "ben"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let group_id = group["id"].as_str().unwrap().to_string();

    let (status, snapshot) = call(app, "POST", &format!("/sessions/{session_id}/launch"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["status"], "active");

    (session_id, group_id)
}

#[tokio::test]
async fn test_concurrent_analysis_reports_in_progress() {
    let mut h = harness(r#"{"points": ["Plastic harms sea turtles"]}"#);
    let (session_id, group_id) = launched_session(&h.app).await;

    let first = {
        let app = h.app.clone();
        let uri = format!("/transcript-analysis/{group_id}");
        let body = json!({
            "sessionId": session_id,
            "messages": [{ "id": "m1", "author": "ana", "content": "Plastic is hurting turtles" }],
        });
        tokio::spawn(async move { call(&app, "POST", &uri, Some(body)).await })
    };

    // First job is now parked inside the LLM call while holding the lease.
    h.entered.recv().await.unwrap();

    let (status, busy) = call(
        &h.app,
        "POST",
        &format!("/transcript-analysis/{group_id}"),
        Some(json!({ "sessionId": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(busy["success"], false);
    assert_eq!(busy["status"], "in_progress");
    assert_eq!(busy["currentStatus"], "analysing 1 new messages");

    h.llm.gate.notify_one();
    let (status, done) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["success"], true);
    assert!(done["message"].as_str().unwrap().starts_with("Added 1"));

    let (_, answers) = call(
        &h.app,
        "GET",
        &format!("/sessions/{session_id}/groups/{group_id}/answers"),
        None,
    )
    .await;
    assert_eq!(answers["answers"]["point_0"][0]["content"], "Plastic harms sea turtles");

    // Lease was released, so the next run goes through and finds nothing new.
    let (_, again) = call(
        &h.app,
        "POST",
        &format!("/transcript-analysis/{group_id}"),
        Some(json!({ "sessionId": session_id })),
    )
    .await;
    assert_eq!(again["success"], true);
    assert_eq!(again["message"], "No new messages since last analysis");
}

#[tokio::test]
async fn test_answer_tombstones_over_http() {
    let h = harness(r#"{"points": []}"#);
    let (session_id, group_id) = launched_session(&h.app).await;
    let base = format!("/sessions/{session_id}/groups/{group_id}/answers/point_0");

    let (status, _) = call(&h.app, "POST", &base, Some(json!({ "content": "Nets trap dolphins" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&h.app, "DELETE", &format!("{base}/0"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, doc) = call(
        &h.app,
        "GET",
        &format!("/sessions/{session_id}/groups/{group_id}/answers"),
        None,
    )
    .await;
    assert_eq!(doc["answers"]["point_0"][0]["isDeleted"], true);

    let (status, _) = call(&h.app, "POST", &format!("{base}/0/undo"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, doc) = call(
        &h.app,
        "GET",
        &format!("/sessions/{session_id}/groups/{group_id}/answers"),
        None,
    )
    .await;
    assert_eq!(doc["answers"]["point_0"][0]["isDeleted"], false);
    assert_eq!(doc["answers"]["point_0"][0]["content"], "Nets trap dolphins");

    let (status, body) = call(&h.app, "DELETE", &format!("{base}/7"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_timer_and_unknown_session() {
    let h = harness(r#"{"points": []}"#);
    let (session_id, _) = launched_session(&h.app).await;

    let (status, snapshot) = call(&h.app, "GET", &format!("/sessions/{session_id}/timer"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["authoritative"], true);
    assert_eq!(snapshot["currentPoint"], 0);
    assert_eq!(snapshot["timeUp"], false);
    assert!(snapshot["remainingSecs"].as_u64().unwrap() <= 600);

    let (status, body) = call(&h.app, "GET", "/sessions/missing/timer", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);

    let (status, body) = call(
        &h.app,
        "POST",
        "/transcript-analysis/nobody",
        Some(json!({ "sessionId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_end_session_stops_message_intake() {
    let h = harness(r#"{"points": []}"#);
    let (session_id, group_id) = launched_session(&h.app).await;

    let (status, snapshot) = call(&h.app, "POST", &format!("/sessions/{session_id}/end"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["status"], "completed");
    assert_eq!(snapshot["timeUp"], true);

    let (status, _) = call(
        &h.app,
        "POST",
        &format!("/sessions/{session_id}/groups/{group_id}/messages"),
        Some(json!({ "content": "too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_answers_require_known_group_and_running_session() {
    let h = harness(r#"{"points": []}"#);

    let orphan = "/sessions/no-such-session/groups/no-such-group/answers";
    let (status, _) = call(&h.app, "POST", &format!("{orphan}/point_0"), Some(json!({ "content": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&h.app, "GET", orphan, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (session_id, group_id) = launched_session(&h.app).await;
    let (status, _) = call(
        &h.app,
        "POST",
        &format!("/sessions/{session_id}/groups/stranger/answers/point_0"),
        Some(json!({ "content": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Draft sessions have no answers yet
    let (_, draft) = call(
        &h.app,
        "POST",
        "/sessions",
        Some(json!({ "title": "Later", "totalDurationSecs": 60, "points": ["One"] })),
    )
    .await;
    let draft_id = draft["id"].as_str().unwrap().to_string();
    let (_, group) = call(&h.app, "POST", &format!("/sessions/{draft_id}/groups"), None).await;
    let draft_group = group["id"].as_str().unwrap().to_string();
    let (status, _) = call(
        &h.app,
        "POST",
        &format!("/sessions/{draft_id}/groups/{draft_group}/answers/point_0"),
        Some(json!({ "content": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown group in a real session: silent, and no document appears
    let (status, body) = call(
        &h.app,
        "POST",
        "/transcript-analysis/stranger",
        Some(json!({ "sessionId": session_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Nothing to analyse");

    let (_, doc) = call(
        &h.app,
        "GET",
        &format!("/sessions/{session_id}/groups/{group_id}/answers"),
        None,
    )
    .await;
    assert_eq!(doc["answers"], json!({}));
}
