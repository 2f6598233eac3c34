//! REST API server for Huddle.
//!
//! Provides HTTP endpoints for:
//! - Session lifecycle (create, launch, end, archive) and groups
//! - Authoritative timer snapshots and change notifications
//! - Transcript ingestion
//! - Shared answer documents and bullet edits
//! - Lease-guarded transcript and ethical analysis

pub mod error;
pub mod routes;

use crate::answers::SharedAnswerStore;
use crate::app::runtime::SessionRuntime;
use crate::config::ServerConfig;
use crate::store::Store;
use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

/// Shared state for every route.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub answers: SharedAnswerStore,
    pub runtime: SessionRuntime,
}

impl ApiState {
    pub fn new(store: Store, runtime: SessionRuntime) -> Self {
        Self {
            answers: SharedAnswerStore::new(store.clone()),
            store,
            runtime,
        }
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        // Root and version endpoints
        .route("/", get(status))
        .route("/version", get(version))
        .merge(routes::sessions::router())
        .merge(routes::transcript::router())
        .merge(routes::answers::router())
        .merge(routes::analysis::router())
        .layer(ServiceBuilder::new())
        .with_state(state)
}

pub struct ApiServer {
    bind: String,
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(config: &ServerConfig, state: ApiState) -> Self {
        Self {
            bind: config.bind.clone(),
            port: config.port,
            state,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = build_router(self.state);
        let addr = format!("{}:{}", self.bind, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /                                     - Service info");
        info!("  POST /sessions                             - Create draft session");
        info!("  GET  /sessions/:id                         - Get session");
        info!("  POST /sessions/:id/groups                  - Add group");
        info!("  POST /sessions/:id/launch|end|archive      - Lifecycle");
        info!("  GET  /sessions/:id/timer                   - Authoritative timer");
        info!("  GET  /sessions/:id/changes                 - Wait for changes");
        info!("  POST /sessions/:id/groups/:gid/messages    - Append transcript");
        info!("  GET  /sessions/:id/groups/:gid/answers     - Shared answers");
        info!("  POST /transcript-analysis/:group_id        - Extract key points");
        info!("  POST /ethical-analysis/:group_id           - Classify messages");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "huddle",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "huddle"
    }))
}
