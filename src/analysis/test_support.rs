use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::coordinator::{AnalysisCoordinator, AnalysisKind, JobKey, StatusReporter};
use super::lease::MemoryKeyValueStore;
use crate::db::schemas::{Group, Point, Session, SessionStatus, TranscriptMessage};
use crate::llm::{LlmProvider, LlmRequest};
use crate::store::Store;

/// Replays canned answers and records every request it was sent.
#[derive(Default)]
pub struct ScriptedLlm {
    answers: Mutex<VecDeque<Result<String>>>,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(answers: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"points": []}"#.to_string()))
    }
}

pub fn reporter() -> StatusReporter {
    let coordinator = AnalysisCoordinator::new(
        Arc::new(MemoryKeyValueStore::new()),
        Duration::from_secs(30),
    );
    coordinator.reporter(&JobKey::new(AnalysisKind::Transcript, "s1", "g1"))
}

/// Active session "s1" launched at 0 with group "g1".
pub async fn active_session(store: &Store, prompts: &[&str]) {
    let session = Session {
        id: "s1".to_string(),
        title: "Plastics".to_string(),
        launched_at: Some(0),
        total_duration_secs: 600,
        points: prompts
            .iter()
            .enumerate()
            .map(|(i, p)| Point::new(i, *p))
            .collect(),
        current_point: 0,
        status: SessionStatus::Draft,
    };
    store.create_session(&session).await.unwrap();
    store.launch_session("s1", 0, &session.points).await.unwrap();
    store
        .add_group(&Group {
            id: "g1".to_string(),
            session_id: "s1".to_string(),
            member_ids: vec!["ana".to_string(), "ben".to_string()],
        })
        .await
        .unwrap();
}

pub async fn say(store: &Store, id: &str, point_index: usize, content: &str, timestamp: i64) {
    store
        .append_message(&TranscriptMessage {
            id: id.to_string(),
            group_id: "g1".to_string(),
            session_id: "s1".to_string(),
            point_index,
            content: content.to_string(),
            author: "ana".to_string(),
            timestamp,
        })
        .await
        .unwrap();
}
