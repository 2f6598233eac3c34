//! Incremental key-point extraction for one group.
//!
//! Each run looks only at transcript messages newer than the answer
//! document's watermark, asks the LLM for new points, drops near-duplicates
//! and appends the survivors. Nothing is written unless the whole run
//! succeeds, so a failed run is simply repeated by the next poll.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::coordinator::StatusReporter;
use super::similarity::filter_novel;
use crate::db::schemas::{point_key, BulletPoint, SessionStatus, SharedAnswers};
use crate::error::{CoreError, CoreResult};
use crate::llm::{prompts, LlmProvider, ResponseParser};
use crate::store::Store;
use crate::timer::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Session not running or its current point is missing.
    NoCurrentPoint,
    /// No messages since the watermark.
    NothingNew,
    Applied { added: usize, rejected: usize },
}

impl ExtractOutcome {
    pub fn message(&self) -> String {
        match self {
            ExtractOutcome::NoCurrentPoint => "No active point to analyse".to_string(),
            ExtractOutcome::NothingNew => "No new messages since last analysis".to_string(),
            ExtractOutcome::Applied { added, rejected } => {
                format!("Added {added} new points ({rejected} duplicates skipped)")
            }
        }
    }
}

pub struct IncrementalExtractor {
    store: Store,
    llm: Arc<dyn LlmProvider>,
    parser: ResponseParser,
    threshold: f64,
    llm_timeout: Duration,
}

impl IncrementalExtractor {
    pub fn new(
        store: Store,
        llm: Arc<dyn LlmProvider>,
        threshold: f64,
        llm_timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            llm,
            parser: ResponseParser::new()?,
            threshold,
            llm_timeout,
        })
    }

    pub async fn extract(
        &self,
        session_id: &str,
        group_id: &str,
        status: &StatusReporter,
    ) -> CoreResult<ExtractOutcome> {
        self.extract_at(session_id, group_id, now_ms(), status).await
    }

    /// One run with `now` as its start. Must only be called while holding the
    /// group's lease.
    pub async fn extract_at(
        &self,
        session_id: &str,
        group_id: &str,
        now: i64,
        status: &StatusReporter,
    ) -> CoreResult<ExtractOutcome> {
        let Some(session) = self.store.session(session_id).await? else {
            debug!("Session {} not found, skipping extraction", session_id);
            return Ok(ExtractOutcome::NoCurrentPoint);
        };
        if matches!(session.status, SessionStatus::Draft | SessionStatus::Archived) {
            return Ok(ExtractOutcome::NoCurrentPoint);
        }
        let Some(point) = session.current() else {
            debug!(
                "Session {} has no point {}, skipping extraction",
                session_id, session.current_point
            );
            return Ok(ExtractOutcome::NoCurrentPoint);
        };
        if !self
            .store
            .group(group_id)
            .await?
            .is_some_and(|group| group.session_id == session_id)
        {
            debug!("Group {} not in session {}, skipping extraction", group_id, session_id);
            return Ok(ExtractOutcome::NoCurrentPoint);
        }
        let topic = point.content.trim();
        if topic.is_empty() {
            return Err(CoreError::validation(format!(
                "point {} has no prompt",
                point.index
            )));
        }

        status.report("loading transcript").await;
        let watermark = match self.store.answers(session_id, group_id).await? {
            Some(doc) => doc.last_updated,
            None => {
                self.store.init_answers(session_id, group_id).await?;
                0
            }
        };

        let messages = self
            .store
            .messages_between(session_id, group_id, point.index, watermark, now)
            .await?;
        if messages.is_empty() {
            return Ok(ExtractOutcome::NothingNew);
        }

        let key = point_key(point.index);
        let existing = self
            .store
            .answers(session_id, group_id)
            .await?
            .map(|doc| doc.live_contents(&key))
            .unwrap_or_default();

        status
            .report(&format!("analysing {} new messages", messages.len()))
            .await;
        let request = prompts::key_points(topic, &existing, &messages);
        let raw = tokio::time::timeout(self.llm_timeout, self.llm.complete(&request))
            .await
            .map_err(|_| {
                CoreError::upstream(format!(
                    "{} timed out after {:?}",
                    self.llm.name(),
                    self.llm_timeout
                ))
            })?
            .map_err(|e| CoreError::upstream(format!("{} failed: {e:#}", self.llm.name())))?;
        let candidates = self
            .parser
            .points(&raw)
            .map_err(|e| CoreError::validation(format!("{e:#}")))?;
        let offered = candidates.len();

        status.report("saving points").await;
        // Re-read so edits made during the LLM call are kept and checked against.
        let mut doc = self
            .store
            .answers(session_id, group_id)
            .await?
            .unwrap_or_else(|| SharedAnswers::empty(session_id, group_id));
        let accepted = filter_novel(&doc.live_contents(&key), candidates, self.threshold);
        let added = accepted.len();

        doc.answers
            .entry(key)
            .or_default()
            .extend(accepted.into_iter().map(BulletPoint::new));
        doc.last_updated = doc.last_updated.max(now);
        self.store.upsert_answers(&doc).await?;

        info!(
            "Extracted {} new points for {}/{} from {} messages",
            added,
            session_id,
            group_id,
            messages.len()
        );
        Ok(ExtractOutcome::Applied {
            added,
            rejected: offered - added,
        })
    }
}
