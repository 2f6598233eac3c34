//! Ethical-theme classification of transcript messages.
//!
//! Shares the lease contract with key-point extraction but labels each
//! unclassified message with one category from a fixed taxonomy.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::coordinator::StatusReporter;
use crate::error::{CoreError, CoreResult};
use crate::llm::{prompts, LlmProvider, ResponseParser};
use crate::store::Store;
use crate::timer::now_ms;

const BATCH_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EthicalCategory {
    Fairness,
    Privacy,
    Autonomy,
    Transparency,
    Accountability,
    Wellbeing,
    None,
}

impl EthicalCategory {
    pub const ALL: [EthicalCategory; 7] = [
        EthicalCategory::Fairness,
        EthicalCategory::Privacy,
        EthicalCategory::Autonomy,
        EthicalCategory::Transparency,
        EthicalCategory::Accountability,
        EthicalCategory::Wellbeing,
        EthicalCategory::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EthicalCategory::Fairness => "fairness",
            EthicalCategory::Privacy => "privacy",
            EthicalCategory::Autonomy => "autonomy",
            EthicalCategory::Transparency => "transparency",
            EthicalCategory::Accountability => "accountability",
            EthicalCategory::Wellbeing => "wellbeing",
            EthicalCategory::None => "none",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthicsOutcome {
    NothingNew,
    Classified { stored: usize, skipped: usize },
}

impl EthicsOutcome {
    pub fn message(&self) -> String {
        match self {
            EthicsOutcome::NothingNew => "No unclassified messages".to_string(),
            EthicsOutcome::Classified { stored, skipped } => {
                format!("Classified {stored} messages ({skipped} unusable labels)")
            }
        }
    }
}

pub struct EthicalAnalyzer {
    store: Store,
    llm: Arc<dyn LlmProvider>,
    parser: ResponseParser,
    llm_timeout: Duration,
}

impl EthicalAnalyzer {
    pub fn new(store: Store, llm: Arc<dyn LlmProvider>, llm_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            llm,
            parser: ResponseParser::new()?,
            llm_timeout,
        })
    }

    pub async fn analyze(
        &self,
        session_id: &str,
        group_id: &str,
        status: &StatusReporter,
    ) -> CoreResult<EthicsOutcome> {
        status.report("loading transcript").await;
        let messages = self
            .store
            .unclassified_messages(session_id, group_id, BATCH_LIMIT)
            .await?;
        if messages.is_empty() {
            return Ok(EthicsOutcome::NothingNew);
        }

        status
            .report(&format!("classifying {} messages", messages.len()))
            .await;
        let categories: Vec<&str> = EthicalCategory::ALL.iter().map(|c| c.as_str()).collect();
        let request = prompts::ethical_classification(&categories, &messages);
        let raw = tokio::time::timeout(self.llm_timeout, self.llm.complete(&request))
            .await
            .map_err(|_| CoreError::upstream(format!("{} timed out", self.llm.name())))?
            .map_err(|e| CoreError::upstream(format!("{} failed: {e:#}", self.llm.name())))?;
        let labels = self
            .parser
            .classifications(&raw)
            .map_err(|e| CoreError::validation(format!("{e:#}")))?;

        let known: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        let mut batch = Vec::new();
        let mut skipped = 0;
        for label in labels {
            if !known.contains(label.message_id.as_str()) {
                debug!("Ignoring label for unknown message {}", label.message_id);
                skipped += 1;
                continue;
            }
            match EthicalCategory::parse(&label.category) {
                Some(category) => batch.push((label.message_id, category.as_str().to_string())),
                None => {
                    warn!(
                        "Unknown ethical category '{}' for message {}",
                        label.category, label.message_id
                    );
                    skipped += 1;
                }
            }
        }

        status.report("saving classifications").await;
        let stored = self
            .store
            .record_classifications(session_id, group_id, &batch, now_ms())
            .await?;

        info!(
            "Classified {} messages for {}/{}",
            stored, session_id, group_id
        );
        Ok(EthicsOutcome::Classified { stored, skipped })
    }
}
