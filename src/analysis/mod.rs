//! Lease-coordinated analysis pipelines.

pub mod coordinator;
pub mod ethics;
pub mod extractor;
pub mod lease;
pub mod poller;
pub mod similarity;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{AnalysisCoordinator, AnalysisKind, JobKey, StatusReporter};
pub use ethics::{EthicalAnalyzer, EthicalCategory, EthicsOutcome};
pub use extractor::{ExtractOutcome, IncrementalExtractor};
pub use lease::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use poller::spawn_group_poller;

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::error::CoreResult;
use crate::llm::LlmProvider;
use crate::store::Store;

/// Both pipelines behind the shared lease.
pub struct AnalysisService {
    coordinator: AnalysisCoordinator,
    extractor: Arc<IncrementalExtractor>,
    ethics: Arc<EthicalAnalyzer>,
}

impl AnalysisService {
    pub fn new(
        coordinator: AnalysisCoordinator,
        extractor: IncrementalExtractor,
        ethics: EthicalAnalyzer,
    ) -> Self {
        Self {
            coordinator,
            extractor: Arc::new(extractor),
            ethics: Arc::new(ethics),
        }
    }

    /// Wires both pipelines to `store` with leases kept in `kv`.
    pub fn from_config(
        config: &Config,
        store: Store,
        kv: Arc<dyn KeyValueStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let coordinator = AnalysisCoordinator::new(kv, config.analysis.lease_ttl());
        let extractor = IncrementalExtractor::new(
            store.clone(),
            Arc::clone(&llm),
            config.analysis.similarity_threshold,
            config.llm.timeout(),
        )?;
        let ethics = EthicalAnalyzer::new(store, llm, config.llm.timeout())?;
        Ok(Self::new(coordinator, extractor, ethics))
    }

    pub fn coordinator(&self) -> &AnalysisCoordinator {
        &self.coordinator
    }

    pub async fn run_transcript(&self, session_id: &str, group_id: &str) -> CoreResult<ExtractOutcome> {
        let job = JobKey::new(AnalysisKind::Transcript, session_id, group_id);
        let extractor = Arc::clone(&self.extractor);
        let (session_id, group_id) = (session_id.to_string(), group_id.to_string());
        self.coordinator
            .run_exclusive(job, move |status| async move {
                extractor.extract(&session_id, &group_id, &status).await
            })
            .await
    }

    pub async fn run_ethics(&self, session_id: &str, group_id: &str) -> CoreResult<EthicsOutcome> {
        let job = JobKey::new(AnalysisKind::Ethical, session_id, group_id);
        let ethics = Arc::clone(&self.ethics);
        let (session_id, group_id) = (session_id.to_string(), group_id.to_string());
        self.coordinator
            .run_exclusive(job, move |status| async move {
                ethics.analyze(&session_id, &group_id, &status).await
            })
            .await
    }
}
