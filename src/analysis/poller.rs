//! Per-group analysis cadence: once immediately, then every poll interval.
//!
//! A poller stops when its token is cancelled or the session's time-up
//! signal fires, whichever comes first.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::AnalysisService;
use crate::error::CoreError;
use crate::timer::TimeUpSignal;

pub fn spawn_group_poller(
    service: Arc<AnalysisService>,
    session_id: String,
    group_id: String,
    every: Duration,
    cancel: CancellationToken,
    time_up: TimeUpSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Analysis poller started for {}/{} every {:?}",
            session_id, group_id, every
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time_up.wait() => break,
                _ = ticker.tick() => {}
            }

            match service.run_transcript(&session_id, &group_id).await {
                Ok(outcome) => debug!("{}/{}: {}", session_id, group_id, outcome.message()),
                Err(CoreError::LeaseContention { current_status }) => debug!(
                    "{}/{} analysis already running ({:?})",
                    session_id, group_id, current_status
                ),
                Err(CoreError::NotFound(what)) => debug!("{} gone, skipping analysis", what),
                Err(e) => warn!("Analysis for {}/{} failed: {}", session_id, group_id, e),
            }
        }

        info!("Analysis poller stopped for {}/{}", session_id, group_id);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{active_session, say, ScriptedLlm};
    use crate::analysis::{
        AnalysisCoordinator, EthicalAnalyzer, IncrementalExtractor, MemoryKeyValueStore,
    };
    use crate::store::Store;

    fn service(store: &Store, llm: Arc<ScriptedLlm>) -> Arc<AnalysisService> {
        Arc::new(AnalysisService::new(
            AnalysisCoordinator::new(
                Arc::new(MemoryKeyValueStore::new()),
                Duration::from_secs(30),
            ),
            IncrementalExtractor::new(store.clone(), llm.clone(), 0.7, Duration::from_secs(5))
                .unwrap(),
            EthicalAnalyzer::new(store.clone(), llm, Duration::from_secs(5)).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_runs_on_start_and_stops_on_cancel() {
        let store = Store::in_memory().unwrap();
        active_session(&store, &["Topic"]).await;
        say(&store, "m1", 0, "an idea", 1).await;
        let llm = ScriptedLlm::new(vec![Ok(r#"{"points": ["An idea"]}"#.to_string())]);

        let mut changes = store.feed().subscribe_answers("s1", "g1");
        let cancel = CancellationToken::new();
        let handle = spawn_group_poller(
            service(&store, llm.clone()),
            "s1".to_string(),
            "g1".to_string(),
            Duration::from_secs(15),
            cancel.clone(),
            TimeUpSignal::new(),
        );

        // Empty document on first run, then the extracted point
        changes.next().await.unwrap();
        changes.next().await.unwrap();
        assert_eq!(llm.calls(), 1);

        cancel.cancel();
        handle.await.unwrap();
        let doc = store.answers("s1", "g1").await.unwrap().unwrap();
        assert_eq!(doc.live_contents("point_0"), vec!["An idea".to_string()]);
    }

    #[tokio::test]
    async fn test_time_up_stops_poller() {
        let store = Store::in_memory().unwrap();
        let time_up = TimeUpSignal::new();
        time_up.fire();

        let handle = spawn_group_poller(
            service(&store, ScriptedLlm::new(vec![])),
            "s1".to_string(),
            "g1".to_string(),
            Duration::from_secs(15),
            CancellationToken::new(),
            time_up,
        );
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
