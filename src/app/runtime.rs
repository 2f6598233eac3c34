//! Background work owned by each running session.
//!
//! A running session has one point scheduler loop and, when auto-polling is
//! enabled, one analysis poller per group. All of them share a cancellation
//! token and a time-up signal, so ending the session (or the scheduler
//! completing it) stops everything tied to it.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::{spawn_group_poller, AnalysisService};
use crate::config::Config;
use crate::db::schemas::{Session, SessionStatus};
use crate::error::{CoreError, CoreResult};
use crate::store::Store;
use crate::timer::{now_ms, PointScheduler, TickOutcome, TimeUpSignal};

#[derive(Clone)]
struct RunningSession {
    cancel: CancellationToken,
    time_up: TimeUpSignal,
}

#[derive(Clone)]
pub struct SessionRuntime {
    store: Store,
    analysis: Arc<AnalysisService>,
    running: Arc<Mutex<HashMap<String, RunningSession>>>,
    shutdown: CancellationToken,
    tick_interval: Duration,
    poll_interval: Duration,
    auto_poll: bool,
}

impl SessionRuntime {
    pub fn new(store: Store, analysis: Arc<AnalysisService>, config: &Config) -> Self {
        Self {
            store,
            analysis,
            running: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            tick_interval: config.timer.tick_interval(),
            poll_interval: config.analysis.poll_interval(),
            auto_poll: config.analysis.auto_poll,
        }
    }

    pub fn analysis(&self) -> &Arc<AnalysisService> {
        &self.analysis
    }

    async fn live_entry(&self, session_id: &str) -> Option<RunningSession> {
        self.running
            .lock()
            .await
            .get(session_id)
            .filter(|entry| !entry.cancel.is_cancelled())
            .cloned()
    }

    /// Scheduler bound to the session's running time-up signal, if any.
    pub async fn scheduler(&self, session_id: &str) -> PointScheduler {
        let time_up = self
            .live_entry(session_id)
            .await
            .map(|entry| entry.time_up)
            .unwrap_or_default();
        PointScheduler::new(self.store.clone(), session_id, time_up)
    }

    pub async fn is_running(&self, session_id: &str) -> bool {
        self.live_entry(session_id).await.is_some()
    }

    /// Launches a draft session and starts its background work.
    pub async fn launch(&self, session_id: &str) -> CoreResult<Session> {
        let session = self.scheduler(session_id).await.launch(now_ms()).await?;
        self.start(&session).await?;
        Ok(session)
    }

    /// Ends an active session early.
    pub async fn end(&self, session_id: &str) -> CoreResult<TickOutcome> {
        let outcome = self.scheduler(session_id).await.end().await?;
        self.stop(session_id).await;
        Ok(outcome)
    }

    /// Starts the scheduler loop and group pollers. No-op when already running.
    pub async fn start(&self, session: &Session) -> CoreResult<()> {
        if session.status != SessionStatus::Active {
            return Err(CoreError::validation(format!(
                "session {} is {}",
                session.id,
                session.status.as_str()
            )));
        }

        let entry = {
            let mut running = self.running.lock().await;
            if running
                .get(&session.id)
                .is_some_and(|entry| !entry.cancel.is_cancelled())
            {
                return Ok(());
            }
            let entry = RunningSession {
                cancel: self.shutdown.child_token(),
                time_up: TimeUpSignal::new(),
            };
            running.insert(session.id.clone(), entry.clone());
            entry
        };

        let scheduler =
            PointScheduler::new(self.store.clone(), session.id.clone(), entry.time_up.clone())
                .spawn(self.tick_interval, entry.cancel.clone());
        self.prune_when_done(session.id.clone(), scheduler);

        if self.auto_poll {
            for group in self.store.groups(&session.id).await? {
                self.spawn_poller(&session.id, &group.id, &entry);
            }
        }

        info!("Session {} running", session.id);
        Ok(())
    }

    /// Drops the session's entry once its scheduler loop exits. The loop
    /// cancels the token on the way out; an entry with a live token belongs to
    /// a newer start and is left alone.
    fn prune_when_done(&self, session_id: String, scheduler: JoinHandle<()>) {
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            if let Err(e) = scheduler.await {
                warn!("Scheduler for session {} aborted: {}", session_id, e);
            }
            let mut running = running.lock().await;
            if running
                .get(&session_id)
                .is_some_and(|entry| entry.cancel.is_cancelled())
            {
                running.remove(&session_id);
                debug!("Session {} no longer tracked", session_id);
            }
        });
    }

    fn spawn_poller(&self, session_id: &str, group_id: &str, entry: &RunningSession) {
        spawn_group_poller(
            Arc::clone(&self.analysis),
            session_id.to_string(),
            group_id.to_string(),
            self.poll_interval,
            entry.cancel.clone(),
            entry.time_up.clone(),
        );
    }

    /// Picks up a group added while its session is already running.
    pub async fn group_added(&self, session_id: &str, group_id: &str) {
        if !self.auto_poll {
            return;
        }
        if let Some(entry) = self.live_entry(session_id).await {
            self.spawn_poller(session_id, group_id, &entry);
        }
    }

    pub async fn stop(&self, session_id: &str) {
        if let Some(entry) = self.running.lock().await.remove(session_id) {
            entry.cancel.cancel();
            info!("Session {} stopped", session_id);
        }
    }

    /// Restarts background work for sessions left active by a previous run.
    pub async fn resume_active(&self) -> Result<usize> {
        let sessions = self.store.active_sessions().await?;
        let mut resumed = 0;
        for session in &sessions {
            match self.start(session).await {
                Ok(()) => resumed += 1,
                Err(e) => warn!("Failed to resume session {}: {}", session.id, e),
            }
        }
        Ok(resumed)
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
