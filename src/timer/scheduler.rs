//! Persisted point advancement for one session.
//!
//! NotLaunched -> Point(0) -> ... -> Point(N-1) -> Completed.
//! Advances are conditional updates on `current_point`, so any number of
//! checkers racing on the same expired budget produce a single increment.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::countdown::TimeUpSignal;
use super::now_ms;
use super::schedule::{initial_schedule, next_transition, schedule_after_advance, Transition};
use crate::db::schemas::{Session, SessionStatus};
use crate::error::{CoreError, CoreResult};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotLaunched,
    Waiting { point: usize, point_remaining: u64 },
    Advanced { from: usize, to: usize },
    /// Another writer already moved past `expected`.
    Raced { expected: usize },
    Completed,
    /// Session was already completed or archived.
    Finished,
}

#[derive(Clone)]
pub struct PointScheduler {
    store: Store,
    session_id: String,
    time_up: TimeUpSignal,
}

impl PointScheduler {
    pub fn new(store: Store, session_id: impl Into<String>, time_up: TimeUpSignal) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            time_up,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn time_up(&self) -> &TimeUpSignal {
        &self.time_up
    }

    async fn load(&self) -> CoreResult<Session> {
        self.store
            .session(&self.session_id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("session {}", self.session_id)))
    }

    /// draft -> active, splitting the total evenly across all points.
    pub async fn launch(&self, now: i64) -> CoreResult<Session> {
        let session = self.load().await?;
        if session.status != SessionStatus::Draft {
            return Err(CoreError::validation(format!(
                "session is {}, only drafts can be launched",
                session.status.as_str()
            )));
        }
        if session.points.is_empty() {
            return Err(CoreError::validation("session has no points"));
        }
        if session.total_duration_secs == 0 {
            return Err(CoreError::validation("session has no duration"));
        }

        let points = initial_schedule(&session.points, now, session.total_duration_secs);
        if !self
            .store
            .launch_session(&self.session_id, now, &points)
            .await?
        {
            return Err(CoreError::validation("session was launched concurrently"));
        }

        info!(
            "Session {} launched: {} points, {}s each",
            self.session_id,
            points.len(),
            points[0].duration_secs
        );
        self.load().await
    }

    /// Per-second check of the current point's budget.
    pub async fn check(&self, now: i64) -> CoreResult<TickOutcome> {
        let session = self.load().await?;

        match next_transition(&session, now) {
            Transition::NotLaunched => Ok(TickOutcome::NotLaunched),
            Transition::Stay {
                point,
                point_remaining,
            } => Ok(TickOutcome::Waiting {
                point,
                point_remaining,
            }),
            Transition::Advance { from, to } => self.advance(&session, from, to, now).await,
            Transition::Complete => self.complete().await,
            Transition::Finished => {
                self.time_up.fire();
                Ok(TickOutcome::Finished)
            }
        }
    }

    async fn advance(
        &self,
        session: &Session,
        expected: usize,
        to: usize,
        now: i64,
    ) -> CoreResult<TickOutcome> {
        let points = schedule_after_advance(session, to, now);
        let advanced = self
            .store
            .advance_point(&self.session_id, expected, to, &points)
            .await?;

        if advanced {
            info!(
                "Session {} advanced to point {} ({}s budget)",
                self.session_id, to, points[to].duration_secs
            );
            Ok(TickOutcome::Advanced { from: expected, to })
        } else {
            debug!(
                "Session {} advance from {} lost the race",
                self.session_id, expected
            );
            Ok(TickOutcome::Raced { expected })
        }
    }

    async fn complete(&self) -> CoreResult<TickOutcome> {
        let completed = self.store.complete_session(&self.session_id).await?;
        self.time_up.fire();
        if completed {
            info!("Session {} completed: time up", self.session_id);
            Ok(TickOutcome::Completed)
        } else {
            Ok(TickOutcome::Finished)
        }
    }

    /// Ends an active session early.
    pub async fn end(&self) -> CoreResult<TickOutcome> {
        let session = self.load().await?;
        match session.status {
            SessionStatus::Active => self.complete().await,
            SessionStatus::Completed | SessionStatus::Archived => {
                self.time_up.fire();
                Ok(TickOutcome::Finished)
            }
            SessionStatus::Draft => Err(CoreError::validation("session was never launched")),
        }
    }

    /// Runs the per-second check until the session finishes or `cancel` fires.
    /// Finishing cancels `cancel`, which stops everything tied to it.
    pub fn spawn(self, tick: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match self.check(now_ms()).await {
                    Ok(TickOutcome::Completed) | Ok(TickOutcome::Finished) => {
                        cancel.cancel();
                        break;
                    }
                    Ok(TickOutcome::Raced { expected }) => {
                        debug!("Point {} already advanced elsewhere", expected);
                    }
                    Ok(_) => {}
                    Err(CoreError::NotFound(what)) => {
                        warn!("Stopping scheduler, {} is gone", what);
                        cancel.cancel();
                        break;
                    }
                    Err(e) => error!("Point check failed for session {}: {}", self.session_id, e),
                }
            }
            debug!("Scheduler for session {} stopped", self.session_id);
        })
    }
}
