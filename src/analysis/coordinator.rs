//! At most one analysis job per (kind, session, group).
//!
//! A job runs only while its caller holds a TTL'd lease key. A second key
//! carries a human-readable progress string so that callers losing the race
//! can report what the running job is doing. Both keys are released after the
//! job however it ends; the TTL covers a crashed process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::lease::KeyValueStore;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Transcript,
    Ethical,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Transcript => "transcript",
            AnalysisKind::Ethical => "ethical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKey {
    pub kind: AnalysisKind,
    pub session_id: String,
    pub group_id: String,
}

impl JobKey {
    pub fn new(kind: AnalysisKind, session_id: &str, group_id: &str) -> Self {
        Self {
            kind,
            session_id: session_id.to_string(),
            group_id: group_id.to_string(),
        }
    }

    pub fn lease_key(&self) -> String {
        format!(
            "analysis:{}:lease:{}:{}",
            self.kind.as_str(),
            self.session_id,
            self.group_id
        )
    }

    pub fn status_key(&self) -> String {
        format!(
            "analysis:{}:status:{}:{}",
            self.kind.as_str(),
            self.session_id,
            self.group_id
        )
    }
}

/// Lets a running job publish its progress.
#[derive(Clone)]
pub struct StatusReporter {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    ttl: Duration,
}

impl StatusReporter {
    pub async fn report(&self, status: &str) {
        debug!("{} -> {}", self.key, status);
        if let Err(e) = self.kv.set(&self.key, status, self.ttl).await {
            warn!("Failed to publish analysis status {}: {}", self.key, e);
        }
    }
}

pub struct AnalysisCoordinator {
    kv: Arc<dyn KeyValueStore>,
    lease_ttl: Duration,
}

impl AnalysisCoordinator {
    pub fn new(kv: Arc<dyn KeyValueStore>, lease_ttl: Duration) -> Self {
        Self { kv, lease_ttl }
    }

    pub fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }

    /// Takes the lease for `job` as `holder`. On success the status key is
    /// initialised so losers have something to show.
    pub async fn try_acquire_lease(&self, job: &JobKey, holder: &str) -> CoreResult<bool> {
        let acquired = self
            .kv
            .set_if_absent(&job.lease_key(), holder, self.lease_ttl)
            .await?;
        if acquired {
            self.reporter(job).report("starting").await;
        }
        Ok(acquired)
    }

    pub async fn current_status(&self, job: &JobKey) -> Option<String> {
        match self.kv.get(&job.status_key()).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to read analysis status {}: {}", job.status_key(), e);
                None
            }
        }
    }

    pub fn reporter(&self, job: &JobKey) -> StatusReporter {
        StatusReporter {
            kv: Arc::clone(&self.kv),
            key: job.status_key(),
            ttl: self.lease_ttl,
        }
    }

    /// Runs `job_fn` while holding the lease for `job`.
    ///
    /// Returns [`CoreError::LeaseContention`] with the running job's status
    /// when someone else holds the lease. The job and its cleanup run on
    /// their own task, so dropping the returned future neither aborts the job
    /// nor skips the release.
    pub async fn run_exclusive<F, Fut, T>(&self, job: JobKey, job_fn: F) -> CoreResult<T>
    where
        F: FnOnce(StatusReporter) -> Fut,
        Fut: Future<Output = CoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let holder = uuid::Uuid::new_v4().to_string();
        if !self.try_acquire_lease(&job, &holder).await? {
            return Err(CoreError::LeaseContention {
                current_status: self.current_status(&job).await,
            });
        }

        let work = job_fn(self.reporter(&job));
        let kv = Arc::clone(&self.kv);

        let guarded = tokio::spawn(async move {
            let outcome = tokio::spawn(work).await;
            release(kv.as_ref(), &job, &holder).await;
            outcome
        });

        match guarded.await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(CoreError::upstream(format!(
                "analysis job aborted: {join_error}"
            ))),
            Err(join_error) => Err(CoreError::upstream(format!(
                "analysis cleanup aborted: {join_error}"
            ))),
        }
    }
}

/// Drops the lease if `holder` still owns it, and the status key with it.
async fn release(kv: &dyn KeyValueStore, job: &JobKey, holder: &str) {
    let lease_key = job.lease_key();
    match kv.get(&lease_key).await {
        Ok(Some(current)) if current == holder => {
            if let Err(e) = kv.delete(&lease_key).await {
                error!("Failed to release lease {} (TTL will expire it): {}", lease_key, e);
            }
            if let Err(e) = kv.delete(&job.status_key()).await {
                warn!("Failed to clear status {}: {}", job.status_key(), e);
            }
        }
        Ok(Some(_)) => {
            warn!("Lease {} outlived its TTL and changed hands", lease_key);
        }
        Ok(None) => {
            warn!("Lease {} expired before the job finished", lease_key);
        }
        Err(e) => error!("Failed to read lease {} (TTL will expire it): {}", lease_key, e),
    }
}
