//! Client-side countdown: an authoritative snapshot extrapolated locally.
//!
//! The local value is a cache. It decrements once per tick for a smooth
//! display and is reconciled against a fresh [`TimerSnapshot`] on a fixed
//! interval, but only overwritten when it drifted past the threshold.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::snapshot::TimerSnapshot;

/// Terminal "time up" latch. Only the first `fire` has an effect; any number
/// of observers may check or await it.
#[derive(Clone)]
pub struct TimeUpSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for TimeUpSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeUpSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns true only for the call that flipped the latch.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|up| {
            if *up {
                false
            } else {
                *up = true;
                true
            }
        })
    }

    pub fn is_up(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|up| *up).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Local value within the drift threshold; left alone.
    Kept,
    /// Local value replaced by the authoritative one.
    Corrected { from: u64, to: u64 },
    /// Placeholder replaced by the first authoritative value.
    Adopted(u64),
    /// Still no launch timestamp; placeholder kept.
    Placeholder,
}

pub struct Countdown {
    remaining: u64,
    authoritative: bool,
    drift_threshold: u64,
    time_up: TimeUpSignal,
}

impl Countdown {
    pub fn from_snapshot(snapshot: &TimerSnapshot, drift_threshold: u64) -> Self {
        let mut countdown = Self {
            remaining: snapshot.remaining_secs,
            authoritative: snapshot.authoritative,
            drift_threshold,
            time_up: TimeUpSignal::new(),
        };
        if snapshot.time_up {
            countdown.remaining = 0;
            countdown.time_up.fire();
        }
        countdown
    }

    /// Non-authoritative countdown for a session without a launch timestamp.
    pub fn placeholder(total_secs: u64, drift_threshold: u64) -> Self {
        Self {
            remaining: total_secs,
            authoritative: false,
            drift_threshold,
            time_up: TimeUpSignal::new(),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn is_time_up(&self) -> bool {
        self.time_up.is_up()
    }

    pub fn time_up_signal(&self) -> TimeUpSignal {
        self.time_up.clone()
    }

    /// One local second passed.
    pub fn tick(&mut self) -> u64 {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 && self.authoritative {
            self.time_up.fire();
        }
        self.remaining
    }

    pub fn reconcile(&mut self, snapshot: &TimerSnapshot) -> Reconcile {
        let outcome = if !snapshot.authoritative {
            Reconcile::Placeholder
        } else if !self.authoritative {
            self.authoritative = true;
            self.remaining = snapshot.remaining_secs;
            Reconcile::Adopted(snapshot.remaining_secs)
        } else if self.remaining.abs_diff(snapshot.remaining_secs) > self.drift_threshold {
            let from = self.remaining;
            self.remaining = snapshot.remaining_secs;
            Reconcile::Corrected {
                from,
                to: snapshot.remaining_secs,
            }
        } else {
            Reconcile::Kept
        };

        if self.authoritative && (snapshot.time_up || self.remaining == 0) {
            self.remaining = 0;
            self.time_up.fire();
        }
        outcome
    }
}

/// Where a client countdown gets its authoritative values from.
#[async_trait]
pub trait TimerSource: Send + Sync {
    async fn fetch(&self) -> Result<TimerSnapshot>;
}

pub struct CountdownDriver<S> {
    source: S,
    tick_interval: Duration,
    resync_interval: Duration,
    drift_threshold: u64,
}

impl<S: TimerSource> CountdownDriver<S> {
    pub fn new(
        source: S,
        tick_interval: Duration,
        resync_interval: Duration,
        drift_threshold: u64,
    ) -> Self {
        Self {
            source,
            tick_interval,
            resync_interval,
            drift_threshold,
        }
    }

    /// Runs until time is up or `cancel` fires. `on_update` sees every tick
    /// and every reconciliation.
    pub async fn run<F>(&self, cancel: CancellationToken, mut on_update: F) -> Result<Countdown>
    where
        F: FnMut(&Countdown),
    {
        let snapshot = self.source.fetch().await?;
        let mut countdown = Countdown::from_snapshot(&snapshot, self.drift_threshold);
        on_update(&countdown);

        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut resync = interval(self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; the initial fetch above already covered it
        resync.tick().await;

        while !countdown.is_time_up() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Countdown cancelled at {}s", countdown.remaining());
                    break;
                }
                _ = ticker.tick() => {
                    countdown.tick();
                    on_update(&countdown);
                }
                _ = resync.tick() => {
                    match self.source.fetch().await {
                        Ok(snapshot) => {
                            if let Reconcile::Corrected { from, to } = countdown.reconcile(&snapshot) {
                                info!("Countdown drifted, corrected {}s -> {}s", from, to);
                            }
                            on_update(&countdown);
                        }
                        Err(e) => warn!("Countdown resync failed: {}", e),
                    }
                }
            }
        }

        Ok(countdown)
    }
}
