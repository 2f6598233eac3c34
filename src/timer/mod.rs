//! Session countdown and point advancement.

pub mod countdown;
pub mod schedule;
pub mod scheduler;
pub mod snapshot;
pub mod timekeeper;

pub use countdown::{Countdown, CountdownDriver, Reconcile, TimeUpSignal, TimerSource};
pub use schedule::{SchedulerState, Transition};
pub use scheduler::{PointScheduler, TickOutcome};
pub use snapshot::TimerSnapshot;
pub use timekeeper::remaining;

/// Wall clock in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
