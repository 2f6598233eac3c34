//! Point schedule arithmetic.
//!
//! Durations are always derived from the time actually left: at launch the
//! total is split evenly, and at every transition the remaining session time
//! is split evenly across the points that have not run yet.

use super::timekeeper::remaining;
use crate::db::schemas::{Point, Session, SessionStatus};

/// Where a session is in its point sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotLaunched,
    Point(usize),
    Completed,
}

impl SchedulerState {
    pub fn of(session: &Session) -> Self {
        match session.status {
            SessionStatus::Draft => SchedulerState::NotLaunched,
            SessionStatus::Active => SchedulerState::Point(session.current_point),
            SessionStatus::Completed | SessionStatus::Archived => SchedulerState::Completed,
        }
    }
}

/// What the per-second check should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    NotLaunched,
    Stay { point: usize, point_remaining: u64 },
    Advance { from: usize, to: usize },
    Complete,
    Finished,
}

/// Gives every point from `from` onwards `ceil(remaining_secs / points_left)`
/// seconds, back to back starting at `start_ms`.
pub fn split_remaining(points: &mut [Point], from: usize, start_ms: i64, remaining_secs: u64) {
    let left = points.len().saturating_sub(from) as u64;
    if left == 0 {
        return;
    }
    let duration = remaining_secs.div_ceil(left);

    let mut start = start_ms;
    for point in &mut points[from..] {
        point.scheduled_start = Some(start);
        point.duration_secs = duration;
        start += duration as i64 * 1000;
    }
}

/// Launch schedule: indices normalised and the total split evenly.
pub fn initial_schedule(points: &[Point], launched_at: i64, total_secs: u64) -> Vec<Point> {
    let mut scheduled: Vec<Point> = points
        .iter()
        .enumerate()
        .map(|(index, point)| Point::new(index, point.content.clone()))
        .collect();
    split_remaining(&mut scheduled, 0, launched_at, total_secs);
    scheduled
}

/// Schedule after moving to point `to` at `now_ms`.
pub fn schedule_after_advance(session: &Session, to: usize, now_ms: i64) -> Vec<Point> {
    let mut points = session.points.clone();
    let left = session
        .launched_at
        .map(|launched_at| remaining(now_ms, launched_at, session.total_duration_secs))
        .unwrap_or(session.total_duration_secs);
    split_remaining(&mut points, to, now_ms, left);
    points
}

/// Seconds left in a point's own budget.
pub fn point_remaining(point: &Point, now_ms: i64) -> u64 {
    match point.scheduled_start {
        Some(start) => remaining(now_ms, start, point.duration_secs),
        None => point.duration_secs,
    }
}

pub fn next_transition(session: &Session, now_ms: i64) -> Transition {
    match session.status {
        SessionStatus::Draft => return Transition::NotLaunched,
        SessionStatus::Completed | SessionStatus::Archived => return Transition::Finished,
        SessionStatus::Active => {}
    }

    let Some(launched_at) = session.launched_at else {
        return Transition::NotLaunched;
    };
    if remaining(now_ms, launched_at, session.total_duration_secs) == 0 {
        return Transition::Complete;
    }

    let current = session.current_point;
    let Some(point) = session.points.get(current) else {
        return Transition::Complete;
    };

    match point_remaining(point, now_ms) {
        0 if current + 1 >= session.points.len() => Transition::Complete,
        0 => Transition::Advance {
            from: current,
            to: current + 1,
        },
        left => Transition::Stay {
            point: current,
            point_remaining: left,
        },
    }
}
