use serde::{Deserialize, Serialize};

use super::timekeeper::{remaining, remaining_or_full};
use crate::db::schemas::{Point, Session, SessionStatus};

/// Authoritative timer state as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    /// `None` before launch.
    pub current_point: Option<usize>,
    pub point_count: usize,
    pub remaining_secs: u64,
    pub point_remaining_secs: u64,
    pub launched_at: Option<i64>,
    /// False when there is no launch timestamp and the values are placeholders.
    pub authoritative: bool,
    pub time_up: bool,
    pub server_time: i64,
    pub points: Vec<Point>,
}

impl TimerSnapshot {
    pub fn from_session(session: &Session, now_ms: i64) -> Self {
        let finished = matches!(
            session.status,
            SessionStatus::Completed | SessionStatus::Archived
        );

        let remaining_secs = if finished {
            0
        } else {
            remaining_or_full(now_ms, session.launched_at, session.total_duration_secs)
        };

        let point_remaining_secs = match (session.status, session.current()) {
            (SessionStatus::Active, Some(point)) => point
                .scheduled_start
                .map(|start| remaining(now_ms, start, point.duration_secs))
                .unwrap_or(point.duration_secs)
                .min(remaining_secs),
            _ => 0,
        };

        Self {
            session_id: session.id.clone(),
            status: session.status,
            current_point: match session.status {
                SessionStatus::Draft => None,
                _ => Some(session.current_point),
            },
            point_count: session.points.len(),
            remaining_secs,
            point_remaining_secs,
            launched_at: session.launched_at,
            authoritative: session.launched_at.is_some(),
            time_up: finished || (session.launched_at.is_some() && remaining_secs == 0),
            server_time: now_ms,
            points: session.points.clone(),
        }
    }
}
