//! Session and group persistence.
//!
//! Every state transition is a conditional `UPDATE`: it only applies when the
//! stored row still matches the caller's expectation, and reports whether it
//! did through the affected row count.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schemas::{Group, Point, Session, SessionStatus};

pub struct SessionRepository;

impl SessionRepository {
    pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
        conn.execute(
            "INSERT INTO sessions (id, title, total_duration_secs, launched_at, current_point, status, points)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.title,
                session.total_duration_secs as i64,
                session.launched_at,
                session.current_point as i64,
                session.status.as_str(),
                serde_json::to_string(&session.points)?,
            ],
        )
        .context("Failed to insert session")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<Session>> {
        let row = conn
            .query_row(
                "SELECT id, title, total_duration_secs, launched_at, current_point, status, points
                 FROM sessions WHERE id = ?1",
                params![id],
                SessionRow::from_row,
            )
            .optional()
            .context("Failed to query session")?;

        row.map(SessionRow::into_session).transpose()
    }

    pub fn list_by_status(conn: &Connection, status: SessionStatus) -> Result<Vec<Session>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, title, total_duration_secs, launched_at, current_point, status, points
                 FROM sessions WHERE status = ?1 ORDER BY created_at ASC",
            )
            .context("Failed to prepare sessions query")?;

        let rows = stmt
            .query_map(params![status.as_str()], SessionRow::from_row)
            .context("Failed to list sessions")?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    /// draft -> active with the initial schedule.
    pub fn launch(conn: &Connection, id: &str, launched_at: i64, points: &[Point]) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE sessions SET status = ?1, launched_at = ?2, current_point = 0, points = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    SessionStatus::Active.as_str(),
                    launched_at,
                    serde_json::to_string(points)?,
                    id,
                    SessionStatus::Draft.as_str(),
                ],
            )
            .context("Failed to launch session")?;
        Ok(changed == 1)
    }

    /// Moves `current_point` from `expected` to `next` and stores the
    /// recomputed schedule. Returns false when another writer got there first.
    pub fn advance(
        conn: &Connection,
        id: &str,
        expected: usize,
        next: usize,
        points: &[Point],
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE sessions SET current_point = ?1, points = ?2
                 WHERE id = ?3 AND current_point = ?4 AND status = ?5",
                params![
                    next as i64,
                    serde_json::to_string(points)?,
                    id,
                    expected as i64,
                    SessionStatus::Active.as_str(),
                ],
            )
            .context("Failed to advance session point")?;
        Ok(changed == 1)
    }

    /// active -> completed.
    pub fn complete(conn: &Connection, id: &str) -> Result<bool> {
        Self::transition(conn, id, SessionStatus::Active, SessionStatus::Completed)
    }

    /// completed -> archived.
    pub fn archive(conn: &Connection, id: &str) -> Result<bool> {
        Self::transition(conn, id, SessionStatus::Completed, SessionStatus::Archived)
    }

    fn transition(
        conn: &Connection,
        id: &str,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<bool> {
        let changed = conn
            .execute(
                "UPDATE sessions SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to.as_str(), id, from.as_str()],
            )
            .with_context(|| format!("Failed to move session to {}", to.as_str()))?;
        Ok(changed == 1)
    }
}

struct SessionRow {
    id: String,
    title: String,
    total_duration_secs: i64,
    launched_at: Option<i64>,
    current_point: i64,
    status: String,
    points: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            total_duration_secs: row.get(2)?,
            launched_at: row.get(3)?,
            current_point: row.get(4)?,
            status: row.get(5)?,
            points: row.get(6)?,
        })
    }

    fn into_session(self) -> Result<Session> {
        Ok(Session {
            id: self.id,
            title: self.title,
            total_duration_secs: self.total_duration_secs.max(0) as u64,
            launched_at: self.launched_at,
            current_point: self.current_point.max(0) as usize,
            status: SessionStatus::parse(&self.status)?,
            points: serde_json::from_str(&self.points).context("Corrupt points column")?,
        })
    }
}

pub struct GroupRepository;

impl GroupRepository {
    pub fn insert(conn: &Connection, group: &Group) -> Result<()> {
        conn.execute(
            "INSERT INTO groups (id, session_id, members) VALUES (?1, ?2, ?3)",
            params![
                group.id,
                group.session_id,
                serde_json::to_string(&group.member_ids)?
            ],
        )
        .context("Failed to insert group")?;
        Ok(())
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<Group>> {
        let row = conn
            .query_row(
                "SELECT id, session_id, members FROM groups WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query group")?;

        row.map(|(id, session_id, members)| {
            Ok(Group {
                id,
                session_id,
                member_ids: serde_json::from_str(&members)?,
            })
        })
        .transpose()
    }

    pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Group>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, members FROM groups
                 WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
            )
            .context("Failed to prepare groups query")?;

        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to list groups")?;

        let mut groups = Vec::new();
        for row in rows {
            let (id, session_id, members) = row?;
            groups.push(Group {
                id,
                session_id,
                member_ids: serde_json::from_str(&members)?,
            });
        }
        Ok(groups)
    }
}
