//! Append-only transcript persistence.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use super::schemas::TranscriptMessage;

pub struct TranscriptRepository;

const COLUMNS: &str = "id, session_id, group_id, point_index, content, author, timestamp";

impl TranscriptRepository {
    /// Appends a message. A message id already stored is ignored, which makes
    /// re-sent client batches harmless. Returns whether a row was written.
    pub fn append(conn: &Connection, message: &TranscriptMessage) -> Result<bool> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO transcript_messages
                 (id, session_id, group_id, point_index, content, author, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id,
                    message.session_id,
                    message.group_id,
                    message.point_index as i64,
                    message.content,
                    message.author,
                    message.timestamp,
                ],
            )
            .context("Failed to append transcript message")?;
        Ok(inserted == 1)
    }

    /// Messages for one point with `after < timestamp <= until`, oldest first.
    pub fn for_point_between(
        conn: &Connection,
        session_id: &str,
        group_id: &str,
        point_index: usize,
        after: i64,
        until: i64,
    ) -> Result<Vec<TranscriptMessage>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM transcript_messages
             WHERE session_id = ?1 AND group_id = ?2 AND point_index = ?3
               AND timestamp > ?4 AND timestamp <= ?5
             ORDER BY timestamp ASC, id ASC"
        );
        let mut stmt = conn
            .prepare(&sql)
            .context("Failed to prepare transcript query")?;

        let rows = stmt
            .query_map(
                params![session_id, group_id, point_index as i64, after, until],
                message_from_row,
            )
            .context("Failed to query transcript")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map transcript rows")?;

        Ok(rows)
    }

    /// Messages of a group that have no ethical classification yet.
    pub fn unclassified(
        conn: &Connection,
        session_id: &str,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<TranscriptMessage>> {
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.session_id, m.group_id, m.point_index, m.content, m.author, m.timestamp
                 FROM transcript_messages m
                 LEFT JOIN ethical_classifications c ON c.message_id = m.id
                 WHERE m.session_id = ?1 AND m.group_id = ?2 AND c.message_id IS NULL
                 ORDER BY m.timestamp ASC, m.id ASC
                 LIMIT ?3",
            )
            .context("Failed to prepare unclassified query")?;

        let rows = stmt
            .query_map(
                params![session_id, group_id, limit as i64],
                message_from_row,
            )
            .context("Failed to query unclassified messages")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map transcript rows")?;

        Ok(rows)
    }

    pub fn count_for_group(conn: &Connection, session_id: &str, group_id: &str) -> Result<i64> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transcript_messages WHERE session_id = ?1 AND group_id = ?2",
                params![session_id, group_id],
                |row| row.get(0),
            )
            .context("Failed to count transcript messages")?;
        Ok(count)
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<TranscriptMessage> {
    let point_index: i64 = row.get(3)?;
    Ok(TranscriptMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        group_id: row.get(2)?,
        point_index: point_index.max(0) as usize,
        content: row.get(4)?,
        author: row.get(5)?,
        timestamp: row.get(6)?,
    })
}
