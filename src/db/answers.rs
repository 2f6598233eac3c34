//! Shared answer documents, one row per (session, group).
//!
//! The whole bullet document is replaced on every write. There is no version
//! check: concurrent writers race and the last upsert wins. The watermark is
//! the exception and only ever moves forward.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::schemas::SharedAnswers;

pub struct AnswersRepository;

impl AnswersRepository {
    pub fn get(conn: &Connection, session_id: &str, group_id: &str) -> Result<Option<SharedAnswers>> {
        let row = conn
            .query_row(
                "SELECT answers, last_updated FROM shared_answers
                 WHERE session_id = ?1 AND group_id = ?2",
                params![session_id, group_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .context("Failed to query shared answers")?;

        row.map(|(answers, last_updated)| {
            Ok(SharedAnswers {
                session_id: session_id.to_string(),
                group_id: group_id.to_string(),
                answers: serde_json::from_str(&answers).context("Corrupt answers document")?,
                last_updated,
            })
        })
        .transpose()
    }

    /// Creates `doc` unless a document already exists. Returns whether it did.
    pub fn insert_if_absent(conn: &Connection, doc: &SharedAnswers) -> Result<bool> {
        let inserted = conn
            .execute(
                "INSERT INTO shared_answers (session_id, group_id, answers, last_updated)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id, group_id) DO NOTHING",
                params![
                    doc.session_id,
                    doc.group_id,
                    serde_json::to_string(&doc.answers)?,
                    doc.last_updated,
                ],
            )
            .context("Failed to create shared answers")?;
        Ok(inserted == 1)
    }

    /// Insert-or-replace the whole document.
    pub fn upsert(conn: &Connection, doc: &SharedAnswers) -> Result<()> {
        conn.execute(
            "INSERT INTO shared_answers (session_id, group_id, answers, last_updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id, group_id)
             DO UPDATE SET answers = excluded.answers,
                           last_updated = MAX(shared_answers.last_updated, excluded.last_updated)",
            params![
                doc.session_id,
                doc.group_id,
                serde_json::to_string(&doc.answers)?,
                doc.last_updated,
            ],
        )
        .context("Failed to upsert shared answers")?;
        Ok(())
    }
}
