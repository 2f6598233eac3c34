//! Ethical classification results, one row per transcript message.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;

pub struct ClassificationRepository;

impl ClassificationRepository {
    /// Stores a classification; a message that already has one keeps it.
    pub fn insert(
        conn: &Connection,
        message_id: &str,
        session_id: &str,
        group_id: &str,
        category: &str,
        classified_at: i64,
    ) -> Result<bool> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO ethical_classifications
                 (message_id, session_id, group_id, category, classified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![message_id, session_id, group_id, category, classified_at],
            )
            .context("Failed to insert classification")?;
        Ok(inserted == 1)
    }

    pub fn counts(
        conn: &Connection,
        session_id: &str,
        group_id: &str,
    ) -> Result<BTreeMap<String, i64>> {
        let mut stmt = conn
            .prepare(
                "SELECT category, COUNT(*) FROM ethical_classifications
                 WHERE session_id = ?1 AND group_id = ?2 GROUP BY category",
            )
            .context("Failed to prepare classification counts")?;

        let rows = stmt
            .query_map(params![session_id, group_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .context("Failed to count classifications")?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (category, count) = row?;
            counts.insert(category, count);
        }
        Ok(counts)
    }
}
