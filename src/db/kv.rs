//! TTL-backed key-value rows used for analysis leases and status strings.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

pub struct KvRepository;

impl KvRepository {
    /// Writes `key` only when no unexpired row exists. Returns whether it did.
    pub fn set_if_absent(
        conn: &Connection,
        key: &str,
        value: &str,
        now_ms: i64,
        expires_at: i64,
    ) -> Result<bool> {
        let tx = conn
            .unchecked_transaction()
            .context("Failed to begin lease transaction")?;

        tx.execute(
            "DELETE FROM kv_store WHERE key = ?1 AND expires_at <= ?2",
            params![key, now_ms],
        )
        .context("Failed to purge expired key")?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )
            .context("Failed to insert key")?;

        tx.commit().context("Failed to commit lease transaction")?;
        Ok(inserted == 1)
    }

    pub fn set(conn: &Connection, key: &str, value: &str, expires_at: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )
        .context("Failed to set key")?;
        Ok(())
    }

    pub fn get(conn: &Connection, key: &str, now_ms: i64) -> Result<Option<String>> {
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1 AND expires_at > ?2",
            params![key, now_ms],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read key")
    }

    pub fn delete(conn: &Connection, key: &str) -> Result<()> {
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .context("Failed to delete key")?;
        Ok(())
    }
}
