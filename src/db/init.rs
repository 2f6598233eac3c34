use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

pub fn open_db(db_path: &Path) -> Result<Connection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(db_path).context("Failed to open database connection")?;

    // Several processes may share the file (service + `huddle analyze`)
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .context("Failed to set busy timeout")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            total_duration_secs INTEGER NOT NULL,
            launched_at INTEGER,
            current_point INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'draft',
            points TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create sessions table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status)",
        [],
    )
    .context("Failed to create sessions status index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS groups (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            members TEXT NOT NULL,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create groups table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_groups_session ON groups(session_id)",
        [],
    )
    .context("Failed to create groups session index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transcript_messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            group_id TEXT NOT NULL,
            point_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            author TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )",
        [],
    )
    .context("Failed to create transcript_messages table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transcript_group_point
         ON transcript_messages(session_id, group_id, point_index, timestamp)",
        [],
    )
    .context("Failed to create transcript index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS shared_answers (
            session_id TEXT NOT NULL,
            group_id TEXT NOT NULL,
            answers TEXT NOT NULL,
            last_updated INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (session_id, group_id)
        )",
        [],
    )
    .context("Failed to create shared_answers table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        [],
    )
    .context("Failed to create kv_store table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ethical_classifications (
            message_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            group_id TEXT NOT NULL,
            category TEXT NOT NULL,
            classified_at INTEGER NOT NULL
        )",
        [],
    )
    .context("Failed to create ethical_classifications table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_ethical_group
         ON ethical_classifications(session_id, group_id)",
        [],
    )
    .context("Failed to create ethical_classifications index")?;

    Ok(())
}
