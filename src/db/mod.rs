//! SQLite persistence.
//!
//! Raw SQL with rusqlite, one repository per table. Repositories are plain
//! synchronous functions over a `&Connection`; [`Db`] hands out the shared
//! connection to async callers.

pub mod answers;
pub mod classifications;
pub mod init;
pub mod kv;
pub mod schemas;
pub mod sessions;
pub mod transcript;

#[cfg(test)]
mod tests;

pub use init::{migrate, open_db};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared, serialized access to one SQLite connection.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with exclusive access to the connection.
    pub async fn with<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().await;
        f(&conn)
    }
}
