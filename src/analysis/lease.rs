//! Key-value collaborator for leases and status strings.
//!
//! A TTL'd key stands in for a distributed mutex. Only liveness is
//! guaranteed: an abandoned key expires after its TTL. Mutual exclusion holds
//! as long as holders finish within the TTL and clocks roughly agree.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::db::kv::KvRepository;
use crate::db::Db;
use crate::timer::now_ms;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Atomically writes `key` unless a live value exists. Returns whether it did.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Unconditional write.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Keys stored in the shared SQLite database, visible to every process using it.
pub struct SqliteKeyValueStore {
    db: Db,
}

impl SqliteKeyValueStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn expiry(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64)
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = now_ms();
        self.db
            .with(|conn| KvRepository::set_if_absent(conn, key, value, now, expiry(now, ttl)))
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = now_ms();
        self.db
            .with(|conn| KvRepository::set(conn, key, value, expiry(now, ttl)))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = now_ms();
        self.db.with(|conn| KvRepository::get(conn, key, now)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.db.with(|conn| KvRepository::delete(conn, key)).await
    }
}

/// Process-local store, for single-process deployments and tests.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}
