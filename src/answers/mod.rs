//! Tombstone-based bullet document per (session, group).
//!
//! Every mutation is a read-modify-write around a whole-document upsert.
//! There is no version check, so two concurrent writers race and the last
//! one wins. Bullets are never removed or reordered; deletion only sets the
//! tombstone flag, and undo clears it.

use anyhow::Result;
use tracing::debug;

use crate::db::schemas::{BulletPoint, SharedAnswers};
use crate::error::{CoreError, CoreResult};
use crate::store::Store;

#[derive(Clone)]
pub struct SharedAnswerStore {
    store: Store,
}

impl SharedAnswerStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, session_id: &str, group_id: &str) -> Result<Option<SharedAnswers>> {
        self.store.answers(session_id, group_id).await
    }

    /// Replaces the whole document, creating it if needed.
    pub async fn upsert(&self, doc: &SharedAnswers) -> Result<()> {
        self.store.upsert_answers(doc).await
    }

    /// Applies `change` to one bullet. Returns `Ok(false)` when the document,
    /// point or index does not exist.
    async fn modify<F>(
        &self,
        session_id: &str,
        group_id: &str,
        point_key: &str,
        index: usize,
        change: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut BulletPoint),
    {
        let Some(mut doc) = self.get(session_id, group_id).await? else {
            return Ok(false);
        };
        let Some(bullet) = doc
            .answers
            .get_mut(point_key)
            .and_then(|bullets| bullets.get_mut(index))
        else {
            debug!("No bullet {}[{}] for {}/{}", point_key, index, session_id, group_id);
            return Ok(false);
        };

        change(bullet);
        self.upsert(&doc).await?;
        Ok(true)
    }

    pub async fn delete(
        &self,
        session_id: &str,
        group_id: &str,
        point_key: &str,
        index: usize,
    ) -> Result<bool> {
        self.modify(session_id, group_id, point_key, index, |bullet| {
            bullet.is_deleted = true
        })
        .await
    }

    pub async fn undo(
        &self,
        session_id: &str,
        group_id: &str,
        point_key: &str,
        index: usize,
    ) -> Result<bool> {
        self.modify(session_id, group_id, point_key, index, |bullet| {
            bullet.is_deleted = false
        })
        .await
    }

    /// Rewrites a bullet's text, keeping its tombstone state.
    pub async fn edit(
        &self,
        session_id: &str,
        group_id: &str,
        point_key: &str,
        index: usize,
        content: &str,
    ) -> CoreResult<bool> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::validation("bullet content is empty"));
        }
        let content = content.to_string();
        Ok(self
            .modify(session_id, group_id, point_key, index, move |bullet| {
                bullet.content = content
            })
            .await?)
    }

    /// Adds a human-written bullet at the end of `point_key`, creating the
    /// document if this is the group's first answer. Returns its index.
    pub async fn append(
        &self,
        session_id: &str,
        group_id: &str,
        point_key: &str,
        content: &str,
    ) -> CoreResult<usize> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::validation("bullet content is empty"));
        }

        let mut doc = self
            .get(session_id, group_id)
            .await?
            .unwrap_or_else(|| SharedAnswers::empty(session_id, group_id));
        let bullets = doc.answers.entry(point_key.to_string()).or_default();
        bullets.push(BulletPoint::new(content));
        let index = bullets.len() - 1;

        // The watermark belongs to the extractor; human edits leave it alone.
        self.upsert(&doc).await?;
        Ok(index)
    }
}
