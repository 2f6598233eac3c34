//! Async persistence facade.
//!
//! Wraps the rusqlite repositories behind the shared [`Db`] connection and
//! publishes a change event after every successful write.

pub mod feed;

pub use feed::{ChangeEvent, ChangeFeed, EntityKind, Subscription};

use anyhow::Result;
use std::collections::BTreeMap;

use crate::db::answers::AnswersRepository;
use crate::db::classifications::ClassificationRepository;
use crate::db::schemas::{Group, Point, Session, SessionStatus, SharedAnswers, TranscriptMessage};
use crate::db::sessions::{GroupRepository, SessionRepository};
use crate::db::transcript::TranscriptRepository;
use crate::db::Db;

#[derive(Clone)]
pub struct Store {
    db: Db,
    feed: ChangeFeed,
}

impl Store {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            feed: ChangeFeed::default(),
        }
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Db::open_in_memory()?))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    // Sessions

    pub async fn create_session(&self, session: &Session) -> Result<()> {
        self.db
            .with(|conn| SessionRepository::insert(conn, session))
            .await?;
        self.feed.publish(ChangeEvent::session(&session.id));
        Ok(())
    }

    pub async fn session(&self, id: &str) -> Result<Option<Session>> {
        self.db.with(|conn| SessionRepository::get(conn, id)).await
    }

    pub async fn active_sessions(&self) -> Result<Vec<Session>> {
        self.db
            .with(|conn| SessionRepository::list_by_status(conn, SessionStatus::Active))
            .await
    }

    pub async fn launch_session(&self, id: &str, launched_at: i64, points: &[Point]) -> Result<bool> {
        let launched = self
            .db
            .with(|conn| SessionRepository::launch(conn, id, launched_at, points))
            .await?;
        if launched {
            self.feed.publish(ChangeEvent::session(id));
        }
        Ok(launched)
    }

    /// Conditional point advance; see [`SessionRepository::advance`].
    pub async fn advance_point(
        &self,
        id: &str,
        expected: usize,
        next: usize,
        points: &[Point],
    ) -> Result<bool> {
        let advanced = self
            .db
            .with(|conn| SessionRepository::advance(conn, id, expected, next, points))
            .await?;
        if advanced {
            self.feed.publish(ChangeEvent::session(id));
        }
        Ok(advanced)
    }

    pub async fn complete_session(&self, id: &str) -> Result<bool> {
        let completed = self
            .db
            .with(|conn| SessionRepository::complete(conn, id))
            .await?;
        if completed {
            self.feed.publish(ChangeEvent::session(id));
        }
        Ok(completed)
    }

    pub async fn archive_session(&self, id: &str) -> Result<bool> {
        let archived = self
            .db
            .with(|conn| SessionRepository::archive(conn, id))
            .await?;
        if archived {
            self.feed.publish(ChangeEvent::session(id));
        }
        Ok(archived)
    }

    // Groups

    pub async fn add_group(&self, group: &Group) -> Result<()> {
        self.db
            .with(|conn| GroupRepository::insert(conn, group))
            .await
    }

    pub async fn group(&self, id: &str) -> Result<Option<Group>> {
        self.db.with(|conn| GroupRepository::get(conn, id)).await
    }

    pub async fn groups(&self, session_id: &str) -> Result<Vec<Group>> {
        self.db
            .with(|conn| GroupRepository::list_for_session(conn, session_id))
            .await
    }

    // Transcript

    pub async fn append_message(&self, message: &TranscriptMessage) -> Result<bool> {
        let appended = self
            .db
            .with(|conn| TranscriptRepository::append(conn, message))
            .await?;
        if appended {
            self.feed.publish(ChangeEvent::group(
                EntityKind::Transcript,
                &message.session_id,
                &message.group_id,
            ));
        }
        Ok(appended)
    }

    pub async fn messages_between(
        &self,
        session_id: &str,
        group_id: &str,
        point_index: usize,
        after: i64,
        until: i64,
    ) -> Result<Vec<TranscriptMessage>> {
        self.db
            .with(|conn| {
                TranscriptRepository::for_point_between(
                    conn,
                    session_id,
                    group_id,
                    point_index,
                    after,
                    until,
                )
            })
            .await
    }

    pub async fn message_count(&self, session_id: &str, group_id: &str) -> Result<i64> {
        self.db
            .with(|conn| TranscriptRepository::count_for_group(conn, session_id, group_id))
            .await
    }

    pub async fn unclassified_messages(
        &self,
        session_id: &str,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<TranscriptMessage>> {
        self.db
            .with(|conn| TranscriptRepository::unclassified(conn, session_id, group_id, limit))
            .await
    }

    // Shared answers

    pub async fn answers(&self, session_id: &str, group_id: &str) -> Result<Option<SharedAnswers>> {
        self.db
            .with(|conn| AnswersRepository::get(conn, session_id, group_id))
            .await
    }

    pub async fn upsert_answers(&self, doc: &SharedAnswers) -> Result<()> {
        self.db
            .with(|conn| AnswersRepository::upsert(conn, doc))
            .await?;
        self.feed.publish(ChangeEvent::group(
            EntityKind::SharedAnswers,
            &doc.session_id,
            &doc.group_id,
        ));
        Ok(())
    }

    /// Creates an empty document unless one exists, leaving existing bullets
    /// untouched. Returns whether it created one.
    pub async fn init_answers(&self, session_id: &str, group_id: &str) -> Result<bool> {
        let doc = SharedAnswers::empty(session_id, group_id);
        let created = self
            .db
            .with(|conn| AnswersRepository::insert_if_absent(conn, &doc))
            .await?;
        if created {
            self.feed.publish(ChangeEvent::group(
                EntityKind::SharedAnswers,
                session_id,
                group_id,
            ));
        }
        Ok(created)
    }

    // Ethical classifications

    /// Stores a batch of `(message_id, category)` pairs. Returns how many were new.
    pub async fn record_classifications(
        &self,
        session_id: &str,
        group_id: &str,
        classified: &[(String, String)],
        classified_at: i64,
    ) -> Result<usize> {
        let written = self
            .db
            .with(|conn| {
                let tx = conn.unchecked_transaction()?;
                let mut written = 0;
                for (message_id, category) in classified {
                    if ClassificationRepository::insert(
                        &tx,
                        message_id,
                        session_id,
                        group_id,
                        category,
                        classified_at,
                    )? {
                        written += 1;
                    }
                }
                tx.commit()?;
                Ok(written)
            })
            .await?;
        if written > 0 {
            self.feed.publish(ChangeEvent::group(
                EntityKind::Classification,
                session_id,
                group_id,
            ));
        }
        Ok(written)
    }

    pub async fn classification_counts(
        &self,
        session_id: &str,
        group_id: &str,
    ) -> Result<BTreeMap<String, i64>> {
        self.db
            .with(|conn| ClassificationRepository::counts(conn, session_id, group_id))
            .await
    }
}
