//! Change notifications for persisted entities.
//!
//! Every write through [`super::Store`] publishes a [`ChangeEvent`]. Observers
//! register a filter predicate and only see the events it accepts.

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Session,
    Transcript,
    SharedAnswers,
    Classification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub session_id: String,
    pub group_id: Option<String>,
}

impl ChangeEvent {
    pub fn session(session_id: &str) -> Self {
        Self {
            entity: EntityKind::Session,
            session_id: session_id.to_string(),
            group_id: None,
        }
    }

    pub fn group(entity: EntityKind, session_id: &str, group_id: &str) -> Self {
        Self {
            entity,
            session_id: session_id.to_string(),
            group_id: Some(group_id.to_string()),
        }
    }
}

type Filter = Box<dyn Fn(&ChangeEvent) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe<F>(&self, filter: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> bool + Send + Sync + 'static,
    {
        Subscription {
            rx: self.tx.subscribe(),
            filter: Box::new(filter),
        }
    }

    /// Session state changes (launch, point advance, completion) for one session.
    pub fn subscribe_session(&self, session_id: &str) -> Subscription {
        let session_id = session_id.to_string();
        self.subscribe(move |event| {
            event.entity == EntityKind::Session && event.session_id == session_id
        })
    }

    /// Any change touching one session, its groups included.
    pub fn subscribe_all(&self, session_id: &str) -> Subscription {
        let session_id = session_id.to_string();
        self.subscribe(move |event| event.session_id == session_id)
    }

    /// Bullet document changes for one group.
    pub fn subscribe_answers(&self, session_id: &str, group_id: &str) -> Subscription {
        let session_id = session_id.to_string();
        let group_id = group_id.to_string();
        self.subscribe(move |event| {
            event.entity == EntityKind::SharedAnswers
                && event.session_id == session_id
                && event.group_id.as_deref() == Some(group_id.as_str())
        })
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: Filter,
}

impl Subscription {
    /// Waits for the next matching event. `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Change subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if (self.filter)(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_filters_events() {
        let feed = ChangeFeed::default();
        let mut answers = feed.subscribe_answers("s1", "g1");
        let mut session = feed.subscribe_session("s1");

        feed.publish(ChangeEvent::group(EntityKind::SharedAnswers, "s1", "g2"));
        feed.publish(ChangeEvent::session("s2"));
        feed.publish(ChangeEvent::group(EntityKind::SharedAnswers, "s1", "g1"));
        feed.publish(ChangeEvent::session("s1"));

        assert_eq!(
            answers.next().await,
            Some(ChangeEvent::group(EntityKind::SharedAnswers, "s1", "g1"))
        );
        assert!(answers.try_next().is_none());
        assert_eq!(session.next().await, Some(ChangeEvent::session("s1")));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = ChangeFeed::new(4);
        feed.publish(ChangeEvent::session("s1"));
    }
}
