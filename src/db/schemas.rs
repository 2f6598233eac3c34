use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of a discussion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl SessionStatus {
    pub fn parse(s: &str) -> Result<SessionStatus> {
        match s {
            "draft" => Ok(SessionStatus::Draft),
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "archived" => Ok(SessionStatus::Archived),
            _ => anyhow::bail!("Invalid session status: {}", s),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Archived => "archived",
        }
    }
}

/// One timed segment of the discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub index: usize,
    pub content: String,
    /// Epoch millis. `None` until the session is launched.
    pub scheduled_start: Option<i64>,
    pub duration_secs: u64,
}

impl Point {
    pub fn new(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            content: content.into(),
            scheduled_start: None,
            duration_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    /// Epoch millis; `None` before launch.
    pub launched_at: Option<i64>,
    pub total_duration_secs: u64,
    pub points: Vec<Point>,
    pub current_point: usize,
    pub status: SessionStatus,
}

impl Session {
    pub fn current(&self) -> Option<&Point> {
        self.points.get(self.current_point)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub session_id: String,
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptMessage {
    pub id: String,
    pub group_id: String,
    pub session_id: String,
    pub point_index: usize,
    pub content: String,
    pub author: String,
    /// Epoch millis.
    pub timestamp: i64,
}

/// A bullet in the shared answer document. Never removed, only tombstoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletPoint {
    pub content: String,
    pub is_deleted: bool,
}

impl BulletPoint {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_deleted: false,
        }
    }
}

/// Stored bullets are either a bare string (older documents) or the tagged
/// object. Both land in [`BulletPoint`] at the read boundary.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredBullet {
    Text(String),
    Object {
        content: String,
        #[serde(default, rename = "isDeleted")]
        is_deleted: bool,
    },
}

impl<'de> Deserialize<'de> for BulletPoint {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match StoredBullet::deserialize(deserializer)? {
            StoredBullet::Text(content) => BulletPoint {
                content,
                is_deleted: false,
            },
            StoredBullet::Object {
                content,
                is_deleted,
            } => BulletPoint {
                content,
                is_deleted,
            },
        })
    }
}

/// Bullet document for one (session, group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedAnswers {
    pub session_id: String,
    pub group_id: String,
    pub answers: BTreeMap<String, Vec<BulletPoint>>,
    /// Epoch millis; transcript messages at or before this were already processed.
    pub last_updated: i64,
}

impl SharedAnswers {
    pub fn empty(session_id: &str, group_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            group_id: group_id.to_string(),
            answers: BTreeMap::new(),
            last_updated: 0,
        }
    }

    pub fn bullets(&self, point_key: &str) -> &[BulletPoint] {
        self.answers
            .get(point_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Contents of the non-tombstoned bullets at `point_key`.
    pub fn live_contents(&self, point_key: &str) -> Vec<String> {
        self.bullets(point_key)
            .iter()
            .filter(|bullet| !bullet.is_deleted)
            .map(|bullet| bullet.content.clone())
            .collect()
    }
}

/// Key under which a point's bullets are stored.
pub fn point_key(index: usize) -> String {
    format!("point_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_round_trip() {
        for status in [
            SessionStatus::Draft,
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Archived,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(SessionStatus::parse("launched").is_err());
    }

    #[test]
    fn test_bullets_normalized_at_read_boundary() {
        let json = r#"{
            "point_0": ["plain string bullet", {"content": "object bullet", "isDeleted": true}],
            "point_1": [{"content": "no flag"}]
        }"#;
        let answers: BTreeMap<String, Vec<BulletPoint>> = serde_json::from_str(json).unwrap();

        assert_eq!(answers["point_0"][0], BulletPoint::new("plain string bullet"));
        assert_eq!(
            answers["point_0"][1],
            BulletPoint {
                content: "object bullet".to_string(),
                is_deleted: true
            }
        );
        assert!(!answers["point_1"][0].is_deleted);
    }

    #[test]
    fn test_bullets_always_written_as_objects() {
        let json = serde_json::to_string(&BulletPoint::new("x")).unwrap();
        assert_eq!(json, r#"{"content":"x","isDeleted":false}"#);
    }

    #[test]
    fn test_live_contents_skips_tombstones() {
        let mut doc = SharedAnswers::empty("s", "g");
        doc.answers.insert(
            point_key(0),
            vec![
                BulletPoint::new("kept"),
                BulletPoint {
                    content: "gone".to_string(),
                    is_deleted: true,
                },
            ],
        );
        assert_eq!(doc.live_contents("point_0"), vec!["kept".to_string()]);
        assert!(doc.live_contents("point_9").is_empty());
    }
}
