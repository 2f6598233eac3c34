use super::answers::AnswersRepository;
use super::init::migrate;
use super::kv::KvRepository;
use super::schemas::{
    point_key, BulletPoint, Group, Point, Session, SessionStatus, SharedAnswers, TranscriptMessage,
};
use super::sessions::{GroupRepository, SessionRepository};
use super::transcript::TranscriptRepository;
use anyhow::Result;
use rusqlite::Connection;

fn setup_test_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

fn draft_session(id: &str) -> Session {
    Session {
        id: id.to_string(),
        title: "Ocean plastics".to_string(),
        launched_at: None,
        total_duration_secs: 600,
        points: vec![
            Point::new(0, "Causes"),
            Point::new(1, "Effects"),
            Point::new(2, "Solutions"),
        ],
        current_point: 0,
        status: SessionStatus::Draft,
    }
}

fn message(id: &str, point_index: usize, timestamp: i64) -> TranscriptMessage {
    TranscriptMessage {
        id: id.to_string(),
        group_id: "g1".to_string(),
        session_id: "s1".to_string(),
        point_index,
        content: format!("message {id}"),
        author: "alice".to_string(),
        timestamp,
    }
}

#[test]
fn test_migrate_creates_tables() {
    let conn = Connection::open_in_memory().unwrap();
    migrate(&conn).unwrap();
    // Idempotent
    migrate(&conn).unwrap();

    for table in [
        "sessions",
        "groups",
        "transcript_messages",
        "shared_answers",
        "kv_store",
        "ethical_classifications",
    ] {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1, "missing table {table}");
    }
}

#[test]
fn test_session_round_trip() {
    let conn = setup_test_db().unwrap();
    SessionRepository::insert(&conn, &draft_session("s1")).unwrap();

    let session = SessionRepository::get(&conn, "s1").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Draft);
    assert_eq!(session.points.len(), 3);
    assert_eq!(session.points[2].content, "Solutions");
    assert!(session.launched_at.is_none());

    assert!(SessionRepository::get(&conn, "missing").unwrap().is_none());
}

#[test]
fn test_launch_only_from_draft() {
    let conn = setup_test_db().unwrap();
    let session = draft_session("s1");
    SessionRepository::insert(&conn, &session).unwrap();

    assert!(SessionRepository::launch(&conn, "s1", 1_000, &session.points).unwrap());
    assert!(!SessionRepository::launch(&conn, "s1", 2_000, &session.points).unwrap());

    let stored = SessionRepository::get(&conn, "s1").unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Active);
    assert_eq!(stored.launched_at, Some(1_000));
}

#[test]
fn test_advance_is_conditional_on_expected_point() {
    let conn = setup_test_db().unwrap();
    let session = draft_session("s1");
    SessionRepository::insert(&conn, &session).unwrap();
    SessionRepository::launch(&conn, "s1", 0, &session.points).unwrap();

    assert!(SessionRepository::advance(&conn, "s1", 0, 1, &session.points).unwrap());
    // Second attempt from the same prior value is a no-op
    assert!(!SessionRepository::advance(&conn, "s1", 0, 1, &session.points).unwrap());

    let stored = SessionRepository::get(&conn, "s1").unwrap().unwrap();
    assert_eq!(stored.current_point, 1);
}

#[test]
fn test_no_advance_after_completion() {
    let conn = setup_test_db().unwrap();
    let session = draft_session("s1");
    SessionRepository::insert(&conn, &session).unwrap();
    SessionRepository::launch(&conn, "s1", 0, &session.points).unwrap();

    assert!(SessionRepository::complete(&conn, "s1").unwrap());
    assert!(!SessionRepository::complete(&conn, "s1").unwrap());
    assert!(!SessionRepository::advance(&conn, "s1", 0, 1, &session.points).unwrap());

    assert!(SessionRepository::archive(&conn, "s1").unwrap());
    let stored = SessionRepository::get(&conn, "s1").unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Archived);
}

#[test]
fn test_list_active_sessions() {
    let conn = setup_test_db().unwrap();
    let first = draft_session("s1");
    SessionRepository::insert(&conn, &first).unwrap();
    SessionRepository::insert(&conn, &draft_session("s2")).unwrap();
    SessionRepository::launch(&conn, "s1", 0, &first.points).unwrap();

    let active = SessionRepository::list_by_status(&conn, SessionStatus::Active).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "s1");
}

#[test]
fn test_groups_for_session() {
    let conn = setup_test_db().unwrap();
    for id in ["g1", "g2"] {
        GroupRepository::insert(
            &conn,
            &Group {
                id: id.to_string(),
                session_id: "s1".to_string(),
                member_ids: vec!["alice".to_string(), "bob".to_string()],
            },
        )
        .unwrap();
    }

    let groups = GroupRepository::list_for_session(&conn, "s1").unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].member_ids.len(), 2);
    assert!(GroupRepository::get(&conn, "g2").unwrap().is_some());
    assert!(GroupRepository::list_for_session(&conn, "other").unwrap().is_empty());
}

#[test]
fn test_transcript_append_ignores_duplicate_ids() {
    let conn = setup_test_db().unwrap();
    assert!(TranscriptRepository::append(&conn, &message("m1", 0, 100)).unwrap());
    assert!(!TranscriptRepository::append(&conn, &message("m1", 0, 100)).unwrap());
    assert_eq!(TranscriptRepository::count_for_group(&conn, "s1", "g1").unwrap(), 1);
}

#[test]
fn test_transcript_window_is_exclusive_then_inclusive() {
    let conn = setup_test_db().unwrap();
    TranscriptRepository::append(&conn, &message("m1", 0, 100)).unwrap();
    TranscriptRepository::append(&conn, &message("m2", 0, 200)).unwrap();
    TranscriptRepository::append(&conn, &message("m3", 0, 300)).unwrap();
    TranscriptRepository::append(&conn, &message("m4", 1, 250)).unwrap();

    let window = TranscriptRepository::for_point_between(&conn, "s1", "g1", 0, 100, 300).unwrap();
    let ids: Vec<_> = window.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m3"]);
}

#[test]
fn test_answers_upsert_replaces_document() {
    let conn = setup_test_db().unwrap();
    assert!(AnswersRepository::get(&conn, "s1", "g1").unwrap().is_none());

    let mut doc = SharedAnswers::empty("s1", "g1");
    AnswersRepository::upsert(&conn, &doc).unwrap();

    doc.answers
        .insert(point_key(0), vec![BulletPoint::new("Plastic harms turtles")]);
    doc.last_updated = 500;
    AnswersRepository::upsert(&conn, &doc).unwrap();

    let stored = AnswersRepository::get(&conn, "s1", "g1").unwrap().unwrap();
    assert_eq!(stored, doc);
}

#[test]
fn test_answers_watermark_never_moves_back() {
    let conn = setup_test_db().unwrap();
    let mut doc = SharedAnswers::empty("s1", "g1");
    doc.last_updated = 500;
    AnswersRepository::upsert(&conn, &doc).unwrap();

    // Stale copy: bullets still replace, the watermark stays
    let mut stale = SharedAnswers::empty("s1", "g1");
    stale
        .answers
        .insert(point_key(0), vec![BulletPoint::new("Nets trap dolphins")]);
    stale.last_updated = 100;
    AnswersRepository::upsert(&conn, &stale).unwrap();

    let stored = AnswersRepository::get(&conn, "s1", "g1").unwrap().unwrap();
    assert_eq!(stored.last_updated, 500);
    assert_eq!(stored.live_contents("point_0"), vec!["Nets trap dolphins".to_string()]);
}

#[test]
fn test_answers_insert_if_absent_keeps_existing_bullets() {
    let conn = setup_test_db().unwrap();
    let mut doc = SharedAnswers::empty("s1", "g1");
    doc.answers
        .insert(point_key(0), vec![BulletPoint::new("Human idea")]);
    AnswersRepository::upsert(&conn, &doc).unwrap();

    assert!(!AnswersRepository::insert_if_absent(&conn, &SharedAnswers::empty("s1", "g1")).unwrap());
    let stored = AnswersRepository::get(&conn, "s1", "g1").unwrap().unwrap();
    assert_eq!(stored, doc);

    assert!(AnswersRepository::insert_if_absent(&conn, &SharedAnswers::empty("s1", "g2")).unwrap());
    assert!(AnswersRepository::get(&conn, "s1", "g2").unwrap().is_some());
}

#[test]
fn test_kv_set_if_absent_respects_expiry() {
    let conn = setup_test_db().unwrap();
    assert!(KvRepository::set_if_absent(&conn, "lease", "a", 0, 30_000).unwrap());
    assert!(!KvRepository::set_if_absent(&conn, "lease", "b", 10_000, 40_000).unwrap());
    assert_eq!(
        KvRepository::get(&conn, "lease", 10_000).unwrap(),
        Some("a".to_string())
    );

    // Expired row no longer blocks a new holder
    assert!(KvRepository::get(&conn, "lease", 30_000).unwrap().is_none());
    assert!(KvRepository::set_if_absent(&conn, "lease", "c", 30_000, 60_000).unwrap());

    KvRepository::delete(&conn, "lease").unwrap();
    assert!(KvRepository::get(&conn, "lease", 30_000).unwrap().is_none());
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("huddle.db");

    let db = super::Db::open(&path).unwrap();
    db.with(|conn| SessionRepository::insert(conn, &draft_session("s1")))
        .await
        .unwrap();
    drop(db);

    let reopened = super::Db::open(&path).unwrap();
    let session = reopened
        .with(|conn| SessionRepository::get(conn, "s1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.title, "Ocean plastics");
    assert_eq!(session.points.len(), 3);
}
