/// Navigation history tests
///
/// Session histories recorded through the store, expired by the sweeper.
/// Run with: cargo test --test history_tests

use chrono::NaiveDate;
use cura::CuraConfig;
use cura::best_effort::{ErrorLogEntry, JsonLinesErrorLog};
use cura::history::{HistoryStore, Visit, spawn_sweeper};
use std::sync::Arc;
use std::time::Duration;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

#[tokio::test]
async fn test_back_links_follow_the_session() {
    let config = CuraConfig::new().history_ttl_days(2);
    let store = HistoryStore::new(config.history_ttl().unwrap());
    let session = store.open_session().await;
    let other = store.open_session().await;

    let visits = [
        Visit::get("/issues/", "crm.local").referrer("http://crm.local/"),
        Visit::get("/issues/42/", "crm.local").referrer("http://crm.local/issues/"),
        Visit::post(
            "/issues/changelog/",
            "crm.local",
            [("issue_id".to_string(), "42".to_string())],
        )
        .referrer("http://crm.local/issues/42/"),
    ];
    for visit in &visits {
        assert!(store.try_record(session, visit, day(1)).await.unwrap());
    }

    let history = store.history(session).await.unwrap();
    assert_eq!(history.page("/issues/42/").unwrap().referrer, "/issues/");
    assert_eq!(
        history.page("/issues/changelog/").unwrap().referrer,
        "/issues/42/"
    );
    assert_eq!(
        history
            .page("/issues/42/")
            .unwrap()
            .post_data
            .get("issue_id")
            .map(String::as_str),
        Some("42")
    );
    assert!(store.history(other).await.unwrap().is_empty());
    assert_eq!(store.session_count().await, 2);

    // Pages expire two days after their last touch
    assert_eq!(store.sweep(day(2)).await, 0);
    let touched = Visit::get("/issues/42/", "crm.local").referrer("http://crm.local/issues/");
    store.try_record(session, &touched, day(2)).await.unwrap();
    assert_eq!(store.sweep(day(3)).await, 2);

    let history = store.history(session).await.unwrap();
    let left: Vec<&str> = history.pages().map(|(path, _)| path).collect();
    assert_eq!(left, vec!["/issues/42/"]);
}

#[tokio::test]
async fn test_sweeper_runs_until_stopped() {
    let store = Arc::new(HistoryStore::new(chrono::Duration::days(1)));
    let session = store.open_session().await;
    let visit = Visit::get("/a/", "h").referrer("http://h/b/");
    // Already expired by today's clock
    store.try_record(session, &visit, day(1)).await.unwrap();

    let sweeper = spawn_sweeper(store.clone(), Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(50)).await;
    sweeper.stop().await.unwrap();

    assert!(store.history(session).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_lost_visits_land_in_the_error_log() {
    let dir = tempfile::TempDir::new().unwrap();
    let log = Arc::new(JsonLinesErrorLog::new(dir.path().join("errors.jsonl")));
    let store = HistoryStore::new(chrono::Duration::days(1)).with_error_log(log.clone());

    let live = store.open_session().await;
    let visit = Visit::get("/issues/", "crm.local")
        .referrer("http://crm.local/")
        .user("ada");
    store.record(live, &visit).await;
    store.record(uuid::Uuid::new_v4(), &visit).await;
    store.record(uuid::Uuid::new_v4(), &visit).await;

    let text = std::fs::read_to_string(log.path()).unwrap();
    let entries: Vec<ErrorLogEntry> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|entry| entry.url == "/issues/"));
    assert_eq!(entries[0].user.as_deref(), Some("ada"));
    let history = store.history(live).await.unwrap();
    assert_eq!(history.page("/issues/").unwrap().referrer, "/");
}
