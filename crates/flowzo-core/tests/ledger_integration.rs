//! Integration tests for running sessions against an on-disk ledger.

use std::sync::Arc;
use std::time::Duration;

use flowzo_core::{Ledger, RunOutcome, SessionEngine, SessionState, SqliteLedger};
use serde_json::json;
use tempfile::TempDir;

fn open_ledger(dir: &TempDir) -> Arc<SqliteLedger> {
    Arc::new(SqliteLedger::open(dir.path().join("ledger.db")).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_completed_run_is_persisted() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    let engine = SessionEngine::with_ledger(Some("disk_run".into()), ledger.clone());

    let outcome = engine
        .run_session(Duration::from_secs(1), Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let record = ledger.get_session_record("disk_run").unwrap().unwrap();
    assert_eq!(record.state, "completed");
    assert_eq!(record.duration_seconds, 1);
    assert!(record.end_time.is_some());

    let stored = ledger.get_session_events("disk_run").unwrap();
    let in_memory = engine.export_events();
    assert_eq!(stored.len(), in_memory.len());
    for (row, event) in stored.iter().zip(&in_memory) {
        assert_eq!(row.event_type, event.event_type);
        assert_eq!(row.state, event.state.as_str());
        assert_eq!(row.timestamp, event.timestamp);
        assert_eq!(row.data_value().unwrap(), json!(event.data));
    }
}

#[tokio::test(start_paused = true)]
async fn test_ledger_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = SessionEngine::with_ledger(Some("reopened".into()), open_ledger(&dir));
        engine
            .run_session(Duration::from_secs(1), Duration::ZERO)
            .await
            .unwrap();
        engine
            .capture_context("window_focus", &json!({"app": "editor"}))
            .unwrap();
    }

    let ledger = open_ledger(&dir);
    assert_eq!(ledger.get_session_events("reopened").unwrap().len(), 8);
    let contexts = ledger.get_flow_contexts("reopened").unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].context_type, "window_focus");
}

#[tokio::test(start_paused = true)]
async fn test_aborted_run_is_persisted() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    let engine = SessionEngine::with_ledger(Some("aborted_run".into()), ledger.clone());

    let runner = engine.clone();
    let run = tokio::spawn(async move {
        runner
            .run_session(Duration::from_secs(60), Duration::from_secs(1))
            .await
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.state(), SessionState::Active);
    engine.abort_session().unwrap();
    assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Aborted);

    let record = ledger.get_session_record("aborted_run").unwrap().unwrap();
    assert_eq!(record.state, "aborted");

    let last = ledger
        .get_session_events("aborted_run")
        .unwrap()
        .pop()
        .unwrap();
    assert_eq!(last.event_type, "session_aborted");
    assert_eq!(last.data_value().unwrap()["aborted_from_state"], "active");
}

#[tokio::test(start_paused = true)]
async fn test_recent_sessions_lists_newest_first() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);

    for id in ["first", "second", "third"] {
        let engine = SessionEngine::with_ledger(Some(id.into()), ledger.clone());
        engine
            .run_session(Duration::from_secs(1), Duration::ZERO)
            .await
            .unwrap();
    }

    let recent: Vec<_> = ledger
        .get_recent_sessions(2)
        .unwrap()
        .into_iter()
        .map(|r| r.session_id)
        .collect();
    assert_eq!(recent, vec!["third", "second"]);
}

#[tokio::test(start_paused = true)]
async fn test_reused_session_id_keeps_first_record() {
    let dir = TempDir::new().unwrap();
    let ledger = open_ledger(&dir);
    let engine = SessionEngine::with_ledger(Some("reused".into()), ledger.clone());

    engine
        .run_session(Duration::from_secs(1), Duration::ZERO)
        .await
        .unwrap();
    let first = ledger.get_session_record("reused").unwrap().unwrap();
    assert_eq!(first.state, "completed");

    engine
        .run_session(Duration::from_secs(2), Duration::ZERO)
        .await
        .unwrap();

    // The second record insert is rejected as a duplicate; the first row
    // stays as it was while events of both runs still land.
    assert_eq!(ledger.get_session_record("reused").unwrap().unwrap(), first);
    assert_eq!(engine.event_count(), 16);
    assert_eq!(ledger.get_session_events("reused").unwrap().len(), 16);
    assert_eq!(ledger.get_recent_sessions(10).unwrap().len(), 1);
}
