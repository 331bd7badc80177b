//! Expired record cleanup and its cross-process gate

use crate::*;
use std::time::{Duration, Instant};

const START_MS: i64 = 1_700_000_000_000;

fn seed_expiring(store: &StateStore, expired: usize, live: usize) {
    let mut reqs = Vec::new();
    for i in 0..expired {
        reqs.push(SetRequest::new(format!("expired-{i}"), i as i64).ttl(Duration::from_secs(1)));
    }
    for i in 0..live {
        reqs.push(SetRequest::new(format!("live-{i}"), i as i64));
    }
    store.bulk_set(&ctx(), &reqs).unwrap();
}

// =============================================================================
// MANUAL SWEEPS
// =============================================================================

#[test]
fn test_sweep_deletes_only_expired_rows() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let store = open_file_with_clock(&path, clock.clone());

    seed_expiring(&store, 10, 10);
    assert_eq!(count_rows(&path, "state"), 20);

    clock.advance(Duration::from_secs(2));
    let outcome = store.cleanup_expired(&ctx()).unwrap();

    assert_eq!(outcome, CleanupOutcome::Swept { deleted: 10 });
    assert_eq!(count_rows(&path, "state"), 10);
    assert_eq!(last_cleanup(&path), Some(START_MS + 2_000));
}

#[test]
fn test_immediate_second_sweep_is_skipped() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let store = open_file_with_clock(&path, clock.clone());

    seed_expiring(&store, 3, 3);
    clock.advance(Duration::from_secs(2));
    store.cleanup_expired(&ctx()).unwrap();
    let gate = last_cleanup(&path);

    // more rows expire, but the gate is still closed
    seed_expiring(&store, 3, 0);
    clock.advance(Duration::from_secs(2));
    assert_eq!(store.cleanup_expired(&ctx()).unwrap(), CleanupOutcome::Skipped);
    assert_eq!(count_rows(&path, "state"), 6);
    assert_eq!(last_cleanup(&path), gate);
}

#[test]
fn test_gate_reopens_after_interval() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let store = open_file_with_clock(&path, clock.clone());

    store.cleanup_expired(&ctx()).unwrap();
    seed_expiring(&store, 2, 0);

    clock.advance(Duration::from_secs(3599));
    assert_eq!(store.cleanup_expired(&ctx()).unwrap(), CleanupOutcome::Skipped);

    clock.advance(Duration::from_secs(1));
    assert_eq!(
        store.cleanup_expired(&ctx()).unwrap(),
        CleanupOutcome::Swept { deleted: 2 }
    );
}

#[test]
fn test_gate_is_shared_between_stores_on_one_file() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let first = open_file_with_clock(&path, clock.clone());
    let second = open_file_with_clock(&path, clock.clone());

    seed_expiring(&first, 4, 1);
    clock.advance(Duration::from_secs(5));

    assert_eq!(
        first.cleanup_expired(&ctx()).unwrap(),
        CleanupOutcome::Swept { deleted: 4 }
    );
    assert_eq!(second.cleanup_expired(&ctx()).unwrap(), CleanupOutcome::Skipped);
}

#[test]
fn test_unreadable_gate_is_treated_as_never_run() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let store = open_file_with_clock(&path, clock.clone());
    seed_expiring(&store, 1, 0);
    clock.advance(Duration::from_secs(2));

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, 'garbage')",
        [LAST_CLEANUP_KEY],
    )
    .unwrap();
    drop(conn);

    assert_eq!(
        store.cleanup_expired(&ctx()).unwrap(),
        CleanupOutcome::Swept { deleted: 1 }
    );
}

#[test]
fn test_sweep_with_real_clock_records_now() {
    let (_dir, path) = temp_db();
    let store = open_file(&path, None);
    let past = chrono::Utc::now() - chrono::Duration::seconds(60);
    for i in 0..10 {
        store
            .set(&ctx(), &SetRequest::new(format!("old-{i}"), "x").expire_at(past))
            .unwrap();
    }
    store.set(&ctx(), &SetRequest::new("keep", "x")).unwrap();

    let before = chrono::Utc::now().timestamp_millis();
    store.cleanup_expired(&ctx()).unwrap();
    let after = chrono::Utc::now().timestamp_millis();

    assert_eq!(count_rows(&path, "state"), 1);
    let recorded = last_cleanup(&path).unwrap();
    assert!(recorded >= before && recorded <= after);
}

// =============================================================================
// FAILED SWEEPS
// =============================================================================

fn open_faulty(path: &Path, statement: &'static str, clock: Arc<ManualClock>) -> StateStore {
    init_tracing();
    StateStore::builder()
        .connection(path.to_str().expect("utf-8 path"))
        .cleanup_interval(None)
        .clock(clock)
        .backend(Arc::new(FaultyBackend::on_file(path, statement)))
        .open()
        .expect("open faulty store")
}

#[test]
fn test_failed_delete_leaves_gate_and_rows_untouched() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let store = open_faulty(&path, "delete_expired", clock.clone());

    seed_expiring(&store, 3, 1);
    clock.advance(Duration::from_secs(2));

    let err = store.cleanup_expired(&ctx()).unwrap_err();
    assert!(matches!(err, Error::Backend(_)), "{err:?}");
    assert!(err.to_string().contains("delete_expired"));
    assert_eq!(last_cleanup(&path), None);
    assert_eq!(count_rows(&path, "state"), 4);

    // the next attempt starts from the same gate state
    let err = store.cleanup_expired(&ctx()).unwrap_err();
    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(last_cleanup(&path), None);
    assert_eq!(count_rows(&path, "state"), 4);
}

#[test]
fn test_failed_gate_update_restores_deleted_rows() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    let store = open_faulty(&path, "upsert_metadata", clock.clone());

    seed_expiring(&store, 5, 2);
    clock.advance(Duration::from_secs(2));

    let err = store.cleanup_expired(&ctx()).unwrap_err();
    assert!(err.to_string().contains("upsert_metadata"));
    assert_eq!(last_cleanup(&path), None);
    assert_eq!(count_rows(&path, "state"), 7);
    for i in 0..5 {
        assert!(store.get(&ctx(), &GetRequest::new(format!("expired-{i}"))).is_ok());
    }
}

#[test]
fn test_failed_sweep_keeps_earlier_gate() {
    let (_dir, path) = temp_db();
    let clock = Arc::new(ManualClock::at_millis(START_MS));
    {
        let store = open_file_with_clock(&path, clock.clone());
        store.cleanup_expired(&ctx()).unwrap();
        store.close().unwrap();
    }
    assert_eq!(last_cleanup(&path), Some(START_MS));

    let store = open_faulty(&path, "delete_expired", clock.clone());
    clock.advance(Duration::from_secs(7200));
    assert!(store.cleanup_expired(&ctx()).is_err());
    assert_eq!(last_cleanup(&path), Some(START_MS));
}

// =============================================================================
// SCHEDULER
// =============================================================================

#[test]
fn test_scheduler_sweeps_in_background() {
    let (_dir, path) = temp_db();
    let store = open_file(&path, Some(Duration::from_secs(1)));
    assert!(store.is_cleanup_scheduled());

    let past = chrono::Utc::now() - chrono::Duration::seconds(10);
    for i in 0..3 {
        store
            .set(&ctx(), &SetRequest::new(format!("old-{i}"), "x").expire_at(past))
            .unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while count_rows(&path, "state") > 0 {
        assert!(Instant::now() < deadline, "scheduler did not sweep in time");
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(last_cleanup(&path).is_some());
}

#[test]
fn test_close_stops_scheduler() {
    let (_dir, path) = temp_db();
    let store = open_file(&path, Some(Duration::from_secs(3600)));
    assert!(store.is_cleanup_scheduled());

    let started = Instant::now();
    store.close().unwrap();
    assert!(!store.is_cleanup_scheduled());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_no_scheduler_when_disabled() {
    let store = ephemeral();
    assert!(!store.is_cleanup_scheduled());
}
