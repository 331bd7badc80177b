//! Deadlines and cancellation

use crate::*;
use std::thread;
use std::time::{Duration, Instant};

/// Store over a single-connection backend the test can also hold
fn store_with_shared_backend() -> (StateStore, Arc<SqliteBackend>) {
    init_tracing();
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let store = StateStore::builder()
        .connection(":memory:")
        .cleanup_interval(None)
        .backend(backend.clone())
        .open()
        .unwrap();
    (store, backend)
}

// =============================================================================
// DEADLINES
// =============================================================================

#[test]
fn test_waiting_for_connection_respects_deadline() {
    let (store, backend) = store_with_shared_backend();
    let held = backend.begin(&ctx(), TxMode::Write).unwrap();

    let started = Instant::now();
    let err = store
        .set(
            &OpContext::with_timeout(Duration::from_millis(50)),
            &SetRequest::new("k", "v"),
        )
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));

    drop(held);
    store.set(&ctx(), &SetRequest::new("k", "v")).unwrap();
}

#[test]
fn test_expired_context_fails_without_side_effects() {
    let store = ephemeral();
    let expired = OpContext::with_timeout(Duration::ZERO);

    assert!(matches!(
        store.set(&expired, &SetRequest::new("k", "v")),
        Err(Error::DeadlineExceeded)
    ));
    assert!(store.get(&ctx(), &"k".into()).unwrap_err().is_not_found());
}

// =============================================================================
// CANCELLATION
// =============================================================================

#[test]
fn test_cancelled_token_stops_operation() {
    let store = ephemeral();
    let token = CancelToken::new();
    token.cancel();
    let cancelled = OpContext::background().cancel_token(token);

    let err = store.get(&cancelled, &"k".into()).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(err.is_timeout());
    assert!(matches!(
        store.multi(&cancelled, &[SetRequest::new("k", "v").into()]),
        Err(Error::Cancelled)
    ));
}

#[test]
fn test_cancel_while_waiting_for_connection() {
    let (store, backend) = store_with_shared_backend();
    let held = backend.begin(&ctx(), TxMode::Write).unwrap();

    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            token.cancel();
        })
    };

    let started = Instant::now();
    let err = store
        .set(
            &OpContext::background().cancel_token(token),
            &SetRequest::new("k", "v"),
        )
        .unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, Error::Cancelled), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    drop(held);
}

// =============================================================================
// INTERRUPTED STATEMENTS
// =============================================================================

const LARGE: usize = 100_000;

fn large_batch(prefix: &str) -> Vec<SetRequest> {
    (0..LARGE)
        .map(|i| {
            SetRequest::new(
                format!("{prefix}-{i:06}"),
                json!({"rank": (i * 7919) % LARGE, "tag": format!("t{}", i % 97)}),
            )
        })
        .collect()
}

fn sorted_scan() -> Query {
    Query::default()
        .sort_by("tag", SortOrder::Desc)
        .sort_by("rank", SortOrder::Asc)
}

#[test]
fn test_running_query_is_interrupted_at_deadline() {
    let store = ephemeral();
    store.bulk_set(&ctx(), &large_batch("row")).unwrap();

    let started = Instant::now();
    let err = store
        .query(&OpContext::with_timeout(Duration::from_millis(20)), &sorted_scan())
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded), "{err:?}");
    assert!(started.elapsed() < Duration::from_millis(500));

    // the connection is usable again afterwards
    let page = store.query(&ctx(), &Query::default().limit(1)).unwrap();
    assert_eq!(page.results.len(), 1);

    // cancelling mid-scan is reported as cancellation
    let token = CancelToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        })
    };
    let err = store
        .query(&OpContext::background().cancel_token(token), &sorted_scan())
        .unwrap_err();
    canceller.join().unwrap();
    assert!(matches!(err, Error::Cancelled), "{err:?}");
}

#[test]
fn test_interrupted_bulk_set_commits_nothing() {
    let store = ephemeral();
    store.set(&ctx(), &SetRequest::new("bystander", "kept")).unwrap();
    let batch = large_batch("batch");

    let err = store
        .bulk_set(&OpContext::with_timeout(Duration::from_millis(20)), &batch)
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded), "{err:?}");

    let page = store.query(&ctx(), &Query::default()).unwrap();
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].key, "bystander");
    assert!(store
        .get(&ctx(), &GetRequest::new("batch-000000"))
        .unwrap_err()
        .is_not_found());
}
