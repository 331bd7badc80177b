//! Bulk reads, writes and deletes

use crate::*;

fn seed(store: &StateStore, n: usize) {
    let reqs: Vec<_> = (0..n)
        .map(|i| SetRequest::new(format!("key-{i}"), json!({"n": i})))
        .collect();
    store.bulk_set(&ctx(), &reqs).unwrap();
}

// =============================================================================
// BULK GET
// =============================================================================

#[test]
fn test_bulk_get_preserves_request_order() {
    let store = ephemeral();
    seed(&store, 5);

    let reqs = vec![
        GetRequest::new("key-3"),
        GetRequest::new("missing"),
        GetRequest::new("key-0"),
    ];
    let items = store.bulk_get(&ctx(), &reqs).unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].key, "key-3");
    assert_eq!(
        items[0].item.as_ref().map(|i| i.value.clone()),
        Some(StateValue::from(json!({"n": 3})))
    );
    assert_eq!(items[1].key, "missing");
    assert!(items[1].item.is_none());
    assert!(items[1].error.is_none());
    assert_eq!(items[2].key, "key-0");
    assert!(items[2].item.is_some());
}

#[test]
fn test_bulk_get_empty_request() {
    let store = ephemeral();
    assert!(store.bulk_get(&ctx(), &[]).unwrap().is_empty());
}

// =============================================================================
// BULK SET
// =============================================================================

#[test]
fn test_bulk_set_writes_all() {
    let store = ephemeral();
    seed(&store, 20);
    for i in 0..20 {
        let item = store.get(&ctx(), &GetRequest::new(format!("key-{i}"))).unwrap();
        assert_eq!(item.value, StateValue::from(json!({"n": i})));
    }
}

#[test]
fn test_bulk_set_failure_rolls_back_every_item() {
    let store = ephemeral();
    let etag = store.set(&ctx(), &SetRequest::new("b", "old-b")).unwrap();
    store.set(&ctx(), &SetRequest::new("b", "new-b")).unwrap();

    let err = store
        .bulk_set(
            &ctx(),
            &[
                SetRequest::new("a", "a"),
                SetRequest::new("b", "stale").with_etag(etag),
                SetRequest::new("c", "c"),
            ],
        )
        .unwrap_err();

    assert!(matches!(err, Error::ETagMismatch { ref key } if key == "b"));
    assert!(store.get(&ctx(), &"a".into()).unwrap_err().is_not_found());
    assert!(store.get(&ctx(), &"c".into()).unwrap_err().is_not_found());
    assert_eq!(store.get(&ctx(), &"b".into()).unwrap().value.as_str(), Some("new-b"));
}

// =============================================================================
// BULK DELETE
// =============================================================================

#[test]
fn test_bulk_delete_removes_all() {
    let store = ephemeral();
    seed(&store, 4);
    let reqs: Vec<_> = (0..4).map(|i| DeleteRequest::new(format!("key-{i}"))).collect();
    store.bulk_delete(&ctx(), &reqs).unwrap();

    let items = store
        .bulk_get(&ctx(), &(0..4).map(|i| GetRequest::new(format!("key-{i}"))).collect::<Vec<_>>())
        .unwrap();
    assert!(items.iter().all(|item| item.item.is_none()));
}

#[test]
fn test_bulk_delete_stale_etag_keeps_everything() {
    let store = ephemeral();
    seed(&store, 2);
    let stale = ETag::parse("not-the-etag").unwrap();

    let err = store
        .bulk_delete(
            &ctx(),
            &[
                DeleteRequest::new("key-0"),
                DeleteRequest::new("key-1").with_etag(stale),
            ],
        )
        .unwrap_err();
    assert!(err.is_etag_mismatch());
    assert!(store.get(&ctx(), &"key-0".into()).is_ok());
    assert!(store.get(&ctx(), &"key-1".into()).is_ok());
}
