//! Property tests: whatever goes in comes back out

use crate::*;
use proptest::prelude::*;

fn json_leaf() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "\\PC{0,24}".prop_map(serde_json::Value::from),
    ]
}

fn json_value() -> impl Strategy<Value = serde_json::Value> {
    json_leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_json_values_round_trip(key in "\\PC{1,40}", value in json_value()) {
        let store = StateStore::ephemeral().unwrap();
        let etag = store.set(&ctx(), &SetRequest::new(key.clone(), value.clone())).unwrap();

        let item = store.get(&ctx(), &GetRequest::new(key)).unwrap();
        prop_assert_eq!(item.value, StateValue::from(value));
        prop_assert_eq!(item.etag, etag);
    }

    #[test]
    fn prop_binary_values_round_trip(
        key in "\\PC{1,40}",
        bytes in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let store = StateStore::ephemeral().unwrap();
        store.set(&ctx(), &SetRequest::new(key.clone(), bytes.clone())).unwrap();

        let item = store.get(&ctx(), &GetRequest::new(key)).unwrap();
        prop_assert!(item.value.is_binary());
        prop_assert_eq!(item.value.as_bytes(), Some(&bytes[..]));
    }

    #[test]
    fn prop_last_write_wins(values in prop::collection::vec(any::<i64>(), 1..8)) {
        let store = StateStore::ephemeral().unwrap();
        let mut etags = Vec::new();
        for v in &values {
            etags.push(store.set(&ctx(), &SetRequest::new("k", *v)).unwrap());
        }

        let item = store.get(&ctx(), &"k".into()).unwrap();
        prop_assert_eq!(item.value, StateValue::from(*values.last().unwrap()));
        let mut unique = etags.clone();
        unique.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        unique.dedup();
        prop_assert_eq!(unique.len(), etags.len());
    }
}
