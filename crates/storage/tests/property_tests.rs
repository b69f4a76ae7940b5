//! Property tests over the storage protocols

use ballotstore_storage::Context;
use proptest::prelude::*;
use std::collections::BTreeMap;

mod common;
use common::backends;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn key() -> impl Strategy<Value = String> {
    "/[a-c]{1,3}/[a-z0-9]{1,6}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: stored values come back byte for byte
    #[test]
    fn values_round_trip(value in proptest::collection::vec(any::<u8>(), 0..512)) {
        runtime().block_on(async {
            for backend in backends() {
                let ctx = Context::new();
                backend.store.put(&ctx, "/value", &value).await.unwrap();
                let read = backend.store.get(&ctx, "/value").await.unwrap();
                assert_eq!(read, value, "{}", backend.name);
            }
        });
    }

    /// Property: a prefix scan returns exactly the stored entries with that prefix
    #[test]
    fn prefix_scan_matches_filter(
        entries in proptest::collection::btree_map(key(), "[a-z]{0,8}", 0..40),
        prefix in "/[a-c]{0,2}",
    ) {
        runtime().block_on(async {
            for backend in backends() {
                let ctx = Context::new();
                for (key, value) in &entries {
                    backend.store.put(&ctx, key, value.as_bytes()).await.unwrap();
                }

                let scanned: BTreeMap<String, Vec<u8>> = backend
                    .store
                    .get_with_prefix(&ctx, &prefix)
                    .await
                    .into_map()
                    .await
                    .unwrap()
                    .into_iter()
                    .collect();
                let expected: BTreeMap<String, Vec<u8>> = entries
                    .iter()
                    .filter(|(key, _)| key.starts_with(&prefix))
                    .map(|(key, value)| (key.clone(), value.clone().into_bytes()))
                    .collect();
                assert_eq!(scanned, expected, "{}", backend.name);
            }
        });
    }
}
