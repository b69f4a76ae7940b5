//! Behavior every storage protocol must share

use ballotstore_storage::{Context, Error, ErrorKind};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::time::Duration;

mod common;
use common::backends;

#[tokio::test]
async fn get_of_never_put_key_is_not_exist() {
    for backend in backends() {
        let err = backend.store.get(&Context::new(), "/never").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotExist, "{}", backend.name);
    }
}

#[tokio::test]
async fn put_succeeds_once() {
    for backend in backends() {
        let ctx = Context::new();
        backend.store.put(&ctx, "/k", b"first").await.unwrap();

        let err = backend.store.put(&ctx, "/k", b"second").await.unwrap_err();
        assert!(err.is_exist(), "{}: {err}", backend.name);
        assert_eq!(backend.store.get(&ctx, "/k").await.unwrap(), b"first");
    }
}

#[tokio::test]
async fn binary_and_empty_values_round_trip() {
    let binary: Vec<u8> = (0..=255).collect();
    for backend in backends() {
        let ctx = Context::new();
        backend.store.put(&ctx, "/bin", &binary).await.unwrap();
        backend.store.put(&ctx, "/empty", b"").await.unwrap();

        assert_eq!(backend.store.get(&ctx, "/bin").await.unwrap(), binary);
        assert!(backend.store.get(&ctx, "/empty").await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn prefix_scan_returns_matching_entries() {
    for backend in backends() {
        let ctx = Context::new();
        for (key, value) in [("/a/1", "x"), ("/a/2", "y"), ("/b/1", "z")] {
            backend.store.put(&ctx, key, value.as_bytes()).await.unwrap();
        }

        let a: BTreeMap<_, _> = backend
            .store
            .get_with_prefix(&ctx, "/a/")
            .await
            .into_map()
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            a,
            BTreeMap::from([
                ("/a/1".to_string(), b"x".to_vec()),
                ("/a/2".to_string(), b"y".to_vec()),
            ]),
            "{}",
            backend.name
        );

        let all = backend
            .store
            .get_with_prefix(&ctx, "/")
            .await
            .into_map()
            .await
            .unwrap();
        assert_eq!(all.len(), 3, "{}", backend.name);

        let none = backend
            .store
            .get_with_prefix(&ctx, "/c/")
            .await
            .into_map()
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}

#[tokio::test]
async fn cas_and_get_swaps_when_value_matches() {
    for backend in backends() {
        let ctx = Context::new();
        backend.store.put(&ctx, "/seq", b"0").await.unwrap();
        backend.store.put(&ctx, "/voters/x", b"1,2").await.unwrap();

        let values = backend
            .store
            .cas_and_get(&ctx, "/seq", b"0", b"1", &["/voters/x"])
            .await
            .unwrap();
        assert_eq!(values["/voters/x"], b"1,2");
        assert_eq!(backend.store.get(&ctx, "/seq").await.unwrap(), b"1");
    }
}

#[tokio::test]
async fn cas_and_get_reads_extra_keys_before_the_swap() {
    for backend in backends() {
        let ctx = Context::new();
        backend.store.put(&ctx, "/seq", b"0").await.unwrap();

        let values = backend
            .store
            .cas_and_get(&ctx, "/seq", b"0", b"1", &["/seq"])
            .await
            .unwrap();
        assert_eq!(values["/seq"], b"0", "{}", backend.name);
        assert_eq!(backend.store.get(&ctx, "/seq").await.unwrap(), b"1");
    }
}

#[tokio::test]
async fn cas_and_get_never_mutates_on_mismatch() {
    for backend in backends() {
        let ctx = Context::new();

        let err = backend
            .store
            .cas_and_get(&ctx, "/seq", b"wrong", b"1", &[])
            .await
            .unwrap_err();
        assert!(err.is_not_exist(), "{}: {err}", backend.name);

        backend.store.put(&ctx, "/seq", b"0").await.unwrap();
        let err = backend
            .store
            .cas_and_get(&ctx, "/seq", b"wrong", b"1", &[])
            .await
            .unwrap_err();
        assert!(err.is_unexpected_value(), "{}: {err}", backend.name);
        assert_eq!(backend.store.get(&ctx, "/seq").await.unwrap(), b"0");
    }
}

#[tokio::test]
async fn cas_and_get_missing_extra_key_is_fatal() {
    for backend in backends() {
        let ctx = Context::new();
        backend.store.put(&ctx, "/seq", b"0").await.unwrap();

        let err = backend
            .store
            .cas_and_get(&ctx, "/seq", b"0", b"1", &["/voters/x"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingExtraKey { .. }), "{}", backend.name);
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(backend.store.get(&ctx, "/seq").await.unwrap(), b"0");
    }
}

#[tokio::test]
async fn cancelling_mid_scan_ends_stream() {
    for backend in backends() {
        let setup = Context::new();
        for i in 0..500 {
            backend
                .store
                .put(&setup, &format!("/scan/{i:04}"), b"v")
                .await
                .unwrap();
        }

        let ctx = Context::new();
        let mut stream = backend.store.get_with_prefix(&ctx, "/scan/").await;
        assert!(stream.next().await.unwrap().is_ok());
        ctx.cancel();

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            let mut received = 1;
            let mut terminal = None;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(_) => received += 1,
                    Err(err) => terminal = Some(err),
                }
            }
            (received, terminal)
        })
        .await
        .expect("stream should end promptly after cancellation");

        let (received, terminal) = drained;
        assert!(received < 500, "{}", backend.name);
        assert!(
            matches!(terminal, Some(Error::Cancelled { .. })),
            "{}: {terminal:?}",
            backend.name
        );
    }
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_aborts_operations() {
    for backend in backends() {
        let ctx = Context::new().with_timeout(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        let err = backend.store.put(&ctx, "/late", b"x").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "{}: {err}", backend.name);
        assert!(backend
            .store
            .get(&Context::new(), "/late")
            .await
            .unwrap_err()
            .is_not_exist());
    }
}
