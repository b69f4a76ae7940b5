//! Configuring a client end to end from a configuration file

use ballotstore_config::StorageConfLoader;
use ballotstore_storage::{Client, Context, Error, Protocol, Registry};
use std::collections::HashMap;
use tempfile::TempDir;

#[tokio::test]
async fn file_client_from_configuration_file() {
    ballotstore_utils::tracing::init_for_tests();
    let temp_dir = TempDir::new().unwrap();
    let wd = temp_dir.path().join("data");
    let path = temp_dir.path().join("storage.yaml");
    std::fs::write(
        &path,
        format!("protocol: file\nconf:\n  wd: {}\n", wd.display()),
    )
    .unwrap();

    let (conf, services) = StorageConfLoader::new().path(&path).load().unwrap();
    let client = Client::new(&Registry::with_defaults(), &conf, &services).unwrap();
    assert_eq!(client.protocol(), &Protocol::FILE);

    let ctx = Context::new();
    let voters: HashMap<String, Vec<u8>> = (0..50)
        .map(|i| (format!("{i}"), format!("district-{i}").into_bytes()))
        .collect();
    client.put_all(&ctx, "/voters/1/", &voters, false).await.unwrap();
    client.put_all(&ctx, "/voters/1/", &voters, true).await.unwrap();

    let got = client
        .get_all_strict(&ctx, &["/voters/1/0", "/voters/1/49"])
        .await
        .unwrap();
    assert_eq!(got["/voters/1/49"], b"district-49");
    assert!(wd.is_dir());
}

#[tokio::test]
async fn memory_client_seeded_from_configuration() {
    let conf = ballotstore_config::StorageConf::from_yaml_str(
        "protocol: memory\nconf:\n  /seq: \"0\"\n  /raw: base64(AAE=)\n",
    )
    .unwrap();
    let client = Client::new(&Registry::with_defaults(), &conf, &Default::default()).unwrap();
    let ctx = Context::new();

    assert_eq!(client.get(&ctx, "/raw").await.unwrap(), vec![0, 1]);
    client.put(&ctx, "/voters/x", b"x").await.unwrap();
    client
        .cas_and_get(&ctx, "/seq", b"0", b"1", &["/voters/x"])
        .await
        .unwrap();
    client.ensure(&ctx, "/voters/x", b"x").await.unwrap();
}

#[test]
fn unknown_protocol_is_rejected() {
    let conf = ballotstore_config::StorageConf::from_yaml_str("protocol: bolt\n").unwrap();
    let err = Client::new(&Registry::with_defaults(), &conf, &Default::default()).unwrap_err();
    assert!(matches!(err, Error::UnknownProtocol { ref protocol } if protocol == "bolt"));
}

#[cfg(feature = "etcd")]
#[test]
fn etcd_client_requires_servers() {
    let conf = ballotstore_config::StorageConf::from_yaml_str(
        "protocol: etcd\nconf:\n  ca: x\n  optimeout: 5\n",
    )
    .unwrap();
    let err = Client::new(&Registry::with_defaults(), &conf, &Default::default()).unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}
