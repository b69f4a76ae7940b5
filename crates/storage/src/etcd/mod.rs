//! etcd v3 storage protocol, the production backend
//!
//! Every mutation is a single etcd transaction, so the existence and
//! compare-and-swap guarantees of [`PutGetter`] are linearizable across all
//! clients of the cluster. The client connects lazily on first use over
//! mutually authenticated TLS. A failed connection attempt is remembered and
//! returned by every later operation; there is no reconnect loop and no
//! operation is retried.

mod conf;
mod paging;
mod range;

pub use conf::{EtcdConf, DEFAULT_CONN_TIMEOUT, DEFAULT_OP_TIMEOUT};
pub use range::{next_key, prefix_bounds, prefix_range_end, BLOCK_SIZE};

use crate::protocol::{check_distinct, Batcher, PutGetter};
use async_trait::async_trait;
use ballotstore_config::Services;
use ballotstore_core::errors::SharedError;
use ballotstore_core::{Context, Entry, EntrySender, Error, PrefixStream, Protocol, Result};
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, GetOptions, KvClient, TlsOptions, Txn, TxnOp,
    TxnOpResponse, TxnResponse,
};
use paging::{scan_blocks, Block, BlockReader};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Maximum number of operations in one transaction
pub const BATCH_SIZE: usize = 128;

const SCAN: &str = "get with prefix";

/// Storage protocol backed by an etcd cluster.
#[derive(Clone)]
pub struct EtcdStore {
    inner: Arc<Inner>,
}

struct Inner {
    endpoints: Vec<String>,
    tls: TlsOptions,
    conn_timeout: Duration,
    op_timeout: Duration,
    client: OnceCell<std::result::Result<KvClient, SharedError>>,
}

impl std::fmt::Debug for EtcdStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdStore")
            .field("endpoints", &self.inner.endpoints)
            .field("conn_timeout", &self.inner.conn_timeout)
            .field("op_timeout", &self.inner.op_timeout)
            .field("connected", &self.inner.client.initialized())
            .finish()
    }
}

impl EtcdStore {
    /// Prepare a client for the servers in `services`. No connection is made
    /// until the first operation.
    pub fn new(conf: &EtcdConf, services: &Services) -> Result<Self> {
        if services.servers.is_empty() {
            return Err(Error::configuration("etcd protocol requires storage servers"));
        }
        let tls = conf.tls_options(services)?;

        Ok(Self {
            inner: Arc::new(Inner {
                endpoints: services.servers.clone(),
                tls,
                conn_timeout: conf.conn_timeout(),
                op_timeout: conf.op_timeout(),
                client: OnceCell::new(),
            }),
        })
    }

    /// Create a store from the protocol configuration node
    pub fn from_conf(conf: &serde_yaml::Value, services: &Services) -> Result<Self> {
        let conf: EtcdConf =
            ballotstore_config::storage::decode_protocol_conf(&Protocol::ETCD, conf)?;
        Self::new(&conf, services)
    }

    pub fn endpoints(&self) -> &[String] {
        &self.inner.endpoints
    }

    pub fn op_timeout(&self) -> Duration {
        self.inner.op_timeout
    }

    async fn connect(&self) -> std::result::Result<KvClient, SharedError> {
        let inner = &self.inner;
        let options = ConnectOptions::new()
            .with_connect_timeout(inner.conn_timeout)
            .with_timeout(inner.op_timeout)
            .with_tls(inner.tls.clone());

        let connecting = Client::connect(inner.endpoints.clone(), Some(options));
        match tokio::time::timeout(inner.conn_timeout, connecting).await {
            Ok(Ok(client)) => {
                tracing::info!(endpoints = ?inner.endpoints, "connected to etcd");
                Ok(client.kv_client())
            }
            Ok(Err(e)) => {
                let source: SharedError = Arc::new(e);
                Err(source)
            }
            Err(elapsed) => {
                let source: SharedError = Arc::new(elapsed);
                Err(source)
            }
        }
    }

    /// The KV client, connecting on first use.
    async fn kv(&self) -> Result<KvClient> {
        match self.inner.client.get_or_init(|| self.connect()).await {
            Ok(kv) => Ok(kv.clone()),
            Err(source) => Err(Error::Connection {
                endpoints: self.inner.endpoints.clone(),
                source: source.clone(),
            }),
        }
    }

    /// Commit `txn` under the per-operation timeout.
    async fn txn(
        &self,
        ctx: &Context,
        operation: &'static str,
        key: &str,
        txn: Txn,
    ) -> Result<TxnResponse> {
        let mut kv = ctx.run(operation, self.kv()).await?;
        let op_ctx = ctx.with_timeout(self.inner.op_timeout);
        op_ctx
            .run(operation, async move {
                kv.txn(txn)
                    .await
                    .map_err(|e| Error::backend(operation, key, e))
            })
            .await
    }

    /// Put `entries` if none of their keys exist yet.
    async fn put_new(&self, ctx: &Context, operation: &'static str, entries: &[Entry]) -> Result<()> {
        let first = entries.first().map(|e| e.key.as_str()).unwrap_or_default();
        tracing::debug!(key = first, count = entries.len(), "{operation} request");

        let txn = Txn::new()
            .when(
                entries
                    .iter()
                    .map(|e| Compare::version(e.key.as_str(), CompareOp::Equal, 0))
                    .collect::<Vec<_>>(),
            )
            .and_then(
                entries
                    .iter()
                    .map(|e| TxnOp::put(e.key.as_str(), e.value.clone(), None))
                    .collect::<Vec<_>>(),
            )
            .or_else(
                entries
                    .iter()
                    .map(|e| TxnOp::get(e.key.as_str(), Some(GetOptions::new().with_keys_only())))
                    .collect::<Vec<_>>(),
            );

        let resp = self
            .txn(ctx, operation, first, txn)
            .await
            .map_err(escalate)?;
        tracing::debug!(succeeded = resp.succeeded(), "{operation} response");

        if resp.succeeded() {
            return Ok(());
        }
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        Err(put_failure(&keys, &range_values(&resp.op_responses())))
    }
}

/// Mark infrastructure failures for alerting. Caller cancellation and the
/// expected protocol outcomes are returned as they are.
fn escalate(err: Error) -> Error {
    if err.is_fatal() && !matches!(err, Error::Cancelled { .. }) {
        err.alert()
    } else {
        err
    }
}

/// The first value read by each operation of a transaction branch. Empty
/// ranges and operations other than reads give `None`.
fn range_values(responses: &[TxnOpResponse]) -> Vec<Option<Vec<u8>>> {
    responses
        .iter()
        .map(|resp| match resp {
            TxnOpResponse::Get(get) => get.kvs().first().map(|kv| kv.value().to_vec()),
            _ => None,
        })
        .collect()
}

fn key_string(key: &[u8]) -> String {
    String::from_utf8_lossy(key).into_owned()
}

fn entry(key: &[u8], value: &[u8]) -> Result<Entry> {
    let key = String::from_utf8(key.to_vec())
        .map_err(|e| Error::backend("decode key", key_string(key), e))?;
    Ok(Entry::new(key, value))
}

/// Name the key that made a create-only transaction fail.
///
/// `found` holds the keys-only reads of the failure branch, aligned with
/// `keys`.
fn put_failure(keys: &[&str], found: &[Option<Vec<u8>>]) -> Error {
    let existing = keys
        .iter()
        .zip(found)
        .find(|(_, value)| value.is_some())
        .map(|(key, _)| *key)
        .or_else(|| keys.first().copied())
        .unwrap_or_default();
    Error::exist(existing, "put existing key")
}

/// Operations of a committed compare-and-swap: the extra keys are read
/// before the swap, so listing `cas` among them yields its old value.
fn cas_then_ops(cas: &str, new: &[u8], keys: &[&str]) -> Vec<TxnOp> {
    let mut ops: Vec<TxnOp> = keys.iter().map(|key| TxnOp::get(*key, None)).collect();
    ops.push(TxnOp::put(cas, new, None));
    ops
}

/// Values of the extra keys read by a committed compare-and-swap.
fn cas_values(
    cas: &str,
    keys: &[&str],
    values: Vec<Option<Vec<u8>>>,
) -> Result<HashMap<String, Vec<u8>>> {
    let mut values = values.into_iter();
    keys.iter()
        .map(|key| match values.next().flatten() {
            Some(value) => Ok(((*key).to_string(), value)),
            None => Err(Error::missing_extra_key(cas, *key).alert()),
        })
        .collect()
}

/// Explain a compare-and-swap that did not commit from the reads of its
/// failure branch: the compare-and-swap key first, then the extra keys.
fn cas_rejection(cas: &str, old: &[u8], keys: &[&str], values: &[Option<Vec<u8>>]) -> Error {
    let have = values.first().and_then(Option::as_deref);
    let missing = keys
        .iter()
        .enumerate()
        .find(|(i, _)| values.get(i + 1).map_or(true, Option::is_none))
        .map(|(_, key)| *key);
    cas_failure(cas, old, have, missing)
}

/// Explain why a compare-and-swap transaction did not commit.
///
/// `have` is the current value of the compare-and-swap key and `missing` the
/// first extra key found absent, both read in the failure branch.
fn cas_failure(cas: &str, old: &[u8], have: Option<&[u8]>, missing: Option<&str>) -> Error {
    match (have, missing) {
        (None, _) => Error::not_exist(cas, "compare-and-swap key missing"),
        (Some(have), _) if have != old => Error::unexpected_value(cas, have, old),
        (Some(_), Some(key)) => Error::missing_extra_key(cas, key).alert(),
        (Some(_), None) => Error::backend(
            "cas and get",
            cas,
            "transaction failed although all comparisons hold",
        )
        .alert(),
    }
}

/// Range reads for one prefix scan, each under the per-operation timeout
struct RangeReader {
    kv: KvClient,
    ctx: Context,
    op_timeout: Duration,
}

#[async_trait]
impl BlockReader for RangeReader {
    async fn read_block(&mut self, from: &[u8], end: &[u8], limit: usize) -> Result<Block> {
        let options = GetOptions::new()
            .with_range(end.to_vec())
            .with_limit(i64::try_from(limit).unwrap_or(i64::MAX));
        let op_ctx = self.ctx.with_timeout(self.op_timeout);
        let kv = &mut self.kv;
        let resp = op_ctx
            .run(SCAN, async move {
                kv.get(from.to_vec(), Some(options))
                    .await
                    .map_err(|e| Error::backend(SCAN, key_string(from), e))
            })
            .await?;

        Ok(Block {
            more: resp.more(),
            kvs: resp
                .kvs()
                .iter()
                .map(|kv| (kv.key().to_vec(), kv.value().to_vec()))
                .collect(),
        })
    }
}

async fn scan(store: EtcdStore, prefix: String, tx: EntrySender) -> Result<()> {
    let kv = tx.context().run(SCAN, store.kv()).await?;
    let mut reader = RangeReader {
        kv,
        ctx: tx.context().clone(),
        op_timeout: store.op_timeout(),
    };
    let total = scan_blocks(&mut reader, &prefix, BLOCK_SIZE, &tx).await?;
    tracing::debug!(prefix = %prefix, total, "prefix scan finished");
    Ok(())
}

#[async_trait]
impl PutGetter for EtcdStore {
    async fn put(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        self.put_new(ctx, "put", &[Entry::new(key, value)]).await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        tracing::debug!(key, "get request");
        let mut kv = ctx.run("get", self.kv()).await.map_err(escalate)?;
        let op_ctx = ctx.with_timeout(self.inner.op_timeout);
        let resp = op_ctx
            .run("get", async move {
                kv.get(key, None)
                    .await
                    .map_err(|e| Error::backend("get", key, e))
            })
            .await
            .map_err(escalate)?;

        match resp.kvs().first() {
            Some(kv) => Ok(kv.value().to_vec()),
            None => Err(Error::not_exist(key, "get missing key")),
        }
    }

    async fn get_with_prefix(&self, ctx: &Context, prefix: &str) -> PrefixStream {
        if let Err(err) = ctx.check(SCAN) {
            return PrefixStream::failed(err);
        }
        tracing::debug!(prefix, "get with prefix request");
        let store = self.clone();
        let prefix = prefix.to_string();
        PrefixStream::spawn(ctx, move |tx| async move {
            scan(store, prefix, tx).await.map_err(escalate)
        })
    }

    async fn cas_and_get(
        &self,
        ctx: &Context,
        cas: &str,
        old: &[u8],
        new: &[u8],
        keys: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>> {
        tracing::debug!(cas, extra = keys.len(), "cas and get request");

        let mut when = Vec::with_capacity(keys.len() + 1);
        when.push(Compare::value(cas, CompareOp::Equal, old));
        when.extend(
            keys.iter()
                .map(|key| Compare::version(*key, CompareOp::Greater, 0)),
        );

        let mut otherwise = Vec::with_capacity(keys.len() + 1);
        otherwise.push(TxnOp::get(cas, None));
        otherwise.extend(
            keys.iter()
                .map(|key| TxnOp::get(*key, Some(GetOptions::new().with_keys_only()))),
        );

        let txn = Txn::new()
            .when(when)
            .and_then(cas_then_ops(cas, new, keys))
            .or_else(otherwise);
        let resp = self
            .txn(ctx, "cas and get", cas, txn)
            .await
            .map_err(escalate)?;
        tracing::debug!(succeeded = resp.succeeded(), "cas and get response");

        let values = range_values(&resp.op_responses());
        if !resp.succeeded() {
            return Err(cas_rejection(cas, old, keys, &values));
        }
        cas_values(cas, keys, values)
    }

    fn as_batcher(&self) -> Option<&dyn Batcher> {
        Some(self)
    }
}

#[async_trait]
impl Batcher for EtcdStore {
    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    async fn get_all(&self, ctx: &Context, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        check_batch("get all", keys.len())?;
        tracing::debug!(count = keys.len(), "get all request");

        let txn = Txn::new().and_then(
            keys.iter()
                .map(|key| TxnOp::get(*key, None))
                .collect::<Vec<_>>(),
        );
        let first = keys.first().copied().unwrap_or_default();
        let resp = self
            .txn(ctx, "get all", first, txn)
            .await
            .map_err(escalate)?;

        let values = range_values(&resp.op_responses());
        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| ((*key).to_string(), value)))
            .collect())
    }

    async fn put_all(&self, ctx: &Context, entries: &[Entry]) -> Result<()> {
        check_batch("put all", entries.len())?;
        check_distinct("put all", entries)?;
        if entries.is_empty() {
            return Ok(());
        }
        self.put_new(ctx, "put all", entries).await
    }
}

fn check_batch(operation: &'static str, len: usize) -> Result<()> {
    if len > BATCH_SIZE {
        return Err(Error::backend(
            operation,
            "",
            format!("batch of {len} exceeds the etcd transaction limit of {BATCH_SIZE}"),
        ));
    }
    Ok(())
}
