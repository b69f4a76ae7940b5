//! In-memory storage protocol, used for testing
//!
//! The initial contents can be given directly or through the protocol
//! configuration: a mapping of keys to string values. A value wrapped as
//! `base64(...)` is Base64 decoded, so raw bytes can be seeded from a text
//! configuration:
//!
//! ```yaml
//! /some/string/value: foobar
//! /some/byte/value:   base64(Zm9vYmFy)
//! ```

use crate::protocol::{check_distinct, Batcher, PutGetter};
use async_trait::async_trait;
use ballotstore_core::{Context, Entry, EntrySender, Error, PrefixStream, Protocol, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Maximum number of operations per batch
pub const BATCH_SIZE: usize = 128;

type Db = HashMap<String, Vec<u8>>;

/// Storage protocol keeping everything in a single locked map.
///
/// `get_with_prefix` holds the lock until its scan ends, blocking every other
/// operation on the store until the stream is drained, dropped or cancelled.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    db: Arc<Mutex<Db>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the provided initial contents
    pub fn with_entries<K, V>(initial: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let db = initial
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Create a store seeded from the protocol configuration node
    pub fn from_conf(conf: &serde_yaml::Value) -> Result<Self> {
        let seed: HashMap<String, String> =
            ballotstore_config::storage::decode_protocol_conf(&Protocol::MEMORY, conf)?;

        let mut db = Db::with_capacity(seed.len());
        for (key, value) in seed {
            let decoded = decode_value(&value).map_err(|source| Error::Decode {
                what: "seed value",
                input: key.clone(),
                source,
            })?;
            db.insert(key, decoded);
        }
        tracing::debug!(keys = db.len(), "seeded memory storage");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    async fn lock(&self, ctx: &Context, operation: &'static str) -> Result<OwnedMutexGuard<Db>> {
        let db = self.db.clone();
        ctx.run(operation, async move { Ok::<_, Error>(db.lock_owned().await) })
            .await
    }
}

/// Decode `base64(...)` wrapped values, returning others unmodified.
fn decode_value(value: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    const PREFIX: &str = "base64(";
    const SUFFIX: &str = ")";

    let trimmed = value.trim();
    match trimmed
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_suffix(SUFFIX))
    {
        Some(encoded) => STANDARD.decode(encoded),
        None => Ok(value.as_bytes().to_vec()),
    }
}

async fn scan(db: OwnedMutexGuard<Db>, prefix: String, tx: EntrySender) -> Result<()> {
    for (key, value) in db.iter().filter(|(key, _)| key.starts_with(&prefix)) {
        tx.send(Entry::new(key.clone(), value.clone())).await?;
    }
    Ok(())
}

#[async_trait]
impl PutGetter for MemoryStore {
    async fn put(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        let mut db = self.lock(ctx, "put").await?;
        if db.contains_key(key) {
            return Err(Error::exist(key, "put existing key"));
        }
        db.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        let db = self.lock(ctx, "get").await?;
        db.get(key)
            .cloned()
            .ok_or_else(|| Error::not_exist(key, "get missing key"))
    }

    async fn get_with_prefix(&self, ctx: &Context, prefix: &str) -> PrefixStream {
        let db = match self.lock(ctx, "get with prefix").await {
            Ok(db) => db,
            Err(err) => return PrefixStream::failed(err),
        };
        let prefix = prefix.to_string();
        PrefixStream::spawn(ctx, move |tx| scan(db, prefix, tx))
    }

    async fn cas_and_get(
        &self,
        ctx: &Context,
        cas: &str,
        old: &[u8],
        new: &[u8],
        keys: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let mut db = self.lock(ctx, "cas and get").await?;

        match db.get(cas) {
            None => return Err(Error::not_exist(cas, "compare-and-swap key missing")),
            Some(have) if have.as_slice() != old => {
                return Err(Error::unexpected_value(cas, have.clone(), old));
            }
            Some(_) => {}
        }

        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            match db.get(*key) {
                Some(value) => {
                    values.insert((*key).to_string(), value.clone());
                }
                None => return Err(Error::missing_extra_key(cas, *key).alert()),
            }
        }

        db.insert(cas.to_string(), new.to_vec());
        Ok(values)
    }

    fn as_batcher(&self) -> Option<&dyn Batcher> {
        Some(self)
    }
}

#[async_trait]
impl Batcher for MemoryStore {
    fn batch_size(&self) -> usize {
        BATCH_SIZE
    }

    async fn get_all(&self, ctx: &Context, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        check_batch("get all", keys.len())?;
        let db = self.lock(ctx, "get all").await?;
        Ok(keys
            .iter()
            .filter_map(|key| db.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    async fn put_all(&self, ctx: &Context, entries: &[Entry]) -> Result<()> {
        check_batch("put all", entries.len())?;
        check_distinct("put all", entries)?;
        let mut db = self.lock(ctx, "put all").await?;

        if let Some(entry) = entries.iter().find(|entry| db.contains_key(&entry.key)) {
            return Err(Error::exist(entry.key.clone(), "put all existing key"));
        }
        for entry in entries {
            db.insert(entry.key.clone(), entry.value.clone());
        }
        Ok(())
    }
}

fn check_batch(operation: &'static str, len: usize) -> Result<()> {
    if len > BATCH_SIZE {
        return Err(Error::backend(
            operation,
            "",
            format!("batch of {len} exceeds the limit of {BATCH_SIZE}"),
        ));
    }
    Ok(())
}
