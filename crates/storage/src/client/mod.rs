//! Storage client used by services
//!
//! [`Client`] resolves the configured protocol through a [`Registry`] and adds
//! helpers on top of the four protocol operations: idempotent puts and
//! bulk reads and writes that use [`Batcher`](crate::Batcher) when the
//! backend supports it.

mod batch;

use crate::protocol::PutGetter;
use crate::registry::Registry;
use ballotstore_config::{Services, StorageConf};
use ballotstore_core::{Context, Error, PrefixStream, Protocol, Result};
use ballotstore_utils::tracing::operation_span;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Handle to a storage protocol.
///
/// Cloning is cheap and shares the underlying protocol.
#[derive(Clone)]
pub struct Client {
    protocol: Protocol,
    store: Arc<dyn PutGetter>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Construct the protocol selected by `conf` from `registry`.
    pub fn new(registry: &Registry, conf: &StorageConf, services: &Services) -> Result<Self> {
        let store = registry.build(conf, services)?;
        tracing::info!(protocol = %conf.protocol, "storage client ready");
        Ok(Self::with_protocol(conf.protocol.clone(), store))
    }

    /// Wrap an already constructed protocol.
    pub fn with_protocol(protocol: Protocol, store: Arc<dyn PutGetter>) -> Self {
        Self { protocol, store }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// The underlying protocol
    pub fn store(&self) -> &Arc<dyn PutGetter> {
        &self.store
    }

    pub async fn put(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        self.store
            .put(ctx, key, value)
            .instrument(operation_span(self.protocol.as_str(), "put", key))
            .await
    }

    pub async fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        self.store
            .get(ctx, key)
            .instrument(operation_span(self.protocol.as_str(), "get", key))
            .await
    }

    pub async fn get_with_prefix(&self, ctx: &Context, prefix: &str) -> PrefixStream {
        self.store
            .get_with_prefix(ctx, prefix)
            .instrument(operation_span(self.protocol.as_str(), "get with prefix", prefix))
            .await
    }

    pub async fn cas_and_get(
        &self,
        ctx: &Context,
        cas: &str,
        old: &[u8],
        new: &[u8],
        keys: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>> {
        self.store
            .cas_and_get(ctx, cas, old, new, keys)
            .instrument(operation_span(self.protocol.as_str(), "cas and get", cas))
            .await
    }

    /// Store `value` under `key`, accepting an existing key that already
    /// holds exactly `value`.
    ///
    /// Fails with [`Error::EnsureMismatch`] if the key holds something else.
    pub async fn ensure(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        match self.put(ctx, key, value).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_exist() => {}
            Err(err) => return Err(err),
        }

        let existing = self.get(ctx, key).await?;
        if existing != value {
            return Err(Error::EnsureMismatch {
                key: key.to_string(),
                existing,
                new: value.to_vec(),
            });
        }
        tracing::debug!(key, "ensured key already stored");
        Ok(())
    }
}
