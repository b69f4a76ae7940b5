//! Registry of storage protocol constructors

use crate::file::FileStore;
use crate::memory::MemoryStore;
use crate::protocol::PutGetter;
use ballotstore_config::{Services, StorageConf};
use ballotstore_core::{Error, Protocol, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructs a storage protocol from its configuration node
pub type Constructor =
    Arc<dyn Fn(&serde_yaml::Value, &Services) -> Result<Arc<dyn PutGetter>> + Send + Sync>;

/// Maps protocol identifiers to constructors.
///
/// Registries are plain values: build one at startup, register the protocols
/// the service may use and hand it to [`Client::new`](crate::Client::new).
#[derive(Clone, Default)]
pub struct Registry {
    constructors: HashMap<Protocol, Constructor>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every protocol compiled into this crate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Protocol::MEMORY, |conf, _| {
            Ok(Arc::new(MemoryStore::from_conf(conf)?))
        });
        registry.register(Protocol::FILE, |conf, _| {
            Ok(Arc::new(FileStore::from_conf(conf)?))
        });
        #[cfg(feature = "etcd")]
        registry.register(Protocol::ETCD, |conf, services| {
            Ok(Arc::new(crate::etcd::EtcdStore::from_conf(conf, services)?))
        });
        registry
    }

    /// Register `constructor` for `protocol`, replacing any previous one.
    pub fn register<F>(&mut self, protocol: Protocol, constructor: F) -> &mut Self
    where
        F: Fn(&serde_yaml::Value, &Services) -> Result<Arc<dyn PutGetter>> + Send + Sync + 'static,
    {
        if self
            .constructors
            .insert(protocol.clone(), Arc::new(constructor))
            .is_some()
        {
            tracing::warn!(%protocol, "replacing registered storage protocol");
        }
        self
    }

    pub fn is_registered(&self, protocol: &Protocol) -> bool {
        self.constructors.contains_key(protocol)
    }

    /// Registered protocols, sorted by name
    pub fn protocols(&self) -> Vec<Protocol> {
        let mut protocols: Vec<_> = self.constructors.keys().cloned().collect();
        protocols.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        protocols
    }

    /// Construct the protocol selected by `conf`.
    pub fn build(&self, conf: &StorageConf, services: &Services) -> Result<Arc<dyn PutGetter>> {
        let constructor = self.constructors.get(&conf.protocol).ok_or_else(|| {
            Error::UnknownProtocol {
                protocol: conf.protocol.to_string(),
            }
        })?;

        tracing::debug!(protocol = %conf.protocol, "constructing storage protocol");
        constructor(&conf.conf, services).map_err(|e| {
            Error::configuration_with_source(
                format!("failed to construct {} storage protocol", conf.protocol),
                e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotstore_core::Context;

    #[test]
    fn test_defaults() {
        let registry = Registry::with_defaults();
        assert!(registry.is_registered(&Protocol::MEMORY));
        assert!(registry.is_registered(&Protocol::FILE));
        assert!(!registry.is_registered(&Protocol::new("redis")));
        #[cfg(feature = "etcd")]
        assert_eq!(
            registry.protocols(),
            vec![Protocol::ETCD, Protocol::FILE, Protocol::MEMORY]
        );
    }

    #[test]
    fn test_unknown_protocol() {
        let err = Registry::new()
            .build(&StorageConf::new(Protocol::MEMORY), &Services::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProtocol { ref protocol } if protocol == "memory"));
    }

    #[test]
    fn test_constructor_error_is_configuration_error() {
        let err = Registry::with_defaults()
            .build(&StorageConf::new(Protocol::FILE), &Services::default())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("file"));
    }

    #[tokio::test]
    async fn test_custom_protocol() {
        let mut registry = Registry::new();
        registry.register(Protocol::new("seeded"), |_, _| {
            Ok(Arc::new(MemoryStore::with_entries([("/k", "v")])))
        });

        let store = registry
            .build(&StorageConf::new(Protocol::new("seeded")), &Services::default())
            .unwrap();
        assert_eq!(store.get(&Context::new(), "/k").await.unwrap(), b"v");
    }

    #[test]
    fn test_built_store_is_debug() {
        let store = Registry::with_defaults()
            .build(&StorageConf::new(Protocol::MEMORY), &Services::default())
            .unwrap();
        assert!(format!("{store:?}").contains("MemoryStore"));
    }
}
