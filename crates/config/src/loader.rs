//! Startup loader for the storage client configuration
//!
//! Resolves the configuration file location, parses it and pairs it with the
//! service instance information needed to construct a storage protocol.

use crate::storage::{Services, StorageConf};
use ballotstore_core::{Error, Result};
use std::path::PathBuf;

/// Environment variable naming the storage configuration file
pub const STORAGE_CONF_VAR: &str = "BALLOTSTORE_STORAGE_CONF";

/// Environment variable listing storage servers, separated by commas
pub const STORAGE_SERVERS_VAR: &str = "BALLOTSTORE_STORAGE_SERVERS";

/// Loads a [`StorageConf`] together with its [`Services`]
#[derive(Debug, Clone, Default)]
pub struct StorageConfLoader {
    path: Option<PathBuf>,
    services: Services,
    servers_from_env: bool,
}

impl StorageConfLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration file path (defaults to `$BALLOTSTORE_STORAGE_CONF`)
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the directory holding sensitive client material
    pub fn sensitive(mut self, dir: impl Into<PathBuf>) -> Self {
        self.services.sensitive = dir.into();
        self
    }

    /// Set the storage server addresses
    pub fn servers(mut self, servers: Vec<String>) -> Self {
        self.services.servers = servers;
        self
    }

    /// Append servers listed in `$BALLOTSTORE_STORAGE_SERVERS`
    pub fn servers_from_env(mut self, enabled: bool) -> Self {
        self.servers_from_env = enabled;
        self
    }

    /// Load the configuration
    pub fn load(self) -> Result<(StorageConf, Services)> {
        let path = match self.path {
            Some(path) => path,
            None => std::env::var_os(STORAGE_CONF_VAR)
                .map(PathBuf::from)
                .ok_or_else(|| {
                    Error::configuration(format!(
                        "no storage configuration path given and {STORAGE_CONF_VAR} is not set"
                    ))
                })?,
        };

        let conf = StorageConf::from_file(&path)?;
        let mut services = self.services;
        if self.servers_from_env {
            if let Ok(list) = std::env::var(STORAGE_SERVERS_VAR) {
                services.servers.extend(parse_servers(&list));
            }
        }

        tracing::debug!(
            path = %path.display(),
            protocol = %conf.protocol,
            servers = services.servers.len(),
            "loaded storage configuration"
        );
        Ok((conf, services))
    }
}

fn parse_servers(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotstore_core::Protocol;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("storage.yaml");
        std::fs::write(
            &path,
            "protocol: etcd\nconf:\n  ca: |\n    -----BEGIN CERTIFICATE-----\n  optimeout: 10\n",
        )
        .unwrap();

        let (conf, services) = StorageConfLoader::new()
            .path(&path)
            .sensitive("/srv/voting")
            .servers(vec!["https://10.0.0.1:2379".to_string()])
            .load()
            .unwrap();

        assert_eq!(conf.protocol, Protocol::ETCD);
        assert_eq!(services.sensitive, PathBuf::from("/srv/voting"));
        assert_eq!(services.servers, vec!["https://10.0.0.1:2379"]);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = StorageConfLoader::new()
            .path(temp_dir.path().join("absent.yaml"))
            .load()
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_parse_servers() {
        let servers: Vec<_> = parse_servers(" a:2379, ,b:2379,").collect();
        assert_eq!(servers, vec!["a:2379", "b:2379"]);
    }
}
