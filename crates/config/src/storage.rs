//! Storage protocol configuration types

use ballotstore_core::{Error, Protocol, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConf {
    /// The protocol the client must use
    pub protocol: Protocol,
    /// Protocol-specific configuration, interpreted by the protocol constructor
    #[serde(default)]
    pub conf: serde_yaml::Value,
}

impl StorageConf {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            conf: serde_yaml::Value::Null,
        }
    }

    /// Attach protocol-specific configuration
    #[must_use]
    pub fn with_conf(mut self, conf: serde_yaml::Value) -> Self {
        self.conf = conf;
        self
    }

    /// Parse a storage configuration from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Read and parse a storage configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| Error::io(path, "read configuration", e))?;
        Self::from_yaml_str(&text).map_err(|e| {
            Error::configuration_with_source(
                format!("failed to parse '{}'", path.display()),
                e,
            )
        })
    }

    /// Deserialize the protocol-specific configuration into `T`.
    ///
    /// A missing configuration node is treated as an empty mapping so that
    /// types with defaulted fields can be used without any settings.
    pub fn protocol_conf<T: DeserializeOwned>(&self) -> Result<T> {
        decode_protocol_conf(&self.protocol, &self.conf)
    }
}

/// Deserialize a protocol configuration node, treating null as empty.
pub fn decode_protocol_conf<T: DeserializeOwned>(
    protocol: &Protocol,
    conf: &serde_yaml::Value,
) -> Result<T> {
    let node = match conf {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
        other => other.clone(),
    };
    serde_yaml::from_value(node).map_err(|e| {
        Error::configuration_with_source(format!("invalid {protocol} protocol configuration"), e)
    })
}

/// Service instance information that is not part of the protocol configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Services {
    /// Directory holding sensitive client material such as TLS credentials
    #[serde(default)]
    pub sensitive: PathBuf,
    /// Storage server addresses used by networked protocols
    #[serde(default)]
    pub servers: Vec<String>,
}

impl Services {
    pub fn new(sensitive: impl Into<PathBuf>, servers: Vec<String>) -> Self {
        Self {
            sensitive: sensitive.into(),
            servers,
        }
    }

    /// Paths of the client TLS certificate and private key
    pub fn tls_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.sensitive.join("tls.pem"),
            self.sensitive.join("tls.key"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        wd: String,
        #[serde(default)]
        timeout: u64,
    }

    #[test]
    fn test_parse_storage_conf() {
        let conf = StorageConf::from_yaml_str(
            "protocol: file\nconf:\n  wd: /var/lib/ballotstore\n",
        )
        .unwrap();

        assert_eq!(conf.protocol, Protocol::FILE);
        let sample: Sample = conf.protocol_conf().unwrap();
        assert_eq!(sample.wd, "/var/lib/ballotstore");
        assert_eq!(sample.timeout, 0);
    }

    #[test]
    fn test_missing_conf_is_empty_mapping() {
        let conf = StorageConf::from_yaml_str("protocol: memory\n").unwrap();
        assert!(conf.conf.is_null());

        let sample: Sample = conf.protocol_conf().unwrap();
        assert_eq!(
            sample,
            Sample {
                wd: String::new(),
                timeout: 0
            }
        );
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let err = StorageConf::from_yaml_str("protocol: memory\nextra: 1\n").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_wrong_protocol_conf_shape() {
        let conf = StorageConf::new(Protocol::ETCD).with_conf(serde_yaml::Value::from("nope"));
        let err = conf.protocol_conf::<Sample>().unwrap_err();
        assert!(err.to_string().contains("invalid etcd protocol configuration"));
    }

    #[test]
    fn test_tls_paths() {
        let services = Services::new("/etc/ballotstore/voting", vec![]);
        let (cert, key) = services.tls_paths();
        assert_eq!(cert, PathBuf::from("/etc/ballotstore/voting/tls.pem"));
        assert_eq!(key, PathBuf::from("/etc/ballotstore/voting/tls.key"));
    }
}
