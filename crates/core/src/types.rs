//! Stored entries and protocol identifiers

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A single stored key-value pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Identifies a storage protocol implementation in the backend registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protocol(Cow<'static, str>);

impl Protocol {
    /// In-process map, for tests
    pub const MEMORY: Protocol = Protocol(Cow::Borrowed("memory"));
    /// One file per key in a local directory, for development
    pub const FILE: Protocol = Protocol(Cow::Borrowed("file"));
    /// etcd v3 cluster, for production
    pub const ETCD: Protocol = Protocol(Cow::Borrowed("etcd"));

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Protocol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_equality_ignores_ownership() {
        assert_eq!(Protocol::from("etcd"), Protocol::ETCD);
        assert_ne!(Protocol::from("Etcd"), Protocol::ETCD);
    }

    #[test]
    fn test_protocol_deserializes_from_plain_string() {
        let protocol: Protocol = serde_yaml::from_str("file").unwrap();
        assert_eq!(protocol, Protocol::FILE);
        assert_eq!(protocol.to_string(), "file");
    }
}
