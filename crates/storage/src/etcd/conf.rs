//! etcd protocol configuration and TLS material

use ballotstore_config::Services;
use ballotstore_core::{Error, Result};
use etcd_client::{Certificate, Identity, TlsOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Operation timeout used when none is configured
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection timeout used when none is configured
pub const DEFAULT_CONN_TIMEOUT: Duration = Duration::from_secs(5);

const PEM_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const PEM_PRIVATE_KEY: &str = "PRIVATE KEY-----";

/// etcd protocol configuration.
///
/// Timeouts are in seconds; zero selects the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtcdConf {
    /// PEM encoded CA certificate that issued the etcd TLS certificates
    #[serde(default)]
    pub ca: String,

    /// Timeout for connecting to the etcd endpoints
    #[serde(default, rename = "conntimeout", alias = "conn_timeout")]
    pub conn_timeout: u64,

    /// Timeout for a single operation
    #[serde(default, rename = "optimeout", alias = "op_timeout")]
    pub op_timeout: u64,

    /// IDs of the servers that bootstrap the cluster. Only used by the
    /// storage servers themselves; clients ignore it.
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

impl EtcdConf {
    pub fn op_timeout(&self) -> Duration {
        seconds_or(self.op_timeout, DEFAULT_OP_TIMEOUT)
    }

    pub fn conn_timeout(&self) -> Duration {
        seconds_or(self.conn_timeout, DEFAULT_CONN_TIMEOUT)
    }

    /// Build the mutual TLS options: the configured CA verifies the servers
    /// and the client presents the certificate and key from the sensitive
    /// service directory.
    pub fn tls_options(&self, services: &Services) -> Result<TlsOptions> {
        if self.ca.trim().is_empty() {
            return Err(Error::configuration("etcd protocol requires a CA certificate"));
        }
        require_pem("CA certificate", self.ca.as_bytes(), PEM_CERTIFICATE)?;

        let (cert_path, key_path) = services.tls_paths();
        let cert = read_pem(&cert_path, "read TLS certificate", PEM_CERTIFICATE)?;
        let key = read_pem(&key_path, "read TLS key", PEM_PRIVATE_KEY)?;

        Ok(TlsOptions::new()
            .ca_certificate(Certificate::from_pem(self.ca.as_bytes()))
            .identity(Identity::from_pem(cert, key)))
    }
}

fn seconds_or(seconds: u64, default: Duration) -> Duration {
    match seconds {
        0 => default,
        n => Duration::from_secs(n),
    }
}

fn read_pem(path: &Path, operation: &'static str, marker: &str) -> Result<Vec<u8>> {
    let data = std::fs::read(path).map_err(|e| Error::io(path, operation, e))?;
    require_pem(&path.display().to_string(), &data, marker)?;
    Ok(data)
}

fn require_pem(what: &str, data: &[u8], marker: &str) -> Result<()> {
    let text = String::from_utf8_lossy(data);
    if !text.contains(marker) {
        return Err(Error::configuration(format!(
            "{what} is not PEM encoded (expected '{marker}')"
        )));
    }
    Ok(())
}
