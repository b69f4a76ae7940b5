//! Core error type definitions

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed low-level cause wrapped by an [`Error`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Low-level cause that must be handed out to more than one caller
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Storage error type using thiserror
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key (or compare-and-swap key) has no prior successful write
    #[error("key '{key}' does not exist: {reason}")]
    NotExist {
        key: String,
        reason: &'static str,
        #[source]
        source: Option<BoxError>,
    },

    /// A put targeted a key that already has a value
    #[error("key '{key}' already exists: {reason}")]
    Exist {
        key: String,
        reason: &'static str,
        #[source]
        source: Option<BoxError>,
    },

    /// Compare-and-swap found a different value than expected
    #[error(
        "unexpected value for key '{key}': have {}, expected {}",
        printable(.have),
        printable(.expected)
    )]
    UnexpectedValue {
        key: String,
        have: Vec<u8>,
        expected: Vec<u8>,
    },

    /// Compare-and-swap matched but one of the keys to read is missing
    #[error("compare-and-swap of '{cas}' matched but key '{key}' does not exist")]
    MissingExtraKey { cas: String, key: String },

    /// An ensured key already exists with a different value
    #[error(
        "key '{key}' already exists with value {}, refusing to store {}",
        printable(.existing),
        printable(.new)
    )]
    EnsureMismatch {
        key: String,
        existing: Vec<u8>,
        new: Vec<u8>,
    },

    /// No constructor is registered for the configured protocol
    #[error("storage protocol '{protocol}' is not registered")]
    UnknownProtocol { protocol: String },

    /// Invalid or unusable configuration
    #[error("storage configuration error: {message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Establishing the connection to the storage servers failed
    #[error("failed to connect to storage servers {endpoints:?}: {source}")]
    Connection {
        endpoints: Vec<String>,
        #[source]
        source: SharedError,
    },

    /// The storage service rejected or failed an operation
    #[error("storage {operation} failed for '{key}': {source}")]
    Backend {
        operation: &'static str,
        key: String,
        #[source]
        source: BoxError,
    },

    /// File system operations
    #[error("file system {operation} failed for '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A stored name or configured value could not be decoded
    #[error("failed to decode {what} '{input}': {source}")]
    Decode {
        what: &'static str,
        input: String,
        #[source]
        source: base64::DecodeError,
    },

    /// The operation deadline passed
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// The caller cancelled the operation
    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },
}

/// Render stored bytes for error messages without assuming UTF-8.
fn printable(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => format!("{text:?}"),
        Err(_) => format!("{} bytes of binary data", bytes.len()),
    }
}
