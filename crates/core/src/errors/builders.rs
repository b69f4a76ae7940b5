//! Builder methods for creating errors with context

use super::types::{BoxError, Error};
use std::path::PathBuf;
use std::time::Duration;

impl Error {
    /// Create a not-exist error
    #[must_use]
    pub fn not_exist(key: impl Into<String>, reason: &'static str) -> Self {
        Error::NotExist {
            key: key.into(),
            reason,
            source: None,
        }
    }

    /// Create a not-exist error wrapping the backend-specific cause
    #[must_use]
    pub fn not_exist_with_source(
        key: impl Into<String>,
        reason: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::NotExist {
            key: key.into(),
            reason,
            source: Some(source.into()),
        }
    }

    /// Create an already-exists error
    #[must_use]
    pub fn exist(key: impl Into<String>, reason: &'static str) -> Self {
        Error::Exist {
            key: key.into(),
            reason,
            source: None,
        }
    }

    /// Create an already-exists error wrapping the backend-specific cause
    #[must_use]
    pub fn exist_with_source(
        key: impl Into<String>,
        reason: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Exist {
            key: key.into(),
            reason,
            source: Some(source.into()),
        }
    }

    /// Create an unexpected-value error
    #[must_use]
    pub fn unexpected_value(
        key: impl Into<String>,
        have: impl Into<Vec<u8>>,
        expected: impl Into<Vec<u8>>,
    ) -> Self {
        Error::UnexpectedValue {
            key: key.into(),
            have: have.into(),
            expected: expected.into(),
        }
    }

    /// Create an error for an extra key missing after a matching comparison
    #[must_use]
    pub fn missing_extra_key(cas: impl Into<String>, key: impl Into<String>) -> Self {
        Error::MissingExtraKey {
            cas: cas.into(),
            key: key.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with a source error
    #[must_use]
    pub fn configuration_with_source(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a backend failure error
    #[must_use]
    pub fn backend(
        operation: &'static str,
        key: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::Backend {
            operation,
            key: key.into(),
            source: source.into(),
        }
    }

    /// Create a file system error
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: &'static str, duration: Duration) -> Self {
        Error::Timeout {
            operation,
            duration,
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(operation: &'static str) -> Self {
        Error::Cancelled { operation }
    }
}
