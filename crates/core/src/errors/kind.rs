//! Classification of storage errors

use super::types::Error;

/// Coarse error classes that callers branch on.
///
/// `NotExist`, `Exist` and `UnexpectedValue` are expected conditions a caller
/// can recover from (for example by retrying a compare-and-swap loop).
/// `Fatal` covers infrastructure failures and broken caller invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotExist,
    Exist,
    UnexpectedValue,
    Fatal,
}

impl Error {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotExist { .. } => ErrorKind::NotExist,
            Self::Exist { .. } => ErrorKind::Exist,
            Self::UnexpectedValue { .. } => ErrorKind::UnexpectedValue,
            Self::MissingExtraKey { .. }
            | Self::EnsureMismatch { .. }
            | Self::UnknownProtocol { .. }
            | Self::Configuration { .. }
            | Self::Connection { .. }
            | Self::Backend { .. }
            | Self::Io { .. }
            | Self::Decode { .. }
            | Self::Timeout { .. }
            | Self::Cancelled { .. } => ErrorKind::Fatal,
        }
    }

    /// Check if the requested key was never stored
    #[must_use]
    pub const fn is_not_exist(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotExist)
    }

    /// Check if a put hit an existing key
    #[must_use]
    pub const fn is_exist(&self) -> bool {
        matches!(self.kind(), ErrorKind::Exist)
    }

    /// Check if a compare-and-swap saw a different value
    #[must_use]
    pub const fn is_unexpected_value(&self) -> bool {
        matches!(self.kind(), ErrorKind::UnexpectedValue)
    }

    /// Check if this error is an infrastructure failure or invariant violation
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }

    /// Check if the error comes from caller cancellation or an expired deadline
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Timeout { .. })
    }

    /// Mark this error for operator alerting and return it.
    ///
    /// Alerts are emitted as `error` level events carrying `alert = true` so
    /// that log shipping can route them separately.
    #[must_use]
    pub fn alert(self) -> Self {
        tracing::error!(alert = true, kind = ?self.kind(), error = %self, "storage alert");
        self
    }
}
