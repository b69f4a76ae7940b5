//! Cancellable execution context for storage operations

use crate::errors::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Execution context passed to every storage operation.
///
/// A context carries a cancellation token shared with all contexts derived
/// from it and an optional deadline. Cancelling a context cancels its
/// children, never its parent. Cloning shares the same token.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Context {
    /// Create a root context that is never cancelled unless asked to
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context that is cancelled together with `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child context whose deadline is at most `timeout` from now.
    ///
    /// The earlier of the inherited deadline and the new one wins.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Deadline {
            at: Instant::now() + timeout,
            budget: timeout,
        };
        let deadline = match self.deadline {
            Some(inherited) if inherited.at <= candidate.at => inherited,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether this context was cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The instant at which operations under this context time out
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.map(|d| d.at)
    }

    /// Fail fast if the context is already cancelled or past its deadline.
    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::cancelled(operation));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline.at => {
                Err(Error::timeout(operation, deadline.budget))
            }
            _ => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes,
    /// yielding the error describing which of the two happened.
    pub async fn done(&self, operation: &'static str) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Error::cancelled(operation),
                    () = tokio::time::sleep_until(deadline.at) => {
                        Error::timeout(operation, deadline.budget)
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                Error::cancelled(operation)
            }
        }
    }

    /// Drive `future` to completion unless the context ends first.
    ///
    /// When the context ends, `future` is dropped without being polled again.
    pub async fn run<T, F>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check(operation)?;
        tokio::select! {
            biased;
            err = self.done(operation) => Err(err),
            result = future => result,
        }
    }
}
