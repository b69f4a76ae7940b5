//! The storage protocol contract implemented by every backend

use async_trait::async_trait;
use ballotstore_core::{Context, Entry, Error, PrefixStream, Result};
use std::collections::{HashMap, HashSet};

/// Storage protocol implemented by every backend.
///
/// There is no way to delete a key or to overwrite one with `put`: the only
/// mutation of an existing key is `cas_and_get` on its compare-and-swap key.
/// Every operation obeys cancellation and deadlines of the given [`Context`].
#[async_trait]
pub trait PutGetter: std::fmt::Debug + Send + Sync {
    /// Store `value` under `key`.
    ///
    /// Succeeds at most once per key. Later calls fail with
    /// [`Error::Exist`](ballotstore_core::Error::Exist).
    async fn put(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()>;

    /// Return the value stored under `key`.
    ///
    /// Fails with [`Error::NotExist`](ballotstore_core::Error::NotExist) if the
    /// key was never stored.
    async fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>>;

    /// Stream every entry whose key starts with `prefix`.
    ///
    /// The scan runs in the background; entries can be consumed before it
    /// finishes. Failures, including cancellation of `ctx`, are reported as the
    /// last item of the stream. Order is backend defined.
    async fn get_with_prefix(&self, ctx: &Context, prefix: &str) -> PrefixStream;

    /// Atomically replace the value of `cas` with `new` if it currently equals
    /// `old`, returning the values of `keys` as read at the same point.
    ///
    /// Fails without mutation with `NotExist` if `cas` is missing and with
    /// `UnexpectedValue` if it holds something else. If the comparison matches
    /// but one of `keys` is missing, fails with `MissingExtraKey`.
    async fn cas_and_get(
        &self,
        ctx: &Context,
        cas: &str,
        old: &[u8],
        new: &[u8],
        keys: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>>;

    /// Batch operations, if the backend supports them
    fn as_batcher(&self) -> Option<&dyn Batcher> {
        None
    }
}

/// Optional batch operations on top of [`PutGetter`].
///
/// Batch methods reject batches larger than [`Batcher::batch_size`].
#[async_trait]
pub trait Batcher: PutGetter {
    /// Maximum number of operations in a single batch
    fn batch_size(&self) -> usize;

    /// Return the values stored under `keys`.
    ///
    /// Missing keys are left out of the result; callers must check for the
    /// keys they require.
    async fn get_all(&self, ctx: &Context, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>>;

    /// Store all entries or none of them.
    ///
    /// Fails with `Exist` naming an existing key if any key is already stored.
    /// A batch naming the same key twice is rejected as a backend error.
    async fn put_all(&self, ctx: &Context, entries: &[Entry]) -> Result<()>;
}

/// Reject a batch that names the same key more than once.
pub(crate) fn check_distinct(operation: &'static str, entries: &[Entry]) -> Result<()> {
    let mut seen = HashSet::with_capacity(entries.len());
    match entries.iter().find(|entry| !seen.insert(entry.key.as_str())) {
        Some(entry) => Err(Error::backend(
            operation,
            entry.key.clone(),
            "key appears more than once in the batch",
        )),
        None => Ok(()),
    }
}
