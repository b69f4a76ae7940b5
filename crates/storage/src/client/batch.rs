//! Bulk reads and writes on top of the storage protocol

use super::Client;
use crate::protocol::Batcher;
use ballotstore_core::{Context, Entry, Error, Result};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Log progress of [`Client::put_all`] after this many keys
pub const PROGRESS_STEP: usize = 10_000;

enum Job {
    Batch(Vec<Entry>),
    Single(Entry),
}

impl Job {
    fn len(&self) -> usize {
        match self {
            Job::Batch(entries) => entries.len(),
            Job::Single(_) => 1,
        }
    }
}

pub(super) fn workers(jobs: usize) -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .min(jobs)
        .max(1)
}

impl Client {
    /// Return the values of the `keys` that exist. Missing keys are left out.
    ///
    /// Batching backends are queried in batches of their batch size, others
    /// one key at a time.
    pub async fn get_all(&self, ctx: &Context, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        let mut values = HashMap::with_capacity(keys.len());

        if let Some(batcher) = self.store.as_batcher() {
            for chunk in keys.chunks(batcher.batch_size().max(1)) {
                values.extend(batcher.get_all(ctx, chunk).await?);
            }
            return Ok(values);
        }

        for key in keys {
            match self.store.get(ctx, key).await {
                Ok(value) => {
                    values.insert((*key).to_string(), value);
                }
                Err(err) if err.is_not_exist() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(values)
    }

    /// Like [`Client::get_all`], but fails with `NotExist` naming the first
    /// missing key.
    pub async fn get_all_strict(
        &self,
        ctx: &Context,
        keys: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let values = self.get_all(ctx, keys).await?;
        if let Some(missing) = keys.iter().find(|key| !values.contains_key(**key)) {
            return Err(Error::not_exist(*missing, "strict get all missing key"));
        }
        Ok(values)
    }

    /// Store every value under `prefix` followed by its key.
    ///
    /// Work is spread over as many concurrent jobs as there are CPUs, each
    /// job a full batch when the backend is a [`Batcher`]. With `ensure`,
    /// keys that already hold the same value are accepted. The first error
    /// stops all remaining work; entries already stored stay stored.
    pub async fn put_all(
        &self,
        ctx: &Context,
        prefix: &str,
        values: &HashMap<String, Vec<u8>>,
        ensure: bool,
    ) -> Result<()> {
        let entries = values
            .iter()
            .map(|(key, value)| Entry::new(format!("{prefix}{key}"), value.clone()));
        let batcher = self.store.as_batcher();
        let jobs: Vec<Job> = match batcher {
            Some(batcher) => {
                let size = batcher.batch_size().max(1);
                let entries: Vec<Entry> = entries.collect();
                entries.chunks(size).map(|c| Job::Batch(c.to_vec())).collect()
            }
            None => entries.map(Job::Single).collect(),
        };
        if jobs.is_empty() {
            return Ok(());
        }

        let workers = workers(jobs.len());
        tracing::debug!(
            prefix,
            keys = values.len(),
            jobs = jobs.len(),
            workers,
            "put all"
        );

        let ctx = ctx.child();
        let mut done = futures::stream::iter(jobs)
            .map(|job| self.put_job(&ctx, batcher, job, ensure))
            .buffer_unordered(workers);

        let mut total = 0;
        let mut log_at = PROGRESS_STEP;
        let outcome = loop {
            match done.try_next().await {
                Ok(Some(stored)) => {
                    total += stored;
                    if total >= log_at {
                        tracing::info!(prefix, stored = total, of = values.len(), "put all progress");
                        log_at += PROGRESS_STEP;
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        // Dropping the stream abandons in-flight jobs; cancelling the child
        // context stops any scan they spawned.
        drop(done);
        ctx.cancel();
        outcome
    }

    async fn put_job(
        &self,
        ctx: &Context,
        batcher: Option<&dyn Batcher>,
        job: Job,
        ensure: bool,
    ) -> Result<usize> {
        let stored = job.len();
        match (job, batcher) {
            (Job::Batch(entries), Some(batcher)) if ensure => {
                ensure_batch(ctx, batcher, entries).await?;
            }
            (Job::Batch(entries), Some(batcher)) => batcher.put_all(ctx, &entries).await?,
            (Job::Single(entry), _) if ensure => {
                self.ensure(ctx, &entry.key, &entry.value).await?;
            }
            (Job::Single(entry), _) => self.put(ctx, &entry.key, &entry.value).await?,
            (Job::Batch(entries), None) => {
                for entry in entries {
                    self.put(ctx, &entry.key, &entry.value).await?;
                }
            }
        }
        Ok(stored)
    }
}

/// Put a batch, accepting keys that already hold the same value.
///
/// The batch is first put as a whole. If some keys exist, their values are
/// compared and the put is repeated with the keys that were still missing.
async fn ensure_batch(ctx: &Context, batcher: &dyn Batcher, mut batch: Vec<Entry>) -> Result<()> {
    loop {
        match batcher.put_all(ctx, &batch).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_exist() => {}
            Err(err) => return Err(err),
        }

        let existing = {
            let keys: Vec<&str> = batch.iter().map(|e| e.key.as_str()).collect();
            batcher.get_all(ctx, &keys).await?
        };

        let mut missing = Vec::new();
        for entry in batch {
            match existing.get(&entry.key) {
                None => missing.push(entry),
                Some(value) if *value != entry.value => {
                    return Err(Error::EnsureMismatch {
                        key: entry.key,
                        existing: value.clone(),
                        new: entry.value,
                    });
                }
                Some(_) => {}
            }
        }

        if missing.is_empty() {
            return Ok(());
        }
        tracing::debug!(missing = missing.len(), "retrying ensured batch");
        batch = missing;
    }
}
