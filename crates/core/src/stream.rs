//! Lazy result streams for prefix scans
//!
//! A scan runs in a background task that pushes entries into a bounded
//! channel while the caller drains a [`PrefixStream`]. The task reports at most
//! one terminal error through a separate one-shot slot, so reporting a failure
//! never blocks on a consumer that stopped reading. Every send races the
//! scan's [`Context`]; once the context ends or the stream is dropped the task
//! returns, so no scan outlives its consumer.

use crate::context::Context;
use crate::errors::{Error, Result};
use crate::types::Entry;
use futures::Stream;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context as TaskContext, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// Number of entries buffered between a scan task and its consumer.
pub const STREAM_BUFFER: usize = 32;

const OPERATION: &str = "get with prefix";

/// Stream of entries produced by a prefix scan.
///
/// Yields `Ok(entry)` items and at most one `Err`, which is always the last
/// item. Dropping the stream stops the producing task at its next send.
pub struct PrefixStream {
    entries: ReceiverStream<Entry>,
    error: Option<oneshot::Receiver<Error>>,
}

/// Producer half handed to a scan task.
pub struct EntrySender {
    tx: mpsc::Sender<Entry>,
    ctx: Context,
}

impl EntrySender {
    /// Send one entry to the consumer.
    ///
    /// Fails with the context error if the context ends first, or with a
    /// cancellation error if the consumer dropped the stream. Either way the
    /// scan must stop.
    pub async fn send(&self, entry: Entry) -> Result<()> {
        tokio::select! {
            biased;
            err = self.ctx.done(OPERATION) => Err(err),
            sent = self.tx.send(entry) => sent.map_err(|_| Error::cancelled(OPERATION)),
        }
    }

    /// The context the scan runs under
    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

impl PrefixStream {
    /// Spawn `scan` on the runtime and return the stream it feeds.
    ///
    /// If `scan` fails, its error becomes the final item of the stream.
    pub fn spawn<F, Fut>(ctx: &Context, scan: F) -> Self
    where
        F: FnOnce(EntrySender) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (err_tx, err_rx) = oneshot::channel();
        let task = scan(EntrySender {
            tx,
            ctx: ctx.clone(),
        });
        tokio::spawn(async move {
            if let Err(err) = task.await {
                tracing::debug!(error = %err, "prefix scan stopped");
                // The consumer may be gone already.
                let _ = err_tx.send(err);
            }
        });
        Self {
            entries: ReceiverStream::new(rx),
            error: Some(err_rx),
        }
    }

    /// A stream that yields nothing but `err`.
    pub fn failed(err: Error) -> Self {
        let (_, rx) = mpsc::channel(1);
        let (err_tx, err_rx) = oneshot::channel();
        let _ = err_tx.send(err);
        Self {
            entries: ReceiverStream::new(rx),
            error: Some(err_rx),
        }
    }

    /// Drain the stream into a key-value map, failing on the terminal error.
    pub async fn into_map(self) -> Result<HashMap<String, Vec<u8>>> {
        use futures::TryStreamExt;

        self.map_ok(|entry| (entry.key, entry.value))
            .try_collect()
            .await
    }
}

impl Stream for PrefixStream {
    type Item = Result<Entry>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(entry) = ready!(Pin::new(&mut this.entries).poll_next(cx)) {
            return Poll::Ready(Some(Ok(entry)));
        }

        // All senders are gone; report the terminal error if there was one.
        let Some(rx) = this.error.as_mut() else {
            return Poll::Ready(None);
        };
        let outcome = ready!(Pin::new(rx).poll(cx));
        this.error = None;
        Poll::Ready(outcome.ok().map(Err))
    }
}

impl std::fmt::Debug for PrefixStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixStream")
            .field("finished", &self.error.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn produce_forever(tx: &EntrySender) -> Result<()> {
        let mut i = 0u64;
        loop {
            tx.send(Entry::new(format!("/k/{i}"), "v")).await?;
            i += 1;
        }
    }

    #[tokio::test]
    async fn test_entries_then_clean_end() {
        let ctx = Context::new();
        let mut stream = PrefixStream::spawn(&ctx, |tx| async move {
            tx.send(Entry::new("/a/1", "x")).await?;
            tx.send(Entry::new("/a/2", "y")).await?;
            Ok::<(), Error>(())
        });

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Entry::new("/a/1", "x"));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.key, "/a/2");
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_is_last_item() {
        let ctx = Context::new();
        let mut stream = PrefixStream::spawn(&ctx, |tx| async move {
            tx.send(Entry::new("/a", "x")).await?;
            Err::<(), Error>(Error::configuration("boom"))
        });

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_stream() {
        let result = PrefixStream::failed(Error::configuration("no kv"))
            .into_map()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cancel_stops_producer() {
        let ctx = Context::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let mut stream = PrefixStream::spawn(&ctx, move |tx| async move {
            let result = produce_forever(&tx).await;
            flag.store(true, Ordering::SeqCst);
            result
        });

        assert!(stream.next().await.unwrap().is_ok());
        ctx.cancel();

        let mut terminal = None;
        while let Some(item) = stream.next().await {
            if let Err(err) = item {
                terminal = Some(err);
            }
        }
        assert!(matches!(terminal, Some(Error::Cancelled { .. })));

        tokio::time::timeout(Duration::from_secs(1), async {
            while !finished.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("producer task should stop");
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_producer() {
        let ctx = Context::new();
        let (done_tx, done_rx) = oneshot::channel();
        let stream = PrefixStream::spawn(&ctx, move |tx| async move {
            let result = produce_forever(&tx).await;
            let _ = done_tx.send(());
            result
        });
        drop(stream);

        tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .expect("producer task should stop")
            .unwrap();
    }
}
