//! Block-wise prefix scans over range queries

use super::range::{next_key, prefix_bounds};
use super::{entry, key_string};
use async_trait::async_trait;
use ballotstore_core::{EntrySender, Result};

/// Key-value pairs returned by one range query, in key order
#[derive(Debug, Default)]
pub(crate) struct Block {
    pub kvs: Vec<(Vec<u8>, Vec<u8>)>,
    /// Whether the server claims more keys follow
    pub more: bool,
}

/// Source of range query results
#[async_trait]
pub(crate) trait BlockReader: Send {
    /// Read at most `limit` keys in `[from, end)`.
    ///
    /// An `end` of `[0]` means no upper bound.
    async fn read_block(&mut self, from: &[u8], end: &[u8], limit: usize) -> Result<Block>;
}

/// Send every key starting with `prefix` to `tx`, `limit` keys per query.
///
/// Each block restarts right after the last key of the previous one. The
/// `more` flag is not trusted: only an empty block ends the scan. Returns the
/// number of entries sent.
pub(crate) async fn scan_blocks<R>(
    reader: &mut R,
    prefix: &str,
    limit: usize,
    tx: &EntrySender,
) -> Result<usize>
where
    R: BlockReader + ?Sized,
{
    let (mut from, end) = prefix_bounds(prefix.as_bytes());
    let mut total = 0usize;

    loop {
        let block = reader.read_block(&from, &end, limit).await?;
        tracing::debug!(
            from = %key_string(&from),
            count = block.kvs.len(),
            first = ?block.kvs.first().map(|(key, _)| key_string(key)),
            last = ?block.kvs.last().map(|(key, _)| key_string(key)),
            more = block.more,
            "range response"
        );

        let Some((last, _)) = block.kvs.last() else {
            return Ok(total);
        };
        let next = next_key(last);
        total += block.kvs.len();
        for (key, value) in &block.kvs {
            tx.send(entry(key, value)?).await?;
        }
        from = next;
    }
}
