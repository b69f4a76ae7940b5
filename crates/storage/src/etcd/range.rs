//! Key range arithmetic for paginated prefix scans
//!
//! etcd has no iterating API, so prefix scans query `[from, end)` in blocks of
//! [`BLOCK_SIZE`] keys and restart each block from the key immediately
//! following the last one received.

/// Maximum number of keys fetched by a single range query.
///
/// Tuned for a 10 second operation timeout; shorter timeouts may need
/// smaller blocks.
pub const BLOCK_SIZE: usize = 6144;

/// The `[from, end)` bounds covering every key that starts with `prefix`.
///
/// An empty prefix scans the whole keyspace: `from` is the smallest non-empty
/// key and an `end` of `[0]` means "no upper bound".
pub fn prefix_bounds(prefix: &[u8]) -> (Vec<u8>, Vec<u8>) {
    if prefix.is_empty() {
        return (vec![0], vec![0]);
    }
    (prefix.to_vec(), prefix_range_end(prefix))
}

/// The smallest key greater than every key starting with `prefix`.
///
/// Trailing `0xff` bytes cannot be incremented and are dropped. If nothing is
/// left, returns `[0]`, which etcd reads as "up to the end of the keyspace".
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

/// The key that immediately follows `key` in lexicographic order.
pub fn next_key(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}
