//! Append-only, compare-and-swap protected key-value storage for ballotstore
//!
//! Every service persists election data through the [`PutGetter`] protocol.
//! Three interchangeable backends implement it:
//!
//! - [`MemoryStore`]: a mutex-guarded map, for tests
//! - [`FileStore`]: one file per key in a local directory, for development
//! - `EtcdStore`: an etcd v3 cluster over mutual TLS, for production
//!   (behind the default `etcd` feature)
//!
//! A [`Registry`] maps configured protocol names to backend constructors and a
//! [`Client`] wraps the resolved backend with batch helpers.

pub mod client;
#[cfg(feature = "etcd")]
pub mod etcd;
pub mod file;
pub mod memory;
pub mod protocol;
pub mod registry;

pub use ballotstore_core::{Context, Entry, Error, ErrorKind, PrefixStream, Protocol, Result};
pub use client::Client;
#[cfg(feature = "etcd")]
pub use etcd::EtcdStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use protocol::{Batcher, PutGetter};
pub use registry::Registry;
