//! Configuration for the ballotstore storage client
//!
//! A storage client is described by two pieces: the [`StorageConf`] naming the
//! protocol and holding its protocol-specific settings, and the [`Services`]
//! describing where the service instance keeps its credentials and which
//! storage servers it talks to.

pub mod loader;
pub mod storage;

pub use loader::StorageConfLoader;
pub use storage::{Services, StorageConf};
