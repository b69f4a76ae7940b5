use ballotstore_storage::{FileStore, MemoryStore, PutGetter};
use std::sync::Arc;
use tempfile::TempDir;

/// A storage backend under test, keeping its working directory alive
pub struct Backend {
    pub name: &'static str,
    pub store: Arc<dyn PutGetter>,
    _dir: Option<TempDir>,
}

impl Backend {
    pub fn memory() -> Self {
        Self {
            name: "memory",
            store: Arc::new(MemoryStore::new()),
            _dir: None,
        }
    }

    pub fn file() -> Self {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("wd")).unwrap();
        Self {
            name: "file",
            store: Arc::new(store),
            _dir: Some(dir),
        }
    }
}

/// Fresh instances of every backend that runs without external services
#[allow(dead_code)]
pub fn backends() -> Vec<Backend> {
    vec![Backend::memory(), Backend::file()]
}
