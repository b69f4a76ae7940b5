//! Local filesystem storage protocol
//!
//! Keys are Base64 URL encoded (with padding) and stored as one file per key
//! in a working directory. The protocol performs no synchronization between
//! concurrent users: only `put` is safe under concurrency, since a value is
//! staged in a hidden file and published with a hard link that fails if the
//! key exists. It is meant for development and tests, never production.

use crate::protocol::PutGetter;
use async_trait::async_trait;
use ballotstore_core::{Context, Entry, EntrySender, Error, PrefixStream, Protocol, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Number of directory entries read before filtering them
pub const READDIR_BATCH: usize = 128;

/// Prefix of values being written. Encoded keys never start with a dot.
const STAGING_PREFIX: &str = ".put-";

static STAGED: AtomicU64 = AtomicU64::new(0);

#[cfg(unix)]
const FILE_MODE: u32 = 0o660;
#[cfg(unix)]
const DIR_MODE: u32 = 0o770;

/// File protocol configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConf {
    /// Working directory that holds all keys
    #[serde(default)]
    pub wd: PathBuf,
}

/// Storage protocol writing one file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    wd: Arc<PathBuf>,
}

impl FileStore {
    /// Use `wd` as the working directory, creating it if needed.
    ///
    /// Files and directories get group permissions so that every service of
    /// the same group can share the store.
    pub fn new(wd: impl Into<PathBuf>) -> Result<Self> {
        let wd = wd.into();
        if wd.as_os_str().is_empty() {
            return Err(Error::configuration("file protocol requires a working directory"));
        }

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(DIR_MODE);
        }
        builder
            .create(&wd)
            .map_err(|e| Error::io(&wd, "create working directory", e))?;

        tracing::debug!(wd = %wd.display(), "opened file storage");
        Ok(Self { wd: Arc::new(wd) })
    }

    /// Create a store from the protocol configuration node
    pub fn from_conf(conf: &serde_yaml::Value) -> Result<Self> {
        let conf: FileConf =
            ballotstore_config::storage::decode_protocol_conf(&Protocol::FILE, conf)?;
        Self::new(conf.wd)
    }

    /// The working directory
    pub fn wd(&self) -> &Path {
        &self.wd
    }

    fn path(&self, key: &str) -> PathBuf {
        self.wd.join(encode_key(key))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::not_exist(key, "empty key is never stored"));
        }
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::not_exist_with_source(key, "get missing key", e))
            }
            Err(e) => Err(Error::io(path, "read key", e).alert()),
        }
    }

    /// Write `value` to a staging file, then link it under the key's name.
    ///
    /// Linking fails atomically if the key exists, so readers only ever see
    /// complete values. The staging phase races `ctx`; linking does not.
    async fn write_new(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::backend("put", key, "empty keys cannot be stored"));
        }
        ctx.check("put")?;

        let staged = self.staging_path();
        let written = ctx.run("put", write_staged(&staged, value)).await;
        let linked = match written {
            Ok(()) => self.link(key, &staged).await,
            Err(err) => Err(err),
        };
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %staged.display(),
                    error = %e,
                    "failed to remove staged value"
                );
            }
        }
        linked
    }

    async fn link(&self, key: &str, staged: &Path) -> Result<()> {
        let path = self.path(key);
        match tokio::fs::hard_link(staged, &path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(Error::exist_with_source(key, "put existing key", e))
            }
            Err(e) => Err(Error::io(path, "create key", e).alert()),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let n = STAGED.fetch_add(1, Ordering::Relaxed);
        self.wd.join(format!("{STAGING_PREFIX}{}-{n}", std::process::id()))
    }

    /// Compare `cas` against `old` and read `keys` under `ctx`, then
    /// overwrite. Once the overwrite starts it runs to completion.
    async fn swap(
        &self,
        ctx: &Context,
        cas: &str,
        old: &[u8],
        new: &[u8],
        keys: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>> {
        let (mut file, values) = ctx
            .run("cas and get", self.compare(cas, old, keys))
            .await?;
        overwrite(&mut file, new)
            .await
            .map_err(|e| Error::io(self.path(cas), "write compare-and-swap value", e).alert())?;
        Ok(values)
    }

    async fn compare(
        &self,
        cas: &str,
        old: &[u8],
        keys: &[&str],
    ) -> Result<(File, HashMap<String, Vec<u8>>)> {
        if cas.is_empty() {
            return Err(Error::not_exist(cas, "empty key is never stored"));
        }
        let path = self.path(cas);
        let mut file = match OpenOptions::new().read(true).write(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::not_exist_with_source(
                    cas,
                    "compare-and-swap key missing",
                    e,
                ));
            }
            Err(e) => return Err(Error::io(path, "open compare-and-swap key", e).alert()),
        };

        let mut have = Vec::new();
        file.read_to_end(&mut have)
            .await
            .map_err(|e| Error::io(&path, "read compare-and-swap value", e).alert())?;
        if have != old {
            return Err(Error::unexpected_value(cas, have, old));
        }

        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            match self.read(key).await {
                Ok(value) => {
                    values.insert((*key).to_string(), value);
                }
                Err(err) if err.is_not_exist() => {
                    return Err(Error::missing_extra_key(cas, *key).alert());
                }
                Err(err) => return Err(err),
            }
        }

        Ok((file, values))
    }
}

async fn write_staged(path: &Path, value: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options
        .open(path)
        .await
        .map_err(|e| Error::io(path, "create staged value", e).alert())?;
    file.write_all(value)
        .await
        .map_err(|e| Error::io(path, "write value", e).alert())?;
    file.flush()
        .await
        .map_err(|e| Error::io(path, "flush value", e).alert())
}

async fn overwrite(file: &mut File, value: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(0)).await?;
    file.write_all(value).await?;
    file.set_len(value.len() as u64).await?;
    file.flush().await
}

fn encode_key(key: &str) -> String {
    URL_SAFE.encode(key)
}

fn decode_key(name: &str) -> Result<String> {
    let bytes = URL_SAFE.decode(name).map_err(|source| Error::Decode {
        what: "file name",
        input: name.to_string(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|e| Error::backend("decode file name", name, e))
}

async fn scan(store: FileStore, prefix: String, tx: EntrySender) -> Result<()> {
    let mut dir = tokio::fs::read_dir(store.wd())
        .await
        .map_err(|e| Error::io(store.wd(), "open working directory", e).alert())?;

    let mut names = Vec::with_capacity(READDIR_BATCH);
    loop {
        names.clear();
        while names.len() < READDIR_BATCH {
            let next = dir
                .next_entry()
                .await
                .map_err(|e| Error::io(store.wd(), "read working directory", e).alert())?;
            match next {
                Some(entry) => names.push(entry.file_name()),
                None => break,
            }
        }
        if names.is_empty() {
            return Ok(());
        }

        for name in &names {
            if name.to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            let name = name.to_str().ok_or_else(|| {
                Error::backend(
                    "get with prefix",
                    name.to_string_lossy(),
                    "file name is not valid UTF-8",
                )
                .alert()
            })?;
            let key = decode_key(name).map_err(Error::alert)?;
            if !key.starts_with(&prefix) {
                continue;
            }

            let value = store.read(&key).await.map_err(Error::alert)?;
            tx.send(Entry::new(key, value)).await?;
        }
    }
}

#[async_trait]
impl PutGetter for FileStore {
    async fn put(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        self.write_new(ctx, key, value).await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        ctx.run("get", self.read(key)).await
    }

    async fn get_with_prefix(&self, ctx: &Context, prefix: &str) -> PrefixStream {
        if let Err(err) = ctx.check("get with prefix") {
            return PrefixStream::failed(err);
        }
        let store = self.clone();
        let prefix = prefix.to_string();
        PrefixStream::spawn(ctx, move |tx| scan(store, prefix, tx))
    }

    /// Not synchronized: concurrent swaps of the same key may both succeed.
    async fn cas_and_get(
        &self,
        ctx: &Context,
        cas: &str,
        old: &[u8],
        new: &[u8],
        keys: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>> {
        self.swap(ctx, cas, old, new, keys).await
    }
}
