//! Object storage capability contract
//!
//! Defines the async interface that every backend must implement, local or
//! remote, plus the optional filesystem capability.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_core::{Object, Result};
use tokio::io::AsyncRead;

/// Byte stream returned by `get` and consumed by `put`
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Async trait for object storage backends
///
/// Keys are slash-separated and totally ordered as byte strings. A key
/// ending in `/` is a directory placeholder: it can be created and probed
/// but is never returned by `list`.
#[async_trait]
pub trait ObjectStorage: fmt::Display + Send + Sync {
    /// Open a stream over the object at `key`
    ///
    /// Reading starts at `offset`. A positive `limit` caps the stream at
    /// that many bytes; zero or negative streams to the end.
    ///
    /// # Errors
    /// `NotFound` if the key does not exist
    async fn get(&self, key: &str, offset: u64, limit: i64) -> Result<ObjectReader>;

    /// Write the whole stream to `key`, replacing any existing object
    ///
    /// For a directory key the body is ignored and the directory is
    /// created if missing.
    async fn put(&self, key: &str, data: ObjectReader) -> Result<()>;

    /// Copy `src` to `dst`
    ///
    /// The default reads the source in full and writes it back; backends
    /// with a native server-side copy override this.
    async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        let reader = self.get(src, 0, -1).await?;
        self.put(dst, reader).await
    }

    /// Succeeds if `key` exists, `NotFound` otherwise
    async fn exists(&self, key: &str) -> Result<()>;

    /// Remove the object at `key`
    ///
    /// # Errors
    /// `NotFound` if the key does not exist
    async fn delete(&self, key: &str) -> Result<()>;

    /// List up to `limit` objects with `key >= marker` under `prefix`
    ///
    /// Results are strictly ascending and never include directory keys.
    /// An empty page without error marks the end of the key space. An
    /// empty page with an error reports a failed listing; the error is
    /// reported once.
    async fn list(&self, prefix: &str, marker: &str, limit: usize) -> Result<Vec<Object>>;

    /// Set the modification time of `key`
    async fn chtimes(&self, key: &str, mtime: DateTime<Utc>) -> Result<()>;

    /// Filesystem semantics, for backends that have them
    fn as_file_system(&self) -> Option<&dyn FileSystem> {
        None
    }
}

/// Optional capability: POSIX permission and ownership preservation
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Set the permission bits of `key`
    async fn chmod(&self, key: &str, mode: u32) -> Result<()>;

    /// Set the owner and group of `key`
    async fn chown(&self, key: &str, uid: u32, gid: u32) -> Result<()>;
}

/// List every object under `prefix` by chaining `list` calls
///
/// Each page is requested with the previous page's last key as marker,
/// which keeps a session-backed store on its sequential fast path.
pub async fn list_all(
    store: &dyn ObjectStorage,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<Object>> {
    let mut objects: Vec<Object> = Vec::new();
    let mut marker = String::new();

    loop {
        let page = store.list(prefix, &marker, page_size.max(1)).await?;
        let Some(last) = page.last() else {
            break;
        };
        // A marker is inclusive, so a store without a live session may
        // hand the previous last key back.
        if last.key <= marker {
            break;
        }
        marker = last.key.clone();
        let floor = objects.last().map(|o| o.key.clone());
        objects.extend(
            page.into_iter()
                .filter(|o| floor.as_deref().map_or(true, |f| o.key.as_str() > f)),
        );
    }

    Ok(objects)
}
