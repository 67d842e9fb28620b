//! Key prefixing wrapper
//!
//! Every key is joined with a fixed prefix on the way in and the prefix is
//! stripped from listed keys on the way out, so callers address the
//! wrapped store as if the prefix were its root.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sync_core::{Object, Result};

use crate::backend::{FileSystem, ObjectReader, ObjectStorage};

/// A store seen through a key prefix
pub struct PrefixedStorage {
    inner: Arc<dyn ObjectStorage>,
    prefix: String,
}

impl PrefixedStorage {
    pub fn new(inner: Arc<dyn ObjectStorage>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

/// Wrap `store` so all keys live under `prefix`
pub fn with_prefix(store: Arc<dyn ObjectStorage>, prefix: &str) -> Arc<dyn ObjectStorage> {
    Arc::new(PrefixedStorage::new(store, prefix))
}

impl fmt::Display for PrefixedStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.inner, self.prefix)
    }
}

#[async_trait]
impl ObjectStorage for PrefixedStorage {
    async fn get(&self, key: &str, offset: u64, limit: i64) -> Result<ObjectReader> {
        self.inner.get(&self.full_key(key), offset, limit).await
    }

    async fn put(&self, key: &str, data: ObjectReader) -> Result<()> {
        self.inner.put(&self.full_key(key), data).await
    }

    async fn copy(&self, dst: &str, src: &str) -> Result<()> {
        self.inner
            .copy(&self.full_key(dst), &self.full_key(src))
            .await
    }

    async fn exists(&self, key: &str) -> Result<()> {
        self.inner.exists(&self.full_key(key)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(&self.full_key(key)).await
    }

    async fn list(&self, prefix: &str, marker: &str, limit: usize) -> Result<Vec<Object>> {
        // An empty marker must stay empty so the inner lower bound is the
        // prefix itself rather than the bare wrapping prefix.
        let marker = if marker.is_empty() {
            String::new()
        } else {
            self.full_key(marker)
        };
        let objects = self
            .inner
            .list(&self.full_key(prefix), &marker, limit)
            .await?;

        Ok(objects
            .into_iter()
            .filter_map(|mut object| {
                let key = object.key.strip_prefix(&self.prefix)?.to_string();
                object.key = key;
                Some(object)
            })
            .collect())
    }

    async fn chtimes(&self, key: &str, mtime: DateTime<Utc>) -> Result<()> {
        self.inner.chtimes(&self.full_key(key), mtime).await
    }

    fn as_file_system(&self) -> Option<&dyn FileSystem> {
        if self.inner.as_file_system().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl FileSystem for PrefixedStorage {
    async fn chmod(&self, key: &str, mode: u32) -> Result<()> {
        match self.inner.as_file_system() {
            Some(fs) => fs.chmod(&self.full_key(key), mode).await,
            None => Err(unsupported(&self.inner, "chmod")),
        }
    }

    async fn chown(&self, key: &str, uid: u32, gid: u32) -> Result<()> {
        match self.inner.as_file_system() {
            Some(fs) => fs.chown(&self.full_key(key), uid, gid).await,
            None => Err(unsupported(&self.inner, "chown")),
        }
    }
}

fn unsupported(store: &Arc<dyn ObjectStorage>, operation: &str) -> sync_core::Error {
    sync_core::Error::Unsupported {
        backend: store.to_string(),
        operation: operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalDiskStore;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn setup() -> (TempDir, Arc<LocalDiskStore>, Arc<dyn ObjectStorage>) {
        let temp_dir = TempDir::new().unwrap();
        let local = Arc::new(
            LocalDiskStore::new(temp_dir.path().to_string_lossy().to_string())
                .await
                .unwrap(),
        );
        let prefixed = with_prefix(local.clone(), "team/");
        (temp_dir, local, prefixed)
    }

    #[tokio::test]
    async fn test_prefix_applied_on_write() {
        let (_temp_dir, local, prefixed) = setup().await;

        prefixed.put("notes.txt", Box::new(&b"hi"[..])).await.unwrap();
        local.exists("team/notes.txt").await.unwrap();
        assert!(local.exists("notes.txt").await.is_err());

        let mut buf = String::new();
        prefixed
            .get("notes.txt", 0, -1)
            .await
            .unwrap()
            .read_to_string(&mut buf)
            .await
            .unwrap();
        assert_eq!(buf, "hi");
    }

    #[tokio::test]
    async fn test_prefix_stripped_on_list() {
        let (_temp_dir, local, prefixed) = setup().await;
        local.put("other.txt", Box::new(&b"x"[..])).await.unwrap();
        local.put("team/a", Box::new(&b"x"[..])).await.unwrap();
        local.put("team/b/c", Box::new(&b"x"[..])).await.unwrap();
        local.put("teamwork", Box::new(&b"x"[..])).await.unwrap();

        let page = prefixed.list("", "", 1).await.unwrap();
        assert_eq!(page[0].key, "a");

        let page = prefixed.list("", "a", 10).await.unwrap();
        let keys: Vec<_> = page.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["b/c"]);
    }

    #[tokio::test]
    async fn test_prefix_display_and_capability() {
        let (_temp_dir, local, prefixed) = setup().await;
        assert_eq!(prefixed.to_string(), format!("{}team/", local));
        assert!(prefixed.as_file_system().is_some());
    }
}
