use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use storage::{
    list_all, LocalDiskStore, ObjectReader, ObjectStorage, StorageBuilder, StorageFactory,
    StorageRegistry,
};
use sync_core::{Error, StorageEndpoint, SyncConfig};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

fn body(data: &[u8]) -> ObjectReader {
    Box::new(std::io::Cursor::new(data.to_vec()))
}

async fn read_all(store: &dyn ObjectStorage, key: &str) -> Result<Vec<u8>> {
    let mut reader = store.get(key, 0, -1).await?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

fn local_spec(dir: &Path) -> String {
    format!("{}/", dir.display())
}

fn factory(config: SyncConfig) -> StorageFactory {
    StorageFactory::new(config).with_private_key_path(None)
}

/// Serves every endpoint from one local root, standing in for a remote backend
struct FixedRootBuilder(String);

#[async_trait]
impl StorageBuilder for FixedRootBuilder {
    async fn build(&self, _endpoint: &StorageEndpoint) -> sync_core::Result<Arc<dyn ObjectStorage>> {
        Ok(Arc::new(LocalDiskStore::new(self.0.clone()).await?))
    }
}

#[tokio::test]
async fn test_paginated_listing_covers_every_key() -> Result<()> {
    let dir = TempDir::new()?;
    let mut factory = factory(SyncConfig::default());
    let store = factory.create(&local_spec(dir.path())).await?.store;

    let mut expected = BTreeSet::new();
    for i in 0..40 {
        let key = format!("d{}/sub{}/f{:02}.bin", i % 3, i % 5, i);
        store.put(&key, body(key.as_bytes())).await?;
        expected.insert(key);
    }
    for key in ["top.txt", "d1.txt", "d1-", "zz"] {
        store.put(key, body(b"x")).await?;
        expected.insert(key.to_string());
    }
    store.put("empty/dir/", body(b"")).await?;

    let mut seen = Vec::new();
    let mut marker = String::new();
    loop {
        let page = store.list("", &marker, 7).await?;
        let Some(last) = page.last() else {
            break;
        };
        marker = last.key.clone();
        seen.extend(page.into_iter().map(|o| o.key));
    }

    let mut sorted = seen.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(seen, sorted, "keys must be strictly increasing");
    assert_eq!(seen, expected.into_iter().collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_small_buffer_applies_backpressure() -> Result<()> {
    let dir = TempDir::new()?;
    let store = LocalDiskStore::new(dir.path().to_string_lossy().to_string())
        .await?
        .with_buffer_size(4);

    for i in 0..200 {
        store.put(&format!("n/{:03}", i), body(b"0")).await?;
    }

    let objects = list_all(&store, "n/", 9).await?;
    assert_eq!(objects.len(), 200);
    assert_eq!(objects[0].key, "n/000");
    assert_eq!(objects[199].key, "n/199");
    Ok(())
}

#[tokio::test]
async fn test_example_scenario() -> Result<()> {
    let dir = TempDir::new()?;
    let store = LocalDiskStore::new(dir.path().to_string_lossy().to_string()).await?;
    store.put("a.txt", body(b"a")).await?;
    store.put("b/c.txt", body(b"c")).await?;
    store.put("b/d.txt", body(b"d")).await?;

    let keys = |page: Vec<sync_core::Object>| page.into_iter().map(|o| o.key).collect::<Vec<_>>();
    assert_eq!(keys(store.list("", "", 2).await?), vec!["a.txt", "b/c.txt"]);
    assert_eq!(keys(store.list("", "b/c.txt", 2).await?), vec!["b/d.txt"]);
    assert!(store.list("", "b/d.txt", 2).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sync_pair_copies_content_and_mtime() -> Result<()> {
    let src_dir = TempDir::new()?;
    let dst_dir = TempDir::new()?;
    let mut factory = factory(SyncConfig {
        perms: true,
        ..Default::default()
    });

    let (src, dst) = factory
        .create_pair(&local_spec(src_dir.path()), &local_spec(dst_dir.path()))
        .await?;
    assert!(factory.config().perms);

    let mtime: DateTime<Utc> = "2021-06-01T12:00:00Z".parse()?;
    src.store.put("docs/readme.md", body(b"# hello")).await?;
    src.store.chtimes("docs/readme.md", mtime).await?;

    for object in list_all(src.store.as_ref(), "", 100).await? {
        let reader = src.store.get(&object.key, 0, -1).await?;
        dst.store.put(&object.key, reader).await?;
        dst.store.chtimes(&object.key, object.mtime).await?;
    }

    assert_eq!(read_all(dst.store.as_ref(), "docs/readme.md").await?, b"# hello");
    let copied = list_all(dst.store.as_ref(), "", 100).await?;
    assert_eq!(copied.len(), 1);
    assert_eq!(copied[0].mtime, mtime);
    Ok(())
}

#[tokio::test]
async fn test_mismatched_trailing_slash_aborts() -> Result<()> {
    let src_dir = TempDir::new()?;
    let dst_dir = TempDir::new()?;
    let mut factory = factory(SyncConfig::default());

    let dst = dst_dir.path().join("out").display().to_string();
    let err = factory
        .create_pair(&local_spec(src_dir.path()), &dst)
        .await
        .err()
        .expect("pair must be rejected");
    assert!(err.is_fatal());
    assert!(!dst_dir.path().join("out").exists());
    Ok(())
}

#[tokio::test]
async fn test_uri_path_becomes_key_prefix() -> Result<()> {
    let dir = TempDir::new()?;
    let registry = StorageRegistry::with_defaults();
    registry.register(
        "disk",
        FixedRootBuilder(dir.path().to_string_lossy().to_string()),
    );
    let mut factory = factory(SyncConfig::default()).with_registry(Arc::new(registry));

    let created = factory.create("disk://bucket.example.com/projects/").await?;
    assert_eq!(created.endpoint.endpoint, "https://bucket.example.com");

    created.store.put("plan.txt", body(b"v1")).await?;
    assert!(dir.path().join("projects/plan.txt").is_file());

    created.store.copy("plan-copy.txt", "plan.txt").await?;
    let keys: Vec<_> = list_all(created.store.as_ref(), "", 10)
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(keys, vec!["plan-copy.txt", "plan.txt"]);

    created.store.delete("plan.txt").await?;
    assert!(created.store.exists("plan.txt").await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_listing_vanished_root_reports_traversal_error() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("store");
    let store = LocalDiskStore::new(root.to_string_lossy().to_string()).await?;
    store.put("k", body(b"v")).await?;
    std::fs::remove_dir_all(&root)?;

    let result = store.list("", "", 10).await;
    assert!(matches!(result, Err(Error::Traversal { .. })));
    Ok(())
}
