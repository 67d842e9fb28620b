//! Backend registry
//!
//! Maps lowercase backend names to the builders that construct them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sync_core::{Error, Result, StorageEndpoint};

use crate::backend::ObjectStorage;
use crate::local::LocalDiskStore;

/// Constructs a backend from a parsed endpoint
#[async_trait]
pub trait StorageBuilder: Send + Sync {
    async fn build(&self, endpoint: &StorageEndpoint) -> Result<Arc<dyn ObjectStorage>>;
}

/// Builder for [`LocalDiskStore`]; the endpoint is the root directory
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDiskBuilder {
    buffer_size: Option<usize>,
}

impl LocalDiskBuilder {
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: Some(buffer_size),
        }
    }
}

#[async_trait]
impl StorageBuilder for LocalDiskBuilder {
    async fn build(&self, endpoint: &StorageEndpoint) -> Result<Arc<dyn ObjectStorage>> {
        let mut store = LocalDiskStore::new(endpoint.endpoint.clone()).await?;
        if let Some(buffer_size) = self.buffer_size {
            store = store.with_buffer_size(buffer_size);
        }
        Ok(Arc::new(store))
    }
}

/// Registry of available backends
#[derive(Default)]
pub struct StorageRegistry {
    builders: RwLock<BTreeMap<String, Arc<dyn StorageBuilder>>>,
}

impl StorageRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every backend compiled into this crate
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("file", LocalDiskBuilder::default());

        #[cfg(feature = "s3")]
        {
            registry.register("s3", crate::s3::S3Builder::default());
            registry.register("minio", crate::s3::S3Builder::path_style());
        }

        registry
    }

    /// Register `builder` under `name`, replacing any previous entry
    pub fn register(&self, name: &str, builder: impl StorageBuilder + 'static) {
        self.builders
            .write()
            .insert(name.to_lowercase(), Arc::new(builder));
    }

    /// Look up the builder for `name`
    ///
    /// # Errors
    /// `UnknownBackend` if nothing is registered under that name
    pub fn get(&self, name: &str) -> Result<Arc<dyn StorageBuilder>> {
        self.builders
            .read()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnknownBackend {
                name: name.to_string(),
            })
    }

    /// Registered backend names, sorted
    pub fn names(&self) -> Vec<String> {
        self.builders.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_include_file() {
        let registry = StorageRegistry::with_defaults();
        assert!(registry.names().contains(&"file".to_string()));
        assert!(registry.get("FILE").is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        let registry = StorageRegistry::new();
        let err = registry.get("nosuch").err().unwrap();
        assert!(matches!(err, Error::UnknownBackend { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_local_builder() {
        let dir = tempfile::TempDir::new().unwrap();
        let endpoint = StorageEndpoint {
            backend: "file".to_string(),
            endpoint: dir.path().join("root").to_string_lossy().to_string(),
            ..Default::default()
        };

        let store = LocalDiskBuilder::default().build(&endpoint).await.unwrap();
        assert!(dir.path().join("root").is_dir());
        assert!(store.as_file_system().is_some());
    }
}
