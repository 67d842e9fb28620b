//! Core type definitions shared by the factory and the backends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix marking a key as a directory placeholder
pub const DIR_SUFFIX: &str = "/";

/// Returns true if `key` names a directory placeholder
pub fn is_dir_key(key: &str) -> bool {
    key.ends_with(DIR_SUFFIX)
}

/// A single listed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    /// Slash-separated key, unique within its store
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Last modification time
    pub mtime: DateTime<Utc>,
}

impl Object {
    pub fn new(key: impl Into<String>, size: u64, mtime: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            size,
            mtime,
        }
    }
}

/// A parsed source or destination, ready to hand to a backend builder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageEndpoint {
    /// Lowercased backend name (`file`, `s3`, `sftp`, ...)
    pub backend: String,

    /// Address the backend connects to, scheme already applied
    pub endpoint: String,

    /// Host with optional port, empty for local paths
    pub host: String,

    /// Path component of the specification, including its leading slash
    pub path: String,

    /// Access key or user name
    pub access_key: String,

    /// Secret key or password
    pub secret_key: String,
}

impl StorageEndpoint {
    /// Key prefix to apply on top of the constructed store, if any
    ///
    /// Local stores use the path as their root and remote-shell stores
    /// receive it as part of the endpoint, so neither is wrapped.
    pub fn key_prefix(&self) -> Option<&str> {
        if self.backend == "file" || self.backend == "sftp" {
            return None;
        }
        match self.path.strip_prefix('/') {
            Some(prefix) if !prefix.is_empty() => Some(prefix),
            _ => None,
        }
    }
}
