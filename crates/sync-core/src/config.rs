//! Sync configuration types consumed by the storage factory

use serde::{Deserialize, Serialize};

/// Environment variable whose presence suppresses the remote-shell password prompt
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "SSH_PRIVATE_KEY_PATH";

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Use plain HTTP for every remote endpoint
    pub no_https: bool,

    /// Preserve POSIX permissions and ownership
    ///
    /// Cleared by the factory when a constructed store cannot honor it.
    pub perms: bool,

    /// Name of the private-key environment variable
    pub private_key_env: String,

    /// Listing settings
    pub listing: ListingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            no_https: false,
            perms: false,
            private_key_env: DEFAULT_PRIVATE_KEY_ENV.to_string(),
            listing: ListingConfig::default(),
        }
    }
}

/// Listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Capacity of the buffer between a traversal and its consumer
    pub buffer_size: usize,

    /// Number of keys requested per `list` call by paging helpers
    pub page_size: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10240,
            page_size: 1000,
        }
    }
}
