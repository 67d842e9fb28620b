//! Storage - Object storage abstraction for the sync tool
//!
//! Lets a copy/sync engine drive heterogeneous key-addressed stores
//! through one contract:
//! - [`ObjectStorage`]: get/put/copy/delete/exists/list/chtimes
//! - [`LocalDiskStore`]: the local filesystem, with flat sorted listing
//! - [`StorageFactory`]: specification strings to constructed stores
//! - Amazon S3 / S3-compatible storage (with `s3` feature)
//!
//! # Example
//!
//! ```no_run
//! use storage::{list_all, StorageFactory};
//! use sync_core::SyncConfig;
//!
//! # async fn example() -> sync_core::Result<()> {
//! let mut factory = StorageFactory::new(SyncConfig::default());
//! let created = factory.create("/tmp/photos/").await?;
//! for object in list_all(created.store.as_ref(), "", 1000).await? {
//!     println!("{} {}", object.key, object.size);
//! }
//! # Ok(())
//! # }
//! ```

mod backend;
mod credentials;
mod factory;
mod https;
mod listing;
mod local;
mod prefix;
mod registry;
mod walk;

#[cfg(feature = "s3")]
mod s3;

pub use backend::{list_all, FileSystem, ObjectReader, ObjectStorage};
pub use credentials::{CredentialProvider, NoPrompt, StaticPassword, TerminalPrompt};
pub use factory::{CreatedStorage, StorageFactory, REMOTE_SHELL_BACKEND};
pub use https::{apply_scheme, supports_https, PLAIN_HTTP_RULES};
pub use listing::{ListingCursor, DEFAULT_BUFFER_SIZE};
pub use local::{LocalDiskStore, STAGING_DIR};
pub use prefix::{with_prefix, PrefixedStorage};
pub use registry::{LocalDiskBuilder, StorageBuilder, StorageRegistry};
pub use walk::{PathWalker, WalkEntry};

#[cfg(feature = "s3")]
pub use s3::{S3Builder, S3Config, S3Storage};
