//! Sync Core - Foundation for the multi-backend sync tool
//!
//! Provides the error taxonomy, configuration, and the data model shared
//! by the storage factory and every object storage backend.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ListingConfig, SyncConfig};
pub use error::{Error, Result};
pub use types::*;
