//! Error types shared by the storage factory and every backend

use thiserror::Error;

/// Result type alias using the sync Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for storage construction and per-key operations
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unknown storage backend: {name}")]
    UnknownBackend { name: String },

    // Construction errors
    #[error("Credential rejected for {backend}: {message}")]
    Credential { backend: String, message: String },

    #[error("Create {backend} {endpoint}: {message}")]
    Create {
        backend: String,
        endpoint: String,
        message: String,
    },

    // Per-key errors
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Listing failed at {path}: {message}")]
    Traversal { path: String, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("{operation} is not supported by {backend}")]
    Unsupported { backend: String, operation: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Shorthand for a missing key
    pub fn not_found(key: impl Into<String>) -> Self {
        Error::NotFound { key: key.into() }
    }

    /// Returns true if this error reports a missing key
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage { .. } | Error::Traversal { .. })
    }

    /// Returns true if the process cannot proceed
    ///
    /// Fatal errors come from configuration and are raised before any I/O.
    /// Everything else is a value the caller may retry or report.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidConfig { .. } | Error::UnknownBackend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_fatal() {
        let err = Error::InvalidConfig {
            message: "SRC and DST should both end with '/' or not".to_string(),
        };
        assert!(err.is_fatal());

        let err = Error::UnknownBackend {
            name: "nosuch".to_string(),
        };
        assert!(err.is_fatal());

        let err = Error::Create {
            backend: "s3".to_string(),
            endpoint: "https://bucket.s3.amazonaws.com".to_string(),
            message: "access denied".to_string(),
        };
        assert!(!err.is_fatal());

        let err = Error::Credential {
            backend: "sftp".to_string(),
            message: "auth rejected".to_string(),
        };
        assert!(!err.is_fatal());

        let err = Error::Internal {
            message: "chtimes task failed".to_string(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::not_found("a.txt").is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(Error::Io(io).is_not_found());

        let err = Error::Storage {
            message: "timeout".to_string(),
        };
        assert!(!err.is_not_found());
        assert!(err.is_retryable());
    }
}
