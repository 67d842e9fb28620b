//! Local filesystem storage backend
//!
//! Maps keys directly onto paths below a root directory and synthesizes
//! flat, sorted, paginated listing from a lexical walk of the tree.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use sync_core::{is_dir_key, Error, Object, Result, DIR_SUFFIX};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::backend::{FileSystem, ObjectReader, ObjectStorage};
use crate::listing::{ListingCursor, DEFAULT_BUFFER_SIZE};
use crate::walk::PathWalker;

/// Directory below the root that holds in-flight writes; never listed
pub const STAGING_DIR: &str = ".sync-staging";

/// Listing state carried between `list` calls
struct ListingSession {
    cursor: ListingCursor,
    last_listed: String,
}

/// Local filesystem storage backend
///
/// `list` keeps one traversal alive between calls. A call whose marker is
/// the last key of the previous page continues that traversal; any other
/// marker discards it and walks again from the root, skipping everything
/// below the marker. Sessions are serialized per instance. Use
/// [`LocalDiskStore::cursor`] for independent listings.
///
/// Writes are staged under [`STAGING_DIR`] and renamed into place, so a
/// listing never sees a partial object. Keys below that directory are
/// reserved.
pub struct LocalDiskStore {
    /// Root directory, always ending with `/`
    root: String,
    buffer_size: usize,
    session: Mutex<Option<ListingSession>>,
}

impl LocalDiskStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<String>) -> Result<Self> {
        let mut root = root.into();
        if !root.ends_with(DIR_SUFFIX) {
            root.push_str(DIR_SUFFIX);
        }

        fs::create_dir_all(&root).await.map_err(|e| Error::Storage {
            message: format!("Failed to create root {}: {}", root, e),
        })?;

        Ok(Self {
            root,
            buffer_size: DEFAULT_BUFFER_SIZE,
            session: Mutex::new(None),
        })
    }

    /// Set the capacity of the listing buffer
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        Path::new(&self.root)
    }

    /// Resolve a key to its path below the root
    fn path(&self, key: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.root, key))
    }

    fn staging_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.root, STAGING_DIR))
    }

    /// Generate a unique temporary path in the staging directory
    fn temp_path(&self) -> PathBuf {
        self.staging_dir().join(format!("{}.tmp", Uuid::new_v4()))
    }

    /// Start an independent listing owned by the caller
    ///
    /// Dropping the cursor stops its traversal. Must be called from within
    /// a Tokio runtime.
    pub fn cursor(&self, prefix: &str, marker: &str) -> ListingCursor {
        let walker = PathWalker::new(&self.root).exclude(STAGING_DIR);
        ListingCursor::start(walker, prefix, marker, self.buffer_size)
    }

    fn map_not_found(key: &str, e: std::io::Error) -> Error {
        if e.kind() == ErrorKind::NotFound {
            Error::not_found(key)
        } else {
            Error::Io(e)
        }
    }
}

impl fmt::Display for LocalDiskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file://{}", self.root)
    }
}

impl fmt::Debug for LocalDiskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDiskStore")
            .field("root", &self.root)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

#[async_trait]
impl ObjectStorage for LocalDiskStore {
    #[instrument(skip(self), fields(backend = "file"))]
    async fn get(&self, key: &str, offset: u64, limit: i64) -> Result<ObjectReader> {
        let path = self.path(key);
        debug!(?path, "Opening file");

        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_not_found(key, e))?;

        if offset > 0 {
            file.seek(std::io::SeekFrom::Start(offset)).await?;
        }

        if limit > 0 {
            Ok(Box::new(file.take(limit as u64)))
        } else {
            Ok(Box::new(file))
        }
    }

    #[instrument(skip(self, data), fields(backend = "file"))]
    async fn put(&self, key: &str, mut data: ObjectReader) -> Result<()> {
        let path = self.path(key);

        if is_dir_key(key) {
            debug!(?path, "Ensuring directory");
            fs::create_dir_all(&path).await?;
            return Ok(());
        }

        let staging = self.staging_dir();
        for dir in path.parent().into_iter().chain([staging.as_path()]) {
            fs::create_dir_all(dir).await.map_err(|e| Error::Storage {
                message: format!("Failed to create directory {:?}: {}", dir, e),
            })?;
        }

        let temp_path = self.temp_path();
        debug!(?path, ?temp_path, "Writing file atomically");

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            let size = tokio::io::copy(&mut data, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(size)
        }
        .await;

        let size = match written {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(Error::Io(e));
            }
        };

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| Error::Storage {
                message: format!("Failed to rename {:?} to {:?}: {}", temp_path, path, e),
            })?;

        debug!(?path, size, "File written");
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn exists(&self, key: &str) -> Result<()> {
        match fs::metadata(self.path(key)).await {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::not_found(key)),
        }
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| Error::not_found(key))?;

        debug!(?path, "Deleting");
        if metadata.is_dir() {
            fs::remove_dir(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn list(&self, prefix: &str, marker: &str, limit: usize) -> Result<Vec<Object>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut session = self.session.lock().await;

        let resume = matches!(
            session.as_ref(),
            Some(s) if s.last_listed == marker && s.cursor.prefix() == prefix
        );
        if !resume {
            debug!(prefix, marker, "Starting new traversal");
            *session = Some(ListingSession {
                cursor: self.cursor(prefix, marker),
                last_listed: String::new(),
            });
        }

        let Some(state) = session.as_mut() else {
            return Ok(Vec::new());
        };
        let page = match state.cursor.next_page(limit).await {
            Ok(page) => page,
            Err(e) => {
                *session = None;
                return Err(e);
            }
        };

        match page.last() {
            Some(last) => state.last_listed = last.key.clone(),
            None => *session = None,
        }

        debug!(count = page.len(), "Listed objects");
        Ok(page)
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn chtimes(&self, key: &str, mtime: DateTime<Utc>) -> Result<()> {
        let path = self.path(key);
        let time = FileTime::from_system_time(SystemTime::from(mtime));

        tokio::task::spawn_blocking(move || filetime::set_file_times(&path, time, time))
        .await
        .map_err(|e| Error::Internal {
            message: format!("chtimes task failed: {}", e),
        })?
        .map_err(|e| Self::map_not_found(key, e))
    }

    fn as_file_system(&self) -> Option<&dyn FileSystem> {
        Some(self)
    }
}

#[async_trait]
impl FileSystem for LocalDiskStore {
    #[instrument(skip(self), fields(backend = "file"))]
    async fn chmod(&self, key: &str, mode: u32) -> Result<()> {
        let path = self.path(key);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| Self::map_not_found(key, e))
        }

        #[cfg(not(unix))]
        {
            let _ = (path, mode);
            Err(Error::Unsupported {
                backend: "file".to_string(),
                operation: "chmod".to_string(),
            })
        }
    }

    #[instrument(skip(self), fields(backend = "file"))]
    async fn chown(&self, key: &str, uid: u32, gid: u32) -> Result<()> {
        let path = self.path(key);

        #[cfg(unix)]
        {
            tokio::task::spawn_blocking(move || std::os::unix::fs::chown(&path, Some(uid), Some(gid)))
                .await
                .map_err(|e| Error::Internal {
                    message: format!("chown task failed: {}", e),
                })?
                .map_err(|e| Self::map_not_found(key, e))
        }

        #[cfg(not(unix))]
        {
            let _ = (path, uid, gid);
            Err(Error::Unsupported {
                backend: "file".to_string(),
                operation: "chown".to_string(),
            })
        }
    }
}
