//! Lexically ordered, pre-order filesystem traversal
//!
//! Directory names are compared with a trailing `/` appended, so a walk
//! visits entries in exactly the order of the keys they map to: `b.txt`
//! comes before everything under `b/`, which comes before `b0`.
//! Symbolic links are always followed. A link pointing at one of its
//! ancestors is reported as a traversal error.

use std::cmp::Ordering;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use sync_core::{Error, Result, DIR_SUFFIX};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// A visited filesystem entry
#[derive(Debug)]
pub struct WalkEntry {
    /// Absolute path of the entry
    pub path: PathBuf,

    /// Path relative to the walk root, `/` separated, empty for the root
    pub relative: String,

    /// Metadata with symbolic links resolved
    pub metadata: Metadata,
}

impl WalkEntry {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }
}

/// Lazy iterator over every entry below a root, the root included
///
/// Directories are read only when the walk reaches them. The first error
/// ends the walk: it is yielded once and every later call returns `None`.
pub struct PathWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    excluded: Option<String>,
    done: bool,
}

impl PathWalker {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let inner = WalkDir::new(&root)
            .follow_links(true)
            .sort_by(key_order)
            .into_iter();

        Self {
            root,
            inner,
            excluded: None,
            done: false,
        }
    }

    /// Leave out the top-level entry `name` and everything below it
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded = Some(name.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn fail(&mut self, err: walkdir::Error) -> Option<Result<WalkEntry>> {
        self.done = true;
        let path = err.path().unwrap_or(&self.root).display().to_string();
        Some(Err(Error::Traversal {
            path,
            message: err.to_string(),
        }))
    }

    fn skip(&mut self, entry: &DirEntry) {
        if entry.file_type().is_dir() {
            self.inner.skip_current_dir();
        }
    }
}

impl Iterator for PathWalker {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return self.fail(e),
            };

            let relative = match entry.path().strip_prefix(&self.root).ok().and_then(Path::to_str) {
                Some(relative) => relative.to_string(),
                None => {
                    warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                    self.skip(&entry);
                    continue;
                }
            };

            if entry.depth() == 1 && self.excluded.as_deref() == Some(relative.as_str()) {
                self.skip(&entry);
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => return self.fail(e),
            };

            return Some(Ok(WalkEntry {
                path: entry.into_path(),
                relative,
                metadata,
            }));
        }
    }
}

/// Sibling order: names compared as keys, directories carrying a trailing `/`
fn key_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    sort_name(a).cmp(&sort_name(b))
}

// Entries are sorted before links are resolved, so a link to a directory
// has to be checked through its target.
fn sort_name(entry: &DirEntry) -> String {
    let mut name = entry.file_name().to_string_lossy().into_owned();
    let file_type = entry.file_type();
    if file_type.is_dir() || (file_type.is_symlink() && entry.path().is_dir()) {
        name.push_str(DIR_SUFFIX);
    }
    name
}
