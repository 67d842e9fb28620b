//! Flat, sorted listing synthesized from a filesystem walk
//!
//! A cursor owns one background traversal. The walk runs on the blocking
//! pool and pushes matching objects into a bounded channel: the producer
//! stalls when the buffer is full and the consumer waits when it is empty.
//! Dropping the cursor closes the channel, which stops the walk at its
//! next send.

use chrono::{DateTime, Utc};
use sync_core::{Error, Object, Result};
use tokio::sync::mpsc;
use tracing::debug;

use crate::walk::PathWalker;

/// Default capacity of the traversal buffer
pub const DEFAULT_BUFFER_SIZE: usize = 10240;

/// A resumable listing over one traversal
///
/// Yields every non-directory key under `prefix` that is `>= marker`, in
/// ascending order. The key of the last object handed out is the
/// continuation token for a later page.
pub struct ListingCursor {
    prefix: String,
    rx: mpsc::Receiver<Result<Object>>,
    last_key: Option<String>,
    pending_error: Option<Error>,
    exhausted: bool,
}

impl ListingCursor {
    /// Run `walker` in the background
    ///
    /// Keys are the walked paths relative to the walker's root. Must be
    /// called from within a Tokio runtime.
    pub fn start(walker: PathWalker, prefix: &str, marker: &str, buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let walk_prefix = prefix.to_string();
        let walk_marker = marker.to_string();

        tokio::task::spawn_blocking(move || {
            produce(walker, &walk_prefix, &walk_marker, tx);
        });

        Self {
            prefix: prefix.to_string(),
            rx,
            last_key: None,
            pending_error: None,
            exhausted: false,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the last object returned, if any
    pub fn continuation_token(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    /// Returns true once the traversal has been fully drained
    pub fn is_finished(&self) -> bool {
        self.exhausted && self.pending_error.is_none()
    }

    /// Next object, or `None` at the end
    pub async fn next(&mut self) -> Option<Result<Object>> {
        match self.next_page(1).await {
            Ok(mut page) => page.pop().map(Ok),
            Err(e) => Some(Err(e)),
        }
    }

    /// Take up to `limit` objects
    ///
    /// A traversal failure is held back until the page that would
    /// otherwise be empty, and is returned only once.
    pub async fn next_page(&mut self, limit: usize) -> Result<Vec<Object>> {
        let mut objects = Vec::new();

        while objects.len() < limit && !self.exhausted {
            match self.rx.recv().await {
                Some(Ok(object)) => objects.push(object),
                Some(Err(e)) => {
                    self.pending_error = Some(e);
                    self.exhausted = true;
                }
                None => self.exhausted = true,
            }
        }

        if objects.is_empty() {
            if let Some(e) = self.pending_error.take() {
                return Err(e);
            }
            return Ok(objects);
        }

        self.last_key = objects.last().map(|o| o.key.clone());
        Ok(objects)
    }
}

/// Feed matching objects into `tx` until the walk ends or the receiver
/// goes away. Returns the number of entries examined.
fn produce(
    walker: PathWalker,
    prefix: &str,
    marker: &str,
    tx: mpsc::Sender<Result<Object>>,
) -> usize {
    let root = walker.root().to_path_buf();
    let mut visited = 0usize;
    let mut sent = 0usize;

    for entry in walker {
        if tx.is_closed() {
            debug!(root = %root.display(), visited, sent, "Listing abandoned, stopping traversal");
            return visited;
        }
        visited += 1;

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return visited;
            }
        };

        if entry.is_dir() {
            continue;
        }
        // The root itself is a plain file: nothing to list below it.
        if entry.relative.is_empty() {
            continue;
        }
        let key = entry.relative;
        if key.as_str() < marker || !key.starts_with(prefix) {
            continue;
        }

        let mtime = entry
            .metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_default();
        let object = Object::new(key, entry.metadata.len(), mtime);

        if tx.blocking_send(Ok(object)).is_err() {
            debug!(root = %root.display(), visited, sent, "Listing abandoned, stopping traversal");
            return visited;
        }
        sent += 1;
    }

    debug!(root = %root.display(), visited, sent, "Traversal complete");
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel.as_bytes()).unwrap();
    }

    fn keys(objects: &[Object]) -> Vec<&str> {
        objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_cursor_pages() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");
        touch(dir.path(), "b/c.txt");
        touch(dir.path(), "b/d.txt");
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let mut cursor = ListingCursor::start(PathWalker::new(dir.path()), "", "", 4);

        let page = cursor.next_page(2).await.unwrap();
        assert_eq!(keys(&page), vec!["a.txt", "b/c.txt"]);
        assert_eq!(cursor.continuation_token(), Some("b/c.txt"));

        let page = cursor.next_page(2).await.unwrap();
        assert_eq!(keys(&page), vec!["b/d.txt"]);

        assert!(cursor.next_page(2).await.unwrap().is_empty());
        assert!(cursor.is_finished());
    }

    #[tokio::test]
    async fn test_cursor_prefix_and_marker() {
        let dir = TempDir::new().unwrap();
        for rel in ["a/1", "a/2", "a/3", "b/1"] {
            touch(dir.path(), rel);
        }

        let mut cursor = ListingCursor::start(PathWalker::new(dir.path()), "a/", "a/2", 16);
        let page = cursor.next_page(10).await.unwrap();
        assert_eq!(keys(&page), vec!["a/2", "a/3"]);
    }

    #[tokio::test]
    async fn test_cursor_reports_error_once() {
        let dir = TempDir::new().unwrap();
        let mut cursor = ListingCursor::start(PathWalker::new(dir.path().join("missing")), "", "", 16);

        assert!(matches!(
            cursor.next_page(10).await,
            Err(Error::Traversal { .. })
        ));
        assert!(cursor.next_page(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_cursor_releases_producer() {
        let dir = TempDir::new().unwrap();
        for i in 0..64 {
            touch(dir.path(), &format!("f{:03}", i));
        }

        let mut cursor = ListingCursor::start(PathWalker::new(dir.path()), "", "", 1);
        let first = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.key, "f000");
        drop(cursor);

        // The producer is parked on a full buffer; closing the channel must
        // release it rather than leave the blocking pool occupied.
        let mut fresh = ListingCursor::start(PathWalker::new(dir.path()), "", "f063", 1);
        assert_eq!(fresh.next().await.unwrap().unwrap().key, "f063");
    }

    #[test]
    fn test_closed_receiver_stops_walk_without_matches() {
        let dir = TempDir::new().unwrap();
        for i in 0..64 {
            touch(dir.path(), &format!("d{}/f{:03}", i % 4, i));
        }

        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let visited = produce(PathWalker::new(dir.path()), "nomatch/", "", tx);
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_produce_walks_whole_tree_while_receiver_lives() {
        let dir = TempDir::new().unwrap();
        for i in 0..8 {
            touch(dir.path(), &format!("d/f{}", i));
        }

        let (tx, _rx) = mpsc::channel(1);
        // root, d, and eight files; nothing matches so nothing is sent
        let visited = produce(PathWalker::new(dir.path()), "nomatch/", "", tx);
        assert_eq!(visited, 10);
    }
}
