//! Buffer pool — an LRU cache of raw page bytes.
//!
//! Keys are `(file path, byte offset)` pairs; values are the serialized
//! page bytes as read from or written to disk.  Cached pages are plain
//! byte vectors, never shared mutable state — a reader copies or
//! re-parses them.
//!
//! The pool is not thread-safe; the engine serializes access.

#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use tracing::trace;

/// Cache key: owning file plus page offset within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    /// Path of the file the page belongs to.
    pub path: PathBuf,
    /// Byte offset of the page within the file.
    pub offset: u64,
}

/// LRU cache of decoded page bytes, capacity measured in pages.
pub struct BufferPool {
    cache: LruCache<PageKey, Vec<u8>>,
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("len", &self.cache.len())
            .field("capacity", &self.cache.cap())
            .finish()
    }
}

impl BufferPool {
    /// Create a pool holding at most `capacity` pages (minimum 1).
    pub fn new(capacity: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1) as usize)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// Fetch the cached bytes for `(path, offset)`, promoting the entry to
    /// most-recently used.
    pub fn get(&mut self, path: &Path, offset: u64) -> Option<&Vec<u8>> {
        let key = PageKey {
            path: path.to_path_buf(),
            offset,
        };
        self.cache.get(&key)
    }

    /// Whether `(path, offset)` is currently cached (no promotion).
    pub fn contains(&self, path: &Path, offset: u64) -> bool {
        let key = PageKey {
            path: path.to_path_buf(),
            offset,
        };
        self.cache.contains(&key)
    }

    /// Insert (or refresh) the bytes for `(path, offset)`, evicting the
    /// least-recently used entry when the pool is full.
    pub fn put(&mut self, bytes: Vec<u8>, path: &Path, offset: u64) {
        let key = PageKey {
            path: path.to_path_buf(),
            offset,
        };
        self.cache.put(key, bytes);
    }

    /// Evict every entry whose file path starts with `prefix`.
    ///
    /// Used when a WAL segment or a retention-expired window directory is
    /// deleted.
    pub fn remove_prefix(&mut self, prefix: &Path) {
        let doomed: Vec<PageKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.path.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.cache.pop(key);
        }
        if !doomed.is_empty() {
            trace!(prefix = %prefix.display(), evicted = doomed.len(), "buffer pool prefix eviction");
        }
    }

    /// Number of cached pages.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
