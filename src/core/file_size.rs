//! Memoized file length lookups
//!
//! Each path is queried against the filesystem exactly once. The result,
//! including "does not exist", is cached for the lifetime of the cache and
//! is never refreshed.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Cached result of one length query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSizeEntry {
    pub exists: bool,
    pub length: u64,
}

impl FileSizeEntry {
    const MISSING: FileSizeEntry = FileSizeEntry {
        exists: false,
        length: 0,
    };

    fn query(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => FileSizeEntry {
                exists: true,
                length: meta.len(),
            },
            _ => Self::MISSING,
        }
    }
}

/// File size cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileSizeStats {
    /// Number of cached paths
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that queried the filesystem
    pub misses: u64,
    /// Largest file length observed
    pub max_file_size: u64,
}

/// Path-keyed cache of `(exists, length)` pairs
#[derive(Debug, Default)]
pub struct FileSizeCache {
    entries: Mutex<AHashMap<PathBuf, FileSizeEntry>>,
    max_file_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileSizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `(exists, length)` for `path`
    ///
    /// Only the first call per path touches the filesystem. The query runs
    /// under the cache lock so concurrent first lookups still stat once.
    pub fn get_size<P: AsRef<Path>>(&self, path: P) -> (bool, u64) {
        let path = path.as_ref();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(path) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return (entry.exists, entry.length);
        }

        let entry = FileSizeEntry::query(path);
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Size lookup for {:?}: exists={} length={}",
            path, entry.exists, entry.length
        );

        if entry.exists {
            self.max_file_size.fetch_max(entry.length, Ordering::Relaxed);
        }
        entries.insert(path.to_path_buf(), entry);
        (entry.exists, entry.length)
    }

    /// Whether the length lookup for `path` succeeded
    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.get_size(path).0
    }

    /// Largest file length seen by any lookup so far
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> FileSizeStats {
        FileSizeStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            max_file_size: self.max_file_size(),
        }
    }
}
