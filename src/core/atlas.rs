//! The atlas coordinator
//!
//! Composes the tracked arena, the file size cache and the mapping registry
//! behind one API. Allocation and free require a [`LockToken`] from this
//! atlas; size lookups and mapping requests use their own narrower locks so
//! read-mostly traffic is not serialized behind allocations.

use crate::config::AtlasConfig;
use crate::core::arena::{Block, TrackedArena};
use crate::core::file_size::FileSizeCache;
use crate::core::lock::{AtlasLock, LockToken};
use crate::core::mapping::{MappedFile, MappedFileRegistry};
use crate::error::{AtlasError, Result};
use serde::Serialize;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

static NEXT_ATLAS_ID: AtomicU64 = AtomicU64::new(1);

/// Snapshot of atlas counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AtlasStats {
    pub atlas_id: u64,
    pub use_locking: bool,
    pub live_blocks: usize,
    pub allocated_bytes: u64,
    pub external_handles: usize,
    pub external_bytes: u64,
    pub mappings: usize,
    pub mapped_bytes: u64,
    pub mappings_created: u64,
    pub size_cache_entries: usize,
    pub size_cache_hits: u64,
    pub size_cache_misses: u64,
    pub max_file_size: u64,
}

impl AtlasStats {
    /// Arena plus externally registered bytes
    pub fn memory_in_use(&self) -> u64 {
        self.allocated_bytes + self.external_bytes
    }
}

/// Shared memory atlas
pub struct Atlas {
    id: u64,
    config: AtlasConfig,
    lock: AtlasLock,
    arena: Arc<TrackedArena>,
    sizes: FileSizeCache,
    mappings: MappedFileRegistry,
    over_bound: AtomicBool,
    /// Leak already reported through `close`
    closed: bool,
}

impl Atlas {
    /// Create an atlas with default settings and the given locking mode
    pub fn new(use_locking: bool) -> Self {
        Self::with_config(AtlasConfig::default().with_locking(use_locking))
    }

    pub fn with_config(config: AtlasConfig) -> Self {
        let id = NEXT_ATLAS_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            "Creating atlas {} (locking={}, memory_bound={:?})",
            id, config.use_locking, config.memory_bound
        );

        Atlas {
            id,
            lock: AtlasLock::new(config.use_locking),
            config,
            arena: Arc::new(TrackedArena::new()),
            sizes: FileSizeCache::new(),
            mappings: MappedFileRegistry::new(),
            over_bound: AtomicBool::new(false),
            closed: false,
        }
    }

    /// Create an atlas meant to be shared by handle from a single root
    pub fn shared(config: AtlasConfig) -> Arc<Self> {
        Arc::new(Self::with_config(config))
    }

    /// Process-unique id of this atlas
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn uses_locking(&self) -> bool {
        self.lock.is_enabled()
    }

    /// Acquire the atlas-wide lock for one call
    pub fn lock(&self) -> LockToken<'_> {
        self.lock.acquire(self.id)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    fn check_token(&self, token: &LockToken<'_>) -> Result<()> {
        if token.atlas_id() == self.id {
            Ok(())
        } else {
            Err(AtlasError::ForeignLock)
        }
    }

    /// Allocate a tracked block; `size` 0 is served as 1 byte
    pub fn allocate(&self, size: usize, token: &LockToken<'_>, zero_fill: bool) -> Result<Block> {
        self.check_token(token)?;
        let block = self.arena.allocate(size, zero_fill)?;
        self.check_memory_bound();
        Ok(block)
    }

    /// Free a block detached with [`Block::into_raw`]
    ///
    /// Returns `false` for unknown pointers and for tokens from another atlas.
    pub fn free(&self, ptr: NonNull<u8>, token: &LockToken<'_>) -> bool {
        if self.check_token(token).is_err() {
            warn!("Free of {:p} with a token from atlas {}", ptr, token.atlas_id());
            return false;
        }
        let freed = self.arena.free(ptr);
        self.check_memory_bound();
        freed
    }

    /// Account for memory owned elsewhere (e.g. bytes of a mapping)
    pub fn register_external(&self, handle: usize, size: u64) -> Result<()> {
        self.arena.register_external(handle, size)?;
        self.check_memory_bound();
        Ok(())
    }

    pub fn unregister_external(&self, handle: usize) -> bool {
        let removed = self.arena.unregister_external(handle);
        self.check_memory_bound();
        removed
    }

    /// `(exists, length)` of `path`, queried once and cached for good
    pub fn get_file_size<P: AsRef<Path>>(&self, path: P) -> (bool, u64) {
        self.sizes.get_size(path)
    }

    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.sizes.exists(path)
    }

    /// Largest file length any size lookup has seen
    pub fn max_file_size(&self) -> u64 {
        self.sizes.max_file_size()
    }

    /// Shared read-only mapping of `path`
    pub fn get_memory_file<P: AsRef<Path>>(&self, path: P) -> Result<Arc<MappedFile>> {
        self.mappings.get_mapping(path)
    }

    /// Arena plus externally registered bytes
    pub fn memory_in_use(&self) -> u64 {
        self.arena.total_bytes()
    }

    fn check_memory_bound(&self) {
        let Some(bound) = self.config.memory_bound else {
            return;
        };
        let in_use = self.memory_in_use();
        if in_use > bound {
            if !self.over_bound.swap(true, Ordering::Relaxed) {
                warn!(
                    "Atlas {} memory in use {} exceeds bound {}",
                    self.id, in_use, bound
                );
            }
        } else if self.over_bound.swap(false, Ordering::Relaxed) {
            debug!("Atlas {} back under memory bound ({} bytes)", self.id, in_use);
        }
    }

    pub fn stats(&self) -> AtlasStats {
        let arena = self.arena.stats();
        let mappings = self.mappings.stats();
        let sizes = self.sizes.stats();

        AtlasStats {
            atlas_id: self.id,
            use_locking: self.uses_locking(),
            live_blocks: arena.live_blocks,
            allocated_bytes: arena.allocated_bytes,
            external_handles: arena.external_handles,
            external_bytes: arena.external_bytes,
            mappings: mappings.mappings,
            mapped_bytes: mappings.mapped_bytes,
            mappings_created: mappings.mappings_created,
            size_cache_entries: sizes.entries,
            size_cache_hits: sizes.hits,
            size_cache_misses: sizes.misses,
            max_file_size: sizes.max_file_size,
        }
    }

    /// Tear the atlas down, failing if any arena block is still live
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let stats = self.arena.stats();
        if stats.live_blocks > 0 {
            error!(
                "Atlas {} closed with {} live blocks ({} bytes)",
                self.id, stats.live_blocks, stats.allocated_bytes
            );
            return Err(AtlasError::LeakedBlocks {
                blocks: stats.live_blocks,
                bytes: stats.allocated_bytes,
            });
        }
        Ok(())
    }
}

impl Drop for Atlas {
    fn drop(&mut self) {
        let stats = self.arena.stats();
        if stats.live_blocks > 0 && !self.closed {
            error!(
                "Atlas {} dropped with {} live blocks ({} bytes)",
                self.id, stats.live_blocks, stats.allocated_bytes
            );
        }
        info!(
            "Dropping atlas {} ({} mappings)",
            self.id,
            self.mappings.len()
        );
    }
}

impl std::fmt::Debug for Atlas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atlas")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}
