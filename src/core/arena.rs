//! Tracked raw-allocation arena
//!
//! Heap blocks handed out when mapping a file is unsuitable. Every live block
//! is recorded by address together with its size, so the running total always
//! equals the sum of live block sizes and leaks are detectable at teardown.
//!
//! Blocks are returned as move-only [`Block`] handles that free themselves on
//! drop. A handle can be detached with [`Block::into_raw`]; detached blocks
//! stay in the pool until [`TrackedArena::free`] is called with the pointer.

use crate::error::{AtlasError, Result};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Alignment of every arena block
pub const BLOCK_ALIGN: usize = 16;

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    size: usize,
    /// Owned by a raw pointer rather than a live `Block`
    detached: bool,
}

#[derive(Debug, Default)]
struct ArenaState {
    blocks: AHashMap<usize, BlockEntry>,
    /// Running total of live block sizes
    allocated: u64,
    external: AHashMap<usize, u64>,
    external_bytes: u64,
}

/// Arena statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Number of live blocks in the pool
    pub live_blocks: usize,
    /// Running allocation total
    pub allocated_bytes: u64,
    /// Sum of the recorded sizes of live blocks
    pub recorded_bytes: u64,
    /// Number of registered external handles
    pub external_handles: usize,
    /// Bytes registered by external owners
    pub external_bytes: u64,
}

impl ArenaStats {
    /// Arena plus external bytes
    pub fn total_bytes(&self) -> u64 {
        self.allocated_bytes + self.external_bytes
    }
}

/// Size-tracked pool of raw heap blocks
#[derive(Debug, Default)]
pub struct TrackedArena {
    state: Mutex<ArenaState>,
}

impl TrackedArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn layout(size: usize) -> Result<Layout> {
        Layout::from_size_align(size, BLOCK_ALIGN).map_err(|_| {
            AtlasError::InvalidArgument(format!("allocation of {size} bytes is too large"))
        })
    }

    /// Allocate a block of at least one byte
    ///
    /// A request for 0 bytes is served as a 1-byte block. Without
    /// `zero_fill` the contents are unspecified until written.
    pub fn allocate(self: &Arc<Self>, size: usize, zero_fill: bool) -> Result<Block> {
        let size = size.max(1);
        let layout = Self::layout(size)?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe {
            if zero_fill {
                alloc::alloc_zeroed(layout)
            } else {
                alloc::alloc(layout)
            }
        };
        let ptr = NonNull::new(raw).ok_or(AtlasError::OutOfMemory { size })?;

        {
            let mut state = self.state.lock();
            state.blocks.insert(
                ptr.as_ptr() as usize,
                BlockEntry {
                    size,
                    detached: false,
                },
            );
            state.allocated += size as u64;
        }
        debug!("Allocated {} bytes at {:p} (zero_fill={})", size, ptr, zero_fill);

        Ok(Block {
            ptr,
            len: size,
            arena: Arc::clone(self),
            detached: false,
        })
    }

    /// Free a detached block by address
    ///
    /// Returns `false` without touching the pool when `ptr` is unknown or is
    /// still owned by a live [`Block`].
    pub fn free(&self, ptr: NonNull<u8>) -> bool {
        self.release(ptr, true)
    }

    fn release(&self, ptr: NonNull<u8>, require_detached: bool) -> bool {
        let addr = ptr.as_ptr() as usize;
        let size = {
            let mut state = self.state.lock();
            match state.blocks.get(&addr).copied() {
                Some(entry) if entry.detached || !require_detached => {
                    state.blocks.remove(&addr);
                    state.allocated -= entry.size as u64;
                    entry.size
                }
                Some(_) => {
                    warn!("Refusing to free {:p}: still owned by a live block handle", ptr);
                    return false;
                }
                None => {
                    warn!("Free of unknown pointer {:p}", ptr);
                    return false;
                }
            }
        };

        // SAFETY: the entry proves `ptr` came from `allocate` with this size,
        // and removing it under the lock means nobody else can release it.
        unsafe {
            alloc::dealloc(
                ptr.as_ptr(),
                Layout::from_size_align_unchecked(size, BLOCK_ALIGN),
            )
        };
        debug!("Freed {} bytes at {:p}", size, ptr);
        true
    }

    fn detach(&self, ptr: NonNull<u8>) {
        if let Some(entry) = self.state.lock().blocks.get_mut(&(ptr.as_ptr() as usize)) {
            entry.detached = true;
        }
    }

    /// Account for memory owned elsewhere
    ///
    /// Registering the same handle twice without unregistering is an error.
    pub fn register_external(&self, handle: usize, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.external.contains_key(&handle) {
            warn!("External handle {:#x} registered twice", handle);
            return Err(AtlasError::AlreadyRegistered(handle));
        }
        state.external.insert(handle, size);
        state.external_bytes += size;
        Ok(())
    }

    /// Drop the accounting for an external handle
    pub fn unregister_external(&self, handle: usize) -> bool {
        let mut state = self.state.lock();
        match state.external.remove(&handle) {
            Some(size) => {
                state.external_bytes -= size;
                true
            }
            None => false,
        }
    }

    /// Number of live blocks
    pub fn len(&self) -> usize {
        self.state.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().blocks.is_empty()
    }

    /// Running allocation total
    pub fn allocated_bytes(&self) -> u64 {
        self.state.lock().allocated
    }

    /// Running total plus external bytes, without walking the pool
    pub fn total_bytes(&self) -> u64 {
        let state = self.state.lock();
        state.allocated + state.external_bytes
    }

    pub fn stats(&self) -> ArenaStats {
        let state = self.state.lock();
        ArenaStats {
            live_blocks: state.blocks.len(),
            allocated_bytes: state.allocated,
            recorded_bytes: state.blocks.values().map(|e| e.size as u64).sum(),
            external_handles: state.external.len(),
            external_bytes: state.external_bytes,
        }
    }
}

impl Drop for TrackedArena {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.blocks.is_empty() {
            return;
        }

        // Only detached blocks can remain: live handles keep the arena alive.
        error!(
            "Arena dropped with {} leaked blocks ({} bytes); releasing them",
            state.blocks.len(),
            state.allocated
        );
        for (addr, entry) in state.blocks.drain() {
            // SAFETY: every pooled address came from `allocate` with this size.
            unsafe {
                alloc::dealloc(
                    addr as *mut u8,
                    Layout::from_size_align_unchecked(entry.size, BLOCK_ALIGN),
                )
            };
        }
        state.allocated = 0;
    }
}

/// Move-only handle to an arena block
///
/// Dereferences to the block's bytes and frees the block when dropped.
pub struct Block {
    ptr: NonNull<u8>,
    len: usize,
    arena: Arc<TrackedArena>,
    detached: bool,
}

// SAFETY: a Block is the unique owner of its heap memory.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Block size in bytes (at least 1)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Give up automatic freeing
    ///
    /// The block stays in the pool until the pointer is passed to
    /// [`TrackedArena::free`] (or `Atlas::free`).
    pub fn into_raw(mut self) -> NonNull<u8> {
        self.arena.detach(self.ptr);
        self.detached = true;
        self.ptr
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes while the handle exists.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: unique access through &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if !self.detached {
            self.arena.release(self.ptr, false);
        }
    }
}
