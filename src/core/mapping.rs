//! Deduplicated memory-mapped files
//!
//! The registry hands out one shared [`MappedFile`] per path. Lookups take
//! the registry lock only long enough to find or insert a per-path slot; the
//! OS mapping call runs under that slot's own lock. Concurrent requesters of
//! the same path wait for the first one to finish and get its mapping, so a
//! mapping is never built and then thrown away, while requests for other
//! paths proceed without waiting.

use crate::error::{AtlasError, Result};
use ahash::AHashMap;
use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Read-only memory map of one file
pub struct MappedFile {
    path: PathBuf,
    /// `None` for empty files, which cannot be mapped
    map: Option<Mmap>,
}

impl MappedFile {
    /// Map `path` read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AtlasError::from_io(e, path))?;
        let len = file.metadata()?.len();

        let map = if len == 0 {
            None
        } else {
            // SAFETY: database volumes are treated as immutable while mapped;
            // truncating one underneath a reader is outside this crate's contract.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(MappedFile {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapped length in bytes
    pub fn len(&self) -> u64 {
        self.map.as_ref().map_or(0, |m| m.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole mapping
    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Bounds-checked byte range
    pub fn slice(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let file_len = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= file_len => Ok(&self.as_bytes()[offset as usize..end as usize]),
            _ => Err(AtlasError::OutOfRange {
                offset,
                len,
                file_len,
            }),
        }
    }

    /// Stable identity of this mapping, usable as an external accounting handle
    pub fn id(&self) -> usize {
        self as *const MappedFile as usize
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

type Slot = Arc<Mutex<Option<Arc<MappedFile>>>>;

/// Registry statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live mappings
    pub mappings: usize,
    /// Total mapped bytes
    pub mapped_bytes: u64,
    /// OS mappings created over the registry's lifetime
    pub mappings_created: u64,
}

/// One mapping per path, shared by all requesters
#[derive(Debug, Default)]
pub struct MappedFileRegistry {
    slots: Mutex<AHashMap<PathBuf, Slot>>,
    created: AtomicU64,
    mapped_bytes: AtomicU64,
}

impl MappedFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_for(&self, path: &Path) -> Slot {
        let mut slots = self.slots.lock();
        match slots.get(path) {
            Some(slot) => Arc::clone(slot),
            None => {
                let slot: Slot = Arc::new(Mutex::new(None));
                slots.insert(path.to_path_buf(), Arc::clone(&slot));
                slot
            }
        }
    }

    fn is_registered(&self, path: &Path, slot: &Slot) -> bool {
        self.slots
            .lock()
            .get(path)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Get the shared mapping for `path`, mapping the file on first request
    pub fn get_mapping<P: AsRef<Path>>(&self, path: P) -> Result<Arc<MappedFile>> {
        let path = path.as_ref();

        loop {
            let slot = self.slot_for(path);
            let mut entry = slot.lock();
            if let Some(mapping) = entry.as_ref() {
                return Ok(Arc::clone(mapping));
            }

            // Dropped by a failed open while we waited; start over.
            if !self.is_registered(path, &slot) {
                continue;
            }

            return match MappedFile::open(path) {
                Ok(mapping) => {
                    let mapping = Arc::new(mapping);
                    self.created.fetch_add(1, Ordering::Relaxed);
                    self.mapped_bytes.fetch_add(mapping.len(), Ordering::Relaxed);
                    debug!("Mapped {:?} ({} bytes)", path, mapping.len());

                    *entry = Some(Arc::clone(&mapping));
                    Ok(mapping)
                }
                Err(e) => {
                    let mut slots = self.slots.lock();
                    if slots.get(path).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                        slots.remove(path);
                    }
                    debug!("Mapping {:?} failed: {}", path, e);
                    Err(e)
                }
            };
        }
    }

    /// Number of live mappings
    pub fn len(&self) -> usize {
        self.mappings_created() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// OS mappings created so far
    ///
    /// Mappings live as long as the registry, so this is also the live count.
    pub fn mappings_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            mappings: self.len(),
            mapped_bytes: self.mapped_bytes.load(Ordering::Relaxed),
            mappings_created: self.mappings_created(),
        }
    }
}
