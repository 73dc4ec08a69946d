//! Per-reader lease over one mapped file
//!
//! A database volume reader keeps a `FileView` per file it reads. The view
//! acquires the shared mapping from the atlas on first access and holds on
//! to it until cleared or dropped.

use crate::core::atlas::Atlas;
use crate::core::mapping::MappedFile;
use crate::error::{AtlasError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct FileView {
    atlas: Arc<Atlas>,
    path: PathBuf,
    mapping: Option<Arc<MappedFile>>,
}

impl FileView {
    /// Create a view of `path`; nothing is mapped until the first read
    pub fn new<P: AsRef<Path>>(atlas: Arc<Atlas>, path: P) -> Self {
        FileView {
            atlas,
            path: path.as_ref().to_path_buf(),
            mapping: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file exists, from the atlas size cache
    pub fn exists(&self) -> bool {
        self.atlas.exists(&self.path)
    }

    /// Acquire the mapping if not already held
    pub fn init(&mut self) -> Result<&Arc<MappedFile>> {
        let mapping = match self.mapping.take() {
            Some(mapping) => mapping,
            None => {
                if !self.atlas.exists(&self.path) {
                    return Err(AtlasError::FileNotFound(self.path.clone()));
                }
                self.atlas.get_memory_file(&self.path)?
            }
        };
        Ok(self.mapping.insert(mapping))
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// File length in bytes
    pub fn len(&mut self) -> Result<u64> {
        Ok(self.init()?.len())
    }

    /// `len` bytes starting at `offset`
    pub fn bytes(&mut self, offset: u64, len: u64) -> Result<&[u8]> {
        self.init()?.slice(offset, len)
    }

    /// Everything from `offset` to the end of the file
    pub fn bytes_from(&mut self, offset: u64) -> Result<&[u8]> {
        let file_len = self.len()?;
        let len = file_len.checked_sub(offset).ok_or(AtlasError::OutOfRange {
            offset,
            len: 0,
            file_len,
        })?;
        self.bytes(offset, len)
    }

    /// Release the lease; the atlas keeps the mapping itself
    pub fn clear(&mut self) {
        self.mapping = None;
    }
}

impl std::fmt::Debug for FileView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileView")
            .field("path", &self.path)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
