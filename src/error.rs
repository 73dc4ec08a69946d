//! Error types for atlas operations

use std::path::PathBuf;
use thiserror::Error;

/// Atlas operation result type
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Atlas operation errors
///
/// Ordinary misses (a missing file in a size lookup, an unknown pointer
/// passed to `free`) are reported as booleans by the atlas and never show
/// up here.
#[derive(Error, Debug)]
pub enum AtlasError {
    /// Invalid input to an allocation or lookup call
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lock token was taken from a different atlas
    #[error("Lock token does not belong to this atlas")]
    ForeignLock,

    /// External handle registered twice without an unregister in between
    #[error("External handle already registered: {0:#x}")]
    AlreadyRegistered(usize),

    /// Byte range extends past the end of a mapped file
    #[error("Range {offset}+{len} out of bounds for file of {file_len} bytes")]
    OutOfRange { offset: u64, len: u64, file_len: u64 },

    /// Requested file does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Underlying allocator failed
    #[error("Out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },

    /// Arena still held blocks when the atlas was closed
    #[error("Atlas closed with {blocks} live blocks ({bytes} bytes)")]
    LeakedBlocks { blocks: usize, bytes: u64 },

    /// No atlas holder is alive in this process
    #[error("No atlas holder exists")]
    NoAtlas,

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AtlasError {
    /// Map an I/O error for `path`, turning `NotFound` into [`AtlasError::FileNotFound`]
    pub(crate) fn from_io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            AtlasError::FileNotFound(path.into())
        } else {
            AtlasError::Io(err)
        }
    }
}
