//! # seqdb-atlas - Shared Memory Atlas for Sequence Databases
//!
//! `seqdb-atlas` manages the memory behind a reader of very large, read-mostly
//! sequence database files. Many reader threads share one [`Atlas`], which
//! provides:
//!
//! - **Deduplicated memory maps**: one read-only mapping per file path, shared
//!   by every requester
//! - **Tracked allocations**: raw heap blocks recorded by address and size,
//!   freed automatically by their [`Block`] handle
//! - **Cached file sizes**: each path is stat'ed once per atlas
//! - **Lock tokens**: allocation and free require proof that the caller holds
//!   the atlas-wide lock
//! - **Shared lifetime**: [`AtlasHolder`] keeps one atlas alive while any
//!   owner in the process needs it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seqdb_atlas::{Atlas, AtlasConfig, Result};
//!
//! # fn main() -> Result<()> {
//! let atlas = Atlas::shared(AtlasConfig::default());
//!
//! // Size lookups are cached for good
//! let (exists, length) = atlas.get_file_size("/db/nt.00.nsq");
//!
//! if exists {
//!     // Every caller gets the same mapping
//!     let volume = atlas.get_memory_file("/db/nt.00.nsq")?;
//!     let first = volume.slice(0, length.min(64))?;
//!     println!("{} bytes mapped, starts with {:?}", volume.len(), first);
//! }
//!
//! // Scratch memory is lock-gated and freed on drop
//! let token = atlas.lock();
//! let mut scratch = atlas.allocate(4096, &token, true)?;
//! drop(token);
//! scratch[0] = b'A';
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ AtlasHolder (process-wide refcount)          │
//! ├──────────────────────────────────────────────┤
//! │ Atlas                                        │
//! │  - atlas-wide lock → LockToken               │
//! │  - external allocation accounting            │
//! ├───────────────┬───────────────┬──────────────┤
//! │ TrackedArena  │ FileSizeCache │ MappedFile-  │
//! │ (own mutex)   │ (own mutex)   │ Registry     │
//! │               │               │ (per-path    │
//! │               │               │  slots)      │
//! └───────────────┴───────────────┴──────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::AtlasConfig;
pub use crate::core::{
    arena::{ArenaStats, Block, TrackedArena, BLOCK_ALIGN},
    atlas::{Atlas, AtlasStats},
    file_size::{FileSizeCache, FileSizeEntry, FileSizeStats},
    holder::AtlasHolder,
    lock::{AtlasLock, LockToken},
    mapping::{MappedFile, MappedFileRegistry, RegistryStats},
    view::FileView,
};
pub use crate::error::{AtlasError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
