//! Atlas internals
//!
//! Leaf components first, then the coordinator and its owners:
//!
//! - [`arena`] - tracked raw allocations
//! - [`file_size`] - memoized file length lookups
//! - [`mapping`] - deduplicated memory maps
//! - [`lock`] - atlas-wide lock and its token
//! - [`atlas`] - the coordinator
//! - [`holder`] - process-wide reference-counted atlas
//! - [`view`] - per-reader lease over a mapping

pub mod arena;
pub mod atlas;
pub mod file_size;
pub mod holder;
pub mod lock;
pub mod mapping;
pub mod view;
