//! Atlas construction parameters
//!
//! Loadable from TOML:
//!
//! ```toml
//! use_locking = true
//! memory_bound = 4294967296
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for an [`Atlas`](crate::Atlas)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Engage the atlas-wide mutex. Single-threaded callers may disable it.
    pub use_locking: bool,

    /// Soft bound on arena plus externally registered bytes.
    ///
    /// Crossing it only logs a warning; nothing is evicted.
    pub memory_bound: Option<u64>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        AtlasConfig {
            use_locking: true,
            memory_bound: None,
        }
    }
}

impl AtlasConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_locking(mut self, use_locking: bool) -> Self {
        self.use_locking = use_locking;
        self
    }

    pub fn with_memory_bound(mut self, bytes: u64) -> Self {
        self.memory_bound = Some(bytes);
        self
    }
}
