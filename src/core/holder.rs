//! Process-wide reference-counted atlas
//!
//! Independent owners (separate database readers, say) each create an
//! `AtlasHolder`. The first one creates the shared atlas, the last one to be
//! dropped releases it. Code that can be wired from a single root should
//! prefer [`Atlas::shared`] and pass the `Arc` around instead.

use crate::config::AtlasConfig;
use crate::core::atlas::Atlas;
use crate::error::{AtlasError, Result};
use parking_lot::{const_mutex, Mutex};
use std::sync::Arc;
use tracing::{debug, info};

struct HolderState {
    count: usize,
    atlas: Option<Arc<Atlas>>,
}

static STATE: Mutex<HolderState> = const_mutex(HolderState {
    count: 0,
    atlas: None,
});

/// One owner's share of the process-wide atlas
///
/// Only borrows of the atlas are handed out, so it never outlives the last
/// holder.
pub struct AtlasHolder {
    atlas: Arc<Atlas>,
}

impl AtlasHolder {
    /// Join the shared atlas, creating it if this is the first holder
    ///
    /// `use_locking` only takes effect when this call creates the atlas.
    pub fn new(use_locking: bool) -> Self {
        Self::with_config(AtlasConfig::default().with_locking(use_locking))
    }

    /// Like [`AtlasHolder::new`] with a full config for the first holder
    pub fn with_config(config: AtlasConfig) -> Self {
        let mut state = STATE.lock();

        let atlas = match &state.atlas {
            Some(atlas) => Arc::clone(atlas),
            None => {
                let atlas = Atlas::shared(config);
                info!("Atlas holder created shared atlas {}", atlas.id());
                state.atlas = Some(Arc::clone(&atlas));
                atlas
            }
        };
        state.count += 1;
        debug!("Atlas holder count now {}", state.count);

        AtlasHolder { atlas }
    }

    /// The shared atlas
    pub fn get(&self) -> &Atlas {
        &self.atlas
    }

    /// Join the atlas of the live holders without creating one
    ///
    /// The returned holder counts like any other, so the atlas stays alive
    /// exactly as long as some holder does.
    pub fn current() -> Result<Self> {
        let mut state = STATE.lock();
        let atlas = state.atlas.clone().ok_or(AtlasError::NoAtlas)?;
        state.count += 1;
        debug!("Atlas holder count now {}", state.count);
        Ok(AtlasHolder { atlas })
    }

    /// Number of live holders in the process
    pub fn count() -> usize {
        STATE.lock().count
    }
}

impl Drop for AtlasHolder {
    fn drop(&mut self) {
        let released = {
            let mut state = STATE.lock();
            state.count -= 1;
            debug!("Atlas holder count now {}", state.count);
            if state.count == 0 {
                state.atlas.take()
            } else {
                None
            }
        };

        // The atlas itself is dropped outside the holder lock.
        if let Some(atlas) = released {
            info!("Last atlas holder released atlas {}", atlas.id());
        }
    }
}

impl std::fmt::Debug for AtlasHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasHolder")
            .field("atlas_id", &self.atlas.id())
            .finish()
    }
}
