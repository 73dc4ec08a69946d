//! Atlas-wide lock and the token proving it is held
//!
//! [`LockToken`] is a scoped guard: it is borrowed from the atlas that issued
//! it and releases the lock when dropped, so a token can never outlive its
//! critical section. It also carries the issuing atlas's id, which lets
//! mutating calls reject a token taken from a different atlas.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Atlas-wide mutex that can be switched off for single-threaded use
#[derive(Debug)]
pub struct AtlasLock {
    mutex: Mutex<()>,
    enabled: bool,
    /// Unlocked-mode tokens currently alive
    outstanding: AtomicUsize,
}

impl AtlasLock {
    pub fn new(enabled: bool) -> Self {
        AtlasLock {
            mutex: Mutex::new(()),
            enabled,
            outstanding: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Block until the lock is acquired
    pub fn acquire(&self, atlas_id: u64) -> LockToken<'_> {
        let guard = if self.enabled {
            Some(self.mutex.lock())
        } else {
            self.outstanding.fetch_add(1, Ordering::AcqRel);
            None
        };
        LockToken {
            lock: self,
            guard,
            atlas_id,
        }
    }

    /// Whether a token is currently outstanding
    pub fn is_locked(&self) -> bool {
        if self.enabled {
            self.mutex.is_locked()
        } else {
            self.outstanding.load(Ordering::Acquire) > 0
        }
    }
}

/// Proof that the caller holds the atlas-wide lock
///
/// Not reentrant: acquiring a second token on the same thread while one is
/// alive deadlocks when locking is enabled.
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct LockToken<'a> {
    lock: &'a AtlasLock,
    guard: Option<MutexGuard<'a, ()>>,
    atlas_id: u64,
}

impl LockToken<'_> {
    /// Id of the atlas that issued this token
    pub fn atlas_id(&self) -> u64 {
        self.atlas_id
    }

    /// Whether this token holds a real mutex
    pub fn is_engaged(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for LockToken<'_> {
    fn drop(&mut self) {
        if !self.lock.enabled {
            self.lock.outstanding.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl std::fmt::Debug for LockToken<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockToken")
            .field("atlas_id", &self.atlas_id)
            .field("engaged", &self.is_engaged())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_token_brackets_lock() {
        let lock = AtlasLock::new(true);
        assert!(!lock.is_locked());

        {
            let token = lock.acquire(7);
            assert!(lock.is_locked());
            assert!(token.is_engaged());
            assert_eq!(token.atlas_id(), 7);
        }

        assert!(!lock.is_locked());
    }

    #[test]
    fn test_unlocked_mode() {
        let lock = AtlasLock::new(false);
        let token = lock.acquire(1);
        assert!(!token.is_engaged());
        assert!(lock.is_locked());
        drop(token);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_unlocked_mode_counts_tokens() {
        let lock = Arc::new(AtlasLock::new(false));
        let first = lock.acquire(1);

        let other = Arc::clone(&lock);
        let second = std::thread::spawn(move || {
            let token = other.acquire(1);
            assert!(other.is_locked());
            drop(token);
        });
        second.join().unwrap();

        // The other thread's token is gone but ours is still alive
        assert!(lock.is_locked());
        let nested = lock.acquire(1);
        drop(first);
        assert!(lock.is_locked());
        drop(nested);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_excludes_other_threads() {
        let lock = Arc::new(AtlasLock::new(true));
        let token = lock.acquire(1);

        let other = Arc::clone(&lock);
        let handle = std::thread::spawn(move || {
            let _token = other.acquire(1);
        });

        std::thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        drop(token);
        handle.join().unwrap();
        assert!(!lock.is_locked());
    }
}
