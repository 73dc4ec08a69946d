//! Arena accounting invariants
//!
//! Uses proptest to check that the running total always matches the pool.

use proptest::prelude::*;
use seqdb_atlas::{Atlas, AtlasConfig, Block, TrackedArena};
use std::ptr::NonNull;
use std::sync::Arc;

#[test]
fn test_allocate_1024_then_free() {
    let atlas = Atlas::new(true);

    let ptr = {
        let token = atlas.lock();
        atlas.allocate(1024, &token, false).unwrap().into_raw()
    };
    let stats = atlas.stats();
    assert_eq!(stats.live_blocks, 1);
    assert_eq!(stats.allocated_bytes, 1024);

    let token = atlas.lock();
    assert!(atlas.free(ptr, &token));
    drop(token);

    let stats = atlas.stats();
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(stats.allocated_bytes, 0);
}

#[test]
fn test_free_never_allocated_pointer() {
    let atlas = Atlas::new(true);
    let token = atlas.lock();
    let _live = atlas.allocate(100, &token, false).unwrap();
    let before = atlas.stats();

    let mut bogus = [0u8; 8];
    assert!(!atlas.free(NonNull::from(&mut bogus[0]), &token));
    assert_eq!(atlas.stats(), before);
}

#[test]
fn test_concurrent_allocations() {
    let atlas = Atlas::shared(AtlasConfig::default());

    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let atlas = Arc::clone(&atlas);
            std::thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..200 {
                    let size = rand::random::<usize>() % 4096;
                    let block = {
                        let token = atlas.lock();
                        atlas.allocate(size, &token, i % 2 == 0).unwrap()
                    };
                    if i % 3 == thread_id % 3 {
                        kept.push(block);
                    }
                }
                kept
            })
        })
        .collect();

    let kept: Vec<Block> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let stats = atlas.stats();
    assert_eq!(stats.live_blocks, kept.len());
    assert_eq!(
        stats.allocated_bytes,
        kept.iter().map(|b| b.len() as u64).sum::<u64>()
    );

    drop(kept);
    let stats = atlas.stats();
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(stats.allocated_bytes, 0);
}

proptest! {
    #[test]
    fn prop_allocate_free_restores_total(
        prefix in prop::collection::vec(0usize..10_000, 0..10),
        n in 0usize..100_000
    ) {
        let atlas = Atlas::new(true);
        let token = atlas.lock();
        let _prefix: Vec<_> = prefix
            .iter()
            .map(|&size| atlas.allocate(size, &token, false).unwrap())
            .collect();

        let before = atlas.stats().allocated_bytes;
        let ptr = atlas.allocate(n, &token, false).unwrap().into_raw();
        prop_assert_eq!(atlas.stats().allocated_bytes, before + n.max(1) as u64);
        prop_assert!(atlas.free(ptr, &token));
        prop_assert_eq!(atlas.stats().allocated_bytes, before);
    }

    #[test]
    fn prop_total_matches_recorded_sizes(
        ops in prop::collection::vec((0usize..8192, any::<bool>()), 1..60)
    ) {
        let arena = Arc::new(TrackedArena::new());
        let mut live = Vec::new();

        for (size, release) in ops {
            if release && !live.is_empty() {
                live.swap_remove(size % live.len());
            } else {
                live.push(arena.allocate(size, false).unwrap());
            }

            let stats = arena.stats();
            prop_assert_eq!(stats.allocated_bytes, stats.recorded_bytes);
            prop_assert_eq!(stats.live_blocks, live.len());
        }

        drop(live);
        prop_assert_eq!(arena.stats().allocated_bytes, 0);
        prop_assert!(arena.is_empty());
    }

    #[test]
    fn prop_zero_is_one(zero_fill in any::<bool>()) {
        let atlas = Atlas::new(true);
        let token = atlas.lock();

        let zero = atlas.allocate(0, &token, zero_fill).unwrap();
        let one = atlas.allocate(1, &token, zero_fill).unwrap();
        prop_assert_eq!(zero.len(), one.len());
        prop_assert_eq!(atlas.stats().allocated_bytes, 2);
    }
}
