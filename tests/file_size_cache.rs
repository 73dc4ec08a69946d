//! File size cache behaviour through the atlas

use seqdb_atlas::{Atlas, AtlasConfig};
use std::sync::{Arc, Barrier};
use tempfile::TempDir;

#[test]
fn test_lookup_is_not_refreshed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nt.00.nsq");
    std::fs::write(&path, vec![0u8; 4000]).unwrap();

    let atlas = Atlas::new(true);
    assert_eq!(atlas.get_file_size(&path), (true, 4000));

    std::fs::remove_file(&path).unwrap();
    assert_eq!(atlas.get_file_size(&path), (true, 4000));
    assert!(atlas.exists(&path));

    let stats = atlas.stats();
    assert_eq!(stats.size_cache_misses, 1);
    assert_eq!(stats.size_cache_hits, 2);
}

#[test]
fn test_growth_is_not_observed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("growing");
    std::fs::write(&path, b"abc").unwrap();

    let atlas = Atlas::new(true);
    assert_eq!(atlas.get_file_size(&path), (true, 3));

    std::fs::write(&path, b"abcdef").unwrap();
    assert_eq!(atlas.get_file_size(&path), (true, 3));
}

#[test]
fn test_concurrent_first_lookup_queries_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nr.pal");
    std::fs::write(&path, b"TITLE nr").unwrap();

    let atlas = Atlas::shared(AtlasConfig::default());
    let barrier = Arc::new(Barrier::new(12));

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let atlas = Arc::clone(&atlas);
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            std::thread::spawn(move || {
                barrier.wait();
                atlas.get_file_size(&path)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), (true, 8));
    }

    let stats = atlas.stats();
    assert_eq!(stats.size_cache_entries, 1);
    assert_eq!(stats.size_cache_misses, 1);
    assert_eq!(stats.size_cache_hits, 11);
}

#[test]
fn test_largest_file_watermark() {
    let dir = TempDir::new().unwrap();
    let atlas = Atlas::new(false);

    for (name, len) in [("a", 10usize), ("b", 9000), ("c", 500)] {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![1u8; len]).unwrap();
        atlas.get_file_size(&path);
    }
    atlas.get_file_size(dir.path().join("missing"));

    assert_eq!(atlas.max_file_size(), 9000);
    assert_eq!(atlas.stats().size_cache_entries, 4);
}
