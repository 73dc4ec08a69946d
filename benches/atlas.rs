//! Benchmarks for atlas hot paths

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use seqdb_atlas::{Atlas, AtlasConfig};
use std::sync::Arc;
use tempfile::TempDir;

fn benchmark_allocate_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("atlas_allocate_free");

    for size in [64usize, 4096, 1 << 20].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let atlas = Atlas::new(true);
            b.iter(|| {
                let token = atlas.lock();
                let block = atlas.allocate(black_box(size), &token, false).unwrap();
                black_box(block.len());
            });
        });
    }

    group.finish();
}

fn benchmark_locking_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("atlas_lock");

    for use_locking in [true, false] {
        group.bench_with_input(
            BenchmarkId::from_parameter(use_locking),
            &use_locking,
            |b, &use_locking| {
                let atlas = Atlas::new(use_locking);
                b.iter(|| black_box(atlas.lock().is_engaged()));
            },
        );
    }

    group.finish();
}

fn benchmark_memory_file_hit(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nt.00.nsq");
    std::fs::write(&path, vec![b'A'; 1 << 16]).unwrap();

    let atlas = Atlas::shared(AtlasConfig::default());
    atlas.get_memory_file(&path).unwrap();

    c.bench_function("atlas_get_memory_file_hit", |b| {
        b.iter(|| black_box(atlas.get_memory_file(&path).unwrap().len()));
    });
}

fn benchmark_file_size_hit(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nt.00.nin");
    std::fs::write(&path, b"index").unwrap();

    let atlas = Arc::new(Atlas::new(true));
    atlas.get_file_size(&path);

    c.bench_function("atlas_get_file_size_hit", |b| {
        b.iter(|| black_box(atlas.get_file_size(&path)));
    });
}

criterion_group!(
    benches,
    benchmark_allocate_free,
    benchmark_locking_modes,
    benchmark_memory_file_hit,
    benchmark_file_size_hit
);
criterion_main!(benches);
