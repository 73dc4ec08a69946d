//! seqdb-atlas probe
//!
//! Maps database files through a shared atlas from several threads and
//! reports sizes, mapping reuse and the final atlas counters.

use anyhow::Context;
use clap::Parser;
use seqdb_atlas::{Atlas, AtlasConfig, AtlasStats};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "seqdb-atlas")]
#[command(about = "Map sequence database files through a shared atlas and report usage")]
struct Args {
    /// Database files to probe
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Atlas config file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Disable the atlas-wide lock
    #[arg(long)]
    no_locking: bool,

    /// Reader threads requesting every file
    #[arg(short = 't', long, default_value = "4")]
    threads: usize,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct FileReport {
    path: PathBuf,
    exists: bool,
    length: u64,
    mapped: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    files: Vec<FileReport>,
    stats: AtlasStats,
}

fn probe(atlas: &Arc<Atlas>, paths: &[PathBuf], threads: usize) -> Vec<FileReport> {
    let workers: Vec<_> = (0..threads.max(1))
        .map(|_| {
            let atlas = Arc::clone(atlas);
            let paths = paths.to_vec();
            std::thread::spawn(move || {
                for path in &paths {
                    if atlas.exists(path) {
                        if let Err(e) = atlas.get_memory_file(path) {
                            warn!("Failed to map {:?}: {}", path, e);
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        if worker.join().is_err() {
            warn!("Probe thread panicked");
        }
    }

    paths
        .iter()
        .map(|path| {
            let (exists, length) = atlas.get_file_size(path);
            let mapped = exists && atlas.get_memory_file(path).is_ok();
            FileReport {
                path: path.clone(),
                exists,
                length,
                mapped,
            }
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AtlasConfig::from_file(path)
            .with_context(|| format!("loading atlas config {:?}", path))?,
        None => AtlasConfig::default(),
    };
    if args.no_locking {
        config.use_locking = false;
    }

    info!(
        "Probing {} files with {} threads",
        args.paths.len(),
        args.threads
    );

    let atlas = Atlas::shared(config);
    let files = probe(&atlas, &args.paths, args.threads);
    let report = Report {
        files,
        stats: atlas.stats(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for file in &report.files {
            let status = match (file.exists, file.mapped) {
                (false, _) => "missing",
                (true, false) => "unmappable",
                (true, true) => "mapped",
            };
            println!("{:>12}  {:<10}  {}", file.length, status, file.path.display());
        }
        let stats = &report.stats;
        println!(
            "mappings: {} ({} bytes, {} created), size lookups: {} hits / {} misses, largest file: {}",
            stats.mappings,
            stats.mapped_bytes,
            stats.mappings_created,
            stats.size_cache_hits,
            stats.size_cache_misses,
            stats.max_file_size
        );
    }

    Ok(())
}
