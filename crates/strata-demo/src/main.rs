//! Simulated fly-through over a synthetic quadtree or octree.
//!
//! Drives the full scheduler: traversal, tile lifecycle, worker pool and
//! cache, with a fetcher that fakes network latency. Frame statistics are
//! logged as the camera descends and sweeps across the dataset.
//!
//! Run with: `cargo run -p strata-demo -- --depth 7 --latency-ms 30`

mod fetcher;
mod renderer;
mod scene;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use strata_cache::{CacheError, DiskCache, MemoryCache, NoCache, TieredCache, TileCache};
use strata_config::{AppDirs, CacheConfig, CliArgs, Config};
use strata_lod::{ManagerConfig, TileManager};
use strata_worker::{PoolConfig, PoolError};
use tracing::{error, info};

use crate::fetcher::SyntheticFetcher;
use crate::renderer::ResidencyRenderer;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

fn main() {
    let args = CliArgs::parse();

    let dirs = match args.config.clone() {
        Some(dir) => AppDirs::rooted_at(dir),
        None => AppDirs::resolve().unwrap_or_else(|e| {
            eprintln!("{e}, using the working directory");
            AppDirs::rooted_at(PathBuf::from(".strata"))
        }),
    };

    let mut config = Config::load_or_create(&dirs.config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    strata_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(err) = run(&config, &dirs) {
        error!(%err, "demo failed");
        std::process::exit(1);
    }
}

fn open_cache(cache: &CacheConfig, dirs: &AppDirs) -> Result<Arc<dyn TileCache>, CacheError> {
    let disk_dir = || cache.disk_dir.clone().unwrap_or_else(|| dirs.cache_dir.clone());
    let cache: Arc<dyn TileCache> = match (cache.memory_bytes > 0, cache.disk) {
        (true, true) => Arc::new(TieredCache::new(
            MemoryCache::new(cache.memory_bytes),
            DiskCache::open(disk_dir())?,
        )),
        (true, false) => Arc::new(MemoryCache::new(cache.memory_bytes)),
        (false, true) => Arc::new(DiskCache::open(disk_dir())?),
        (false, false) => Arc::new(NoCache),
    };
    Ok(cache)
}

fn run(config: &Config, dirs: &AppDirs) -> Result<(), DemoError> {
    let demo = &config.demo;
    let tree = scene::build_tree(demo);
    let budget = scene::budget(&config.traversal);
    info!(
        shape = ?demo.shape,
        depth = demo.depth,
        nodes = tree.len(),
        budget = ?budget.rule,
        "dataset ready"
    );

    let cache = open_cache(&config.cache, dirs)?;
    let fetcher = Arc::new(SyntheticFetcher::new(
        Duration::from_millis(demo.fetch_latency_ms),
        demo.payload_bytes,
    ));
    let manager_config = ManagerConfig {
        pool: PoolConfig {
            concurrency: config.workers.concurrency,
            crash_retries: config.workers.crash_retries,
            ..PoolConfig::default()
        },
        namespace: config.cache.namespace.clone(),
        collection: config.cache.collection.clone(),
        read_cache: config.cache.read_before_fetch,
    };
    let mut manager = TileManager::new(
        tree,
        ResidencyRenderer::default(),
        fetcher,
        Arc::clone(&cache),
        manager_config,
    )?;
    info!(workers = manager.pool().concurrency(), "worker pool ready");

    let frame_time = Duration::from_millis(demo.frame_ms);
    let report_every = (demo.frames / 12).max(1);
    let mut totals = strata_lod::FrameStats::default();
    let started = Instant::now();

    for frame in 0..demo.frames {
        let frame_start = Instant::now();
        let camera = scene::camera_at(frame, demo, &config.camera);
        let stats = manager.load_tiles(&camera, &budget);

        totals.dispatched += stats.dispatched;
        totals.cache_hits += stats.cache_hits;
        totals.completed += stats.completed;
        totals.evicted += stats.evicted;
        totals.cancelled += stats.cancelled;
        totals.stale += stats.stale;
        totals.failed += stats.failed;

        if frame % report_every == 0 {
            info!(
                frame = stats.frame,
                altitude = camera.position.z,
                visited = stats.visited,
                resident = stats.resident,
                loading = stats.loading,
                deferred = stats.deferred,
                queued = manager.pool().queued(),
                resident_kib = manager.renderer().resident_bytes() / 1024,
                "frame"
            );
        }

        if let Some(rest) = frame_time.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    manager.shutdown();
    let renderer = manager.renderer();
    info!(
        frames = demo.frames,
        elapsed_ms = started.elapsed().as_millis() as u64,
        dispatched = totals.dispatched,
        cache_hits = totals.cache_hits,
        completed = totals.completed,
        evicted = totals.evicted,
        cancelled = totals.cancelled,
        stale = totals.stale,
        failed = totals.failed,
        attaches = renderer.attaches(),
        detaches = renderer.detaches(),
        peak_kib = renderer.peak_bytes() / 1024,
        cached_entries = cache.len(),
        cached_kib = cache.total_bytes() / 1024,
        "fly-through finished"
    );
    Ok(())
}
