//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, StopMode, TreeShape};

/// Strata command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata", about = "Adaptive LOD streaming scheduler")]
pub struct CliArgs {
    /// Concurrent fetches (0 = one per CPU).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Screen-space error threshold in pixels.
    #[arg(long)]
    pub error_threshold: Option<f64>,

    /// Use a point budget instead of an error threshold.
    #[arg(long)]
    pub max_points: Option<u64>,

    /// Hard ceiling on nodes touched per frame.
    #[arg(long)]
    pub max_nodes: Option<usize>,

    /// Memory cache budget in bytes.
    #[arg(long)]
    pub memory_cache_bytes: Option<usize>,

    /// Persist payloads in this directory.
    #[arg(long)]
    pub disk_cache: Option<PathBuf>,

    /// Build an octree instead of a quadtree.
    #[arg(long)]
    pub octree: bool,

    /// Tree depth below the root.
    #[arg(long)]
    pub depth: Option<u8>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Simulated fetch latency in milliseconds.
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(concurrency) = args.concurrency {
            self.workers.concurrency = concurrency;
        }
        if let Some(threshold) = args.error_threshold {
            self.traversal.mode = StopMode::ErrorThreshold;
            self.traversal.error_threshold = threshold;
        }
        if let Some(points) = args.max_points {
            self.traversal.mode = StopMode::PointBudget;
            self.traversal.max_points = points;
        }
        if let Some(max_nodes) = args.max_nodes {
            self.traversal.max_nodes = max_nodes;
        }
        if let Some(bytes) = args.memory_cache_bytes {
            self.cache.memory_bytes = bytes;
        }
        if let Some(ref dir) = args.disk_cache {
            self.cache.disk = true;
            self.cache.disk_dir = Some(dir.clone());
        }
        if args.octree {
            self.demo.shape = TreeShape::Octree;
        }
        if let Some(depth) = args.depth {
            self.demo.depth = depth;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(latency) = args.latency_ms {
            self.demo.fetch_latency_ms = latency;
        }
        if let Some(ref level) = args.log_level {
            self.log.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            concurrency: Some(3),
            max_points: Some(500_000),
            disk_cache: Some(PathBuf::from("/tmp/tiles")),
            octree: true,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.workers.concurrency, 3);
        assert_eq!(config.traversal.mode, StopMode::PointBudget);
        assert_eq!(config.traversal.max_points, 500_000);
        assert!(config.cache.disk);
        assert_eq!(config.cache.disk_dir, Some(PathBuf::from("/tmp/tiles")));
        assert_eq!(config.demo.shape, TreeShape::Octree);
        // Non-overridden fields retain defaults
        assert_eq!(config.traversal.error_threshold, 16.0);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::try_parse_from([
            "strata",
            "--error-threshold",
            "8",
            "--depth",
            "4",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let mut config = Config::default();
        config.apply_cli_overrides(&args);
        assert_eq!(config.traversal.error_threshold, 8.0);
        assert_eq!(config.demo.depth, 4);
        assert_eq!(config.log.level, "debug");
    }
}
