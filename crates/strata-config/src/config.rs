//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Fetch worker pool settings.
    pub workers: WorkerConfig,
    /// Per-frame traversal budget.
    pub traversal: TraversalConfig,
    /// Payload cache settings.
    pub cache: CacheConfig,
    /// Camera projection used for scoring.
    pub camera: CameraConfig,
    /// Logging settings.
    pub log: LogConfig,
    /// Synthetic fly-through settings.
    pub demo: DemoConfig,
}

/// Fetch worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent fetches (0 = one per logical CPU).
    pub concurrency: usize,
    /// Resubmissions of a request whose worker crashed.
    pub crash_retries: u32,
}

/// Which rule ends refinement.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopMode {
    /// Refine while screen-space error exceeds `error_threshold`.
    #[default]
    ErrorThreshold,
    /// Refine until `max_points` points are selected.
    PointBudget,
}

/// Traversal budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TraversalConfig {
    /// Refinement rule.
    pub mode: StopMode,
    /// Screen-space error threshold in pixels.
    pub error_threshold: f64,
    /// Point budget per frame.
    pub max_points: u64,
    /// Children scoring at or below this are never queued.
    pub min_refine_score: f64,
    /// Hard ceiling on nodes touched per frame.
    pub max_nodes: usize,
}

/// Payload cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget of the in-memory tier (0 disables it).
    pub memory_bytes: usize,
    /// Persist payloads on disk.
    pub disk: bool,
    /// Disk cache root; `None` uses the platform cache directory.
    pub disk_dir: Option<PathBuf>,
    /// Serve loads from the cache before fetching.
    pub read_before_fetch: bool,
    /// Namespace of cached payloads.
    pub namespace: String,
    /// Collection of cached payloads.
    pub collection: String,
}

/// Camera projection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f64,
    /// Viewport width in pixels.
    pub viewport_width: u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// Near clip distance.
    pub near: f64,
    /// Far clip distance.
    pub far: f64,
    /// Cull nodes outside the view frustum.
    pub frustum_culling: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive (e.g., "debug", "info,strata_lod=trace").
    pub level: String,
    /// Write JSON logs to the log directory in debug builds.
    pub json_file: bool,
}

/// Shape of the synthetic tree.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TreeShape {
    /// Image pyramid.
    #[default]
    Quadtree,
    /// Point-cloud octree.
    Octree,
}

/// Synthetic fly-through configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Tree shape.
    pub shape: TreeShape,
    /// Levels below the root.
    pub depth: u8,
    /// Half extent of the dataset in world units.
    pub half_extent: f64,
    /// Geometric error of the root.
    pub root_error: f64,
    /// Points per node for point budgets.
    pub points_per_node: u64,
    /// Number of frames to simulate.
    pub frames: u32,
    /// Wall time per frame in milliseconds.
    pub frame_ms: u64,
    /// Simulated fetch latency in milliseconds.
    pub fetch_latency_ms: u64,
    /// Simulated payload size in bytes.
    pub payload_bytes: usize,
}

// --- Default implementations ---

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            crash_retries: 1,
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            mode: StopMode::ErrorThreshold,
            error_threshold: 16.0,
            max_points: 2_000_000,
            min_refine_score: 0.0,
            max_nodes: 4096,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_bytes: 256 * 1024 * 1024,
            disk: false,
            disk_dir: None,
            read_before_fetch: true,
            namespace: "tiles".to_string(),
            collection: "default".to_string(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 60.0,
            viewport_width: 1280,
            viewport_height: 720,
            near: 0.1,
            far: 100_000.0,
            frustum_culling: true,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_file: true,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            shape: TreeShape::Quadtree,
            depth: 6,
            half_extent: 1024.0,
            root_error: 512.0,
            points_per_node: 10_000,
            frames: 240,
            frame_ms: 16,
            fetch_latency_ms: 20,
            payload_bytes: 4096,
        }
    }
}

// --- Persistence ---

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there when the
    /// file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        let config = read_file(&path)?;
        log::info!("Using config {}", path.display());
        Ok(config)
    }

    /// Write this config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Encode)?;
        std::fs::write(&path, text).map_err(write_err)
    }

    /// Re-read the file; `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_file(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Config changed on disk");
        Ok(Some(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("error_threshold: 16.0"));
        assert!(ron_str.contains("mode: ErrorThreshold"));
        assert!(ron_str.contains("namespace: \"tiles\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.traversal.mode = StopMode::PointBudget;
        config.cache.disk_dir = Some(PathBuf::from("/var/cache/strata"));
        config.demo.shape = TreeShape::Octree;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        // Config missing the `cache` section and most traversal fields.
        let ron_str = "(workers: (concurrency: 3), traversal: (error_threshold: 8.0))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.workers.concurrency, 3);
        assert_eq!(config.workers.crash_retries, 1);
        assert_eq!(config.traversal.error_threshold, 8.0);
        assert_eq!(config.traversal.max_nodes, 4096);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.workers.concurrency = 2;
        config.cache.memory_bytes = 1 << 20;
        config.log.level = "debug,strata_worker=trace".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).is_file());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.traversal.error_threshold = 4.0;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.traversal.error_threshold), Some(4.0));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_reload_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        match &err {
            ConfigError::Read { path, .. } => assert_eq!(path, &dir.path().join(CONFIG_FILE)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn test_ron_comments_accepted() {
        let ron_str = "// This is a comment\n(\n  // Another comment\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }
}
