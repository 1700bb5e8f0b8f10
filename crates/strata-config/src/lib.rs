//! Configuration for the Strata streaming scheduler.
//!
//! Settings persist to disk as RON files. Missing fields fall back to their
//! defaults and unknown fields are ignored, so config files survive upgrades
//! in both directions. CLI arguments override loaded values.

mod cli;
mod config;
mod error;
mod paths;

pub use cli::CliArgs;
pub use config::{
    CacheConfig, CameraConfig, Config, DemoConfig, LogConfig, StopMode, TraversalConfig,
    TreeShape, WorkerConfig,
};
pub use paths::AppDirs;
pub use error::ConfigError;
