//! Platform directory resolution.

use std::path::PathBuf;

use crate::ConfigError;

const APP_NAME: &str = "strata";

/// Where Strata keeps its files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Default root of the on-disk tile cache.
    pub cache_dir: PathBuf,
    /// JSON log files in debug builds.
    pub log_dir: PathBuf,
}

impl AppDirs {
    /// Resolve platform-specific directories without creating them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if the OS does not expose a
    /// configuration directory.
    pub fn resolve() -> Result<Self, ConfigError> {
        let config_base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        let config_dir = config_base.join(APP_NAME);
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| config_dir.clone())
            .join(APP_NAME)
            .join("tiles");
        Ok(Self {
            log_dir: config_dir.join("logs"),
            config_dir,
            cache_dir,
        })
    }

    /// Directories rooted at an explicit config directory, e.g. from `--config`.
    #[must_use]
    pub fn rooted_at(config_dir: PathBuf) -> Self {
        Self {
            cache_dir: config_dir.join("cache"),
            log_dir: config_dir.join("logs"),
            config_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_app_name() {
        // Headless CI machines may lack a config dir; only check when present.
        if let Ok(dirs) = AppDirs::resolve() {
            assert!(dirs.config_dir.ends_with(APP_NAME));
            assert!(dirs.log_dir.starts_with(&dirs.config_dir));
            assert!(dirs.cache_dir.ends_with("tiles"));
        }
    }

    #[test]
    fn test_rooted_at() {
        let dirs = AppDirs::rooted_at(PathBuf::from("/tmp/strata-test"));
        assert_eq!(dirs.cache_dir, PathBuf::from("/tmp/strata-test/cache"));
        assert_eq!(dirs.log_dir, PathBuf::from("/tmp/strata-test/logs"));
    }
}
