//! Structured logging for Strata.
//!
//! Console output with uptime timestamps and thread names, plus a JSON file
//! layer in debug builds. The filter comes from `RUST_LOG` when set, else from
//! the config's `log.level`.

use std::path::Path;

use strata_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config provides one.
pub const DEFAULT_FILTER: &str = "info";

/// File name of the JSON log inside the log directory.
pub const LOG_FILE: &str = "strata.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - enables the file layer
/// * `config` - source of the default filter and the file layer switch
///
/// Returns `false` if a global subscriber was already installed.
///
/// ```no_run
/// use strata_config::Config;
///
/// let config = Config::default();
/// strata_log::init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config_filter(config));

    // Worker threads are named, which makes their events easy to follow.
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let json_enabled = config.is_none_or(|config| config.log.json_file);
    if debug_build
        && json_enabled
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        let installed = subscriber.with(file_layer).try_init().is_ok();
        if installed {
            tracing::debug!(path = %log_dir.join(LOG_FILE).display(), "json log enabled");
        }
        return installed;
    }

    subscriber.try_init().is_ok()
}

/// Filter directive from the config, or [`DEFAULT_FILTER`].
#[must_use]
pub fn filter_directive(config: Option<&Config>) -> &str {
    match config {
        Some(config) if !config.log.level.trim().is_empty() => config.log.level.trim(),
        _ => DEFAULT_FILTER,
    }
}

/// Parse the config's filter, falling back to [`DEFAULT_FILTER`] when it is
/// empty or malformed.
fn config_filter(config: Option<&Config>) -> EnvFilter {
    let directive = filter_directive(config);
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_without_config() {
        assert_eq!(filter_directive(None), "info");
        assert!(config_filter(None).to_string().contains("info"));
    }

    #[test]
    fn test_config_level_is_used() {
        let mut config = Config::default();
        config.log.level = "warn,strata_lod=trace".to_string();
        assert_eq!(filter_directive(Some(&config)), "warn,strata_lod=trace");
        let filter = config_filter(Some(&config)).to_string();
        assert!(filter.contains("strata_lod=trace"));
        assert!(filter.contains("warn"));
    }

    #[test]
    fn test_blank_level_falls_back() {
        let mut config = Config::default();
        config.log.level = "   ".to_string();
        assert_eq!(filter_directive(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_env_filter_parsing() {
        for directive in ["info", "debug,strata_worker=trace", "warn,strata_lod=debug", "error"] {
            assert!(EnvFilter::try_new(directive).is_ok(), "failed to parse {directive}");
        }
    }

    #[test]
    fn test_json_log_file_created() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        // Another test may have installed the global subscriber first; the
        // file is created either way.
        let _installed = init_logging(Some(&log_dir), true, None);
        assert!(log_dir.join(LOG_FILE).is_file());
    }
}
