//! Cache error types.

use std::path::PathBuf;

/// Errors raised while opening a cache.
///
/// Lookups and writes never fail: misses are `None` and write failures are
/// logged.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache directory could not be created or read.
    #[error("cache directory {path} unavailable: {source}")]
    Io {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
