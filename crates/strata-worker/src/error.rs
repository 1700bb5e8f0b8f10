//! Worker and fetch error types.

/// Why a fetch did not produce a payload.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Remote or I/O failure while fetching.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The payload does not exist.
    #[error("payload not found: {0}")]
    NotFound(String),
    /// The fetch observed its cancellation token and stopped.
    #[error("fetch cancelled")]
    Cancelled,
    /// The unit executing the fetch terminated abnormally, twice.
    #[error("worker unit crashed")]
    WorkerCrash,
}

/// Errors raised while building the pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A unit thread could not be started.
    #[error("failed to spawn worker unit {unit}: {source}")]
    Spawn {
        /// Index of the unit.
        unit: usize,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}
