//! Bounded worker pool for tile payload fetches.
//!
//! A fixed number of units each run on their own thread and hold at most one
//! assignment. Requests beyond the pool's concurrency wait in a FIFO overflow
//! queue. Results flow back over a channel and are collected once per frame
//! with [`WorkerPool::pump`]. Cancellation is cooperative through
//! [`CancellationToken`].

mod error;
mod fetcher;
mod pool;
mod request;
mod token;

pub use error::{FetchError, PoolError};
pub use fetcher::{ContentFetcher, FileFetcher};
pub use pool::{PoolConfig, WorkerPool};
pub use request::{Completion, Outcome, RequestId, TileRequest};
pub use token::CancellationToken;
