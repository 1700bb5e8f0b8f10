//! Requests handed to the pool and the completions it reports.

use std::fmt;

use strata_cache::{Buffer, CacheKey};
use strata_spatial::{ContentDescriptor, NodeKey};

use crate::FetchError;

/// Pool-assigned identity of one dispatched request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    /// Wrap a raw id, e.g. when replaying completions from another pool.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One payload fetch for one node.
#[derive(Clone, Debug, PartialEq)]
pub struct TileRequest {
    /// Node the payload belongs to.
    pub key: NodeKey,
    /// Per-node fetch counter used to detect stale completions.
    pub nonce: u64,
    /// Payload locations, passed through to the fetcher.
    pub content: Vec<ContentDescriptor>,
    /// Where to persist the payload on success; `None` skips the cache.
    pub cache_key: Option<CacheKey>,
    /// Look `cache_key` up on the worker before fetching.
    pub read_cache: bool,
}

/// Terminal result of a request.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// The payload was read from the cache, or fetched and written through.
    Loaded(Buffer),
    /// The request was cancelled before producing a payload.
    Cancelled,
    /// The fetch failed.
    Failed(FetchError),
}

/// Exactly one of these is reported per dispatched request.
#[derive(Clone, Debug)]
pub struct Completion {
    /// Request identity returned by [`crate::WorkerPool::dispatch`].
    pub id: RequestId,
    /// Node the request was for.
    pub key: NodeKey,
    /// Nonce the request was issued under.
    pub nonce: u64,
    /// What happened.
    pub outcome: Outcome,
}
