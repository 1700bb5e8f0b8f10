//! Persistent tile payload cache.
//!
//! Payloads are immutable byte buffers addressed by [`CacheKey`]. The frame
//! thread only [`peek`](TileCache::peek)s the in-memory tier; workers do the
//! full read-before-fetch and persist every successful fetch before reporting
//! it (write-through). Writes are idempotent: re-writing a key with the same
//! bytes is harmless, so concurrent workers need no coordination.

mod disk;
mod error;
mod key;
mod memory;

use std::sync::Arc;

pub use disk::{DiskCache, SCHEMA_VERSION};
pub use error::CacheError;
pub use key::CacheKey;
pub use memory::MemoryCache;

/// Immutable payload bytes shared between workers, cache and renderer.
pub type Buffer = Arc<[u8]>;

/// Key/value store of raw payload buffers.
///
/// A miss is `None`, never an error. Implementations log and swallow I/O
/// failures so that a broken cache only costs a refetch.
pub trait TileCache: Send + Sync {
    /// Look up a payload. May block on I/O.
    fn get(&self, key: &CacheKey) -> Option<Buffer>;

    /// Look up a payload held in memory, never touching storage.
    fn peek(&self, _key: &CacheKey) -> Option<Buffer> {
        None
    }

    /// Store a payload, replacing any previous value for `key`.
    fn put(&self, key: CacheKey, data: Buffer);

    /// Drop every entry.
    fn clear(&self);

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Total payload bytes stored.
    fn total_bytes(&self) -> usize;

    /// Whether the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cache that stores nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;

impl TileCache for NoCache {
    fn get(&self, _key: &CacheKey) -> Option<Buffer> {
        None
    }

    fn put(&self, _key: CacheKey, _data: Buffer) {}

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn total_bytes(&self) -> usize {
        0
    }
}

/// A memory cache in front of a disk cache.
///
/// Disk hits are promoted into memory; writes go to both tiers.
#[derive(Debug)]
pub struct TieredCache {
    memory: MemoryCache,
    disk: DiskCache,
}

impl TieredCache {
    /// Combine a memory tier and a disk tier.
    #[must_use]
    pub fn new(memory: MemoryCache, disk: DiskCache) -> Self {
        Self { memory, disk }
    }

    /// The in-memory tier.
    #[must_use]
    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    /// The on-disk tier.
    #[must_use]
    pub fn disk(&self) -> &DiskCache {
        &self.disk
    }
}

impl TileCache for TieredCache {
    fn get(&self, key: &CacheKey) -> Option<Buffer> {
        if let Some(data) = self.memory.get(key) {
            return Some(data);
        }
        let data = self.disk.get(key)?;
        self.memory.put(key.clone(), Arc::clone(&data));
        Some(data)
    }

    fn peek(&self, key: &CacheKey) -> Option<Buffer> {
        self.memory.get(key)
    }

    fn put(&self, key: CacheKey, data: Buffer) {
        self.disk.put(key.clone(), Arc::clone(&data));
        self.memory.put(key, data);
    }

    fn clear(&self) {
        self.memory.clear();
        self.disk.clear();
    }

    fn len(&self) -> usize {
        self.disk.len()
    }

    fn total_bytes(&self) -> usize {
        self.disk.total_bytes()
    }
}
