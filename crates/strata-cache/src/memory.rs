//! In-memory payload cache with a byte budget and least-recently-used eviction.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::{Buffer, CacheKey, TileCache};

struct Entry {
    data: Buffer,
    /// Logical clock value of the most recent access.
    last_used: AtomicU64,
}

/// Concurrent memory cache bounded by total payload bytes.
///
/// When an insert pushes usage over the budget, the least recently used
/// entries are dropped until usage fits again. Payloads larger than the whole
/// budget are not stored.
pub struct MemoryCache {
    entries: DashMap<CacheKey, Entry>,
    max_bytes: usize,
    total_bytes: AtomicUsize,
    clock: AtomicU64,
    /// Serialises eviction passes; lookups and inserts stay lock-free.
    eviction: Mutex<()>,
}

impl MemoryCache {
    /// Create a cache holding at most `max_bytes` of payload.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_bytes,
            total_bytes: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            eviction: Mutex::new(()),
        }
    }

    /// Configured byte budget.
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Whether usage currently exceeds the budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.total_bytes.load(Ordering::Relaxed) > self.max_bytes
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop least recently used entries until usage fits the budget.
    fn enforce_budget(&self) {
        let Ok(_guard) = self.eviction.lock() else {
            return;
        };
        if !self.is_over_budget() {
            return;
        }

        // Oldest first.
        let mut candidates: Vec<(CacheKey, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_used.load(Ordering::Relaxed)))
            .collect();
        candidates.sort_unstable_by_key(|(_, last_used)| *last_used);

        let mut evicted = 0usize;
        for (key, _) in candidates {
            if !self.is_over_budget() {
                break;
            }
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.total_bytes.fetch_sub(entry.data.len(), Ordering::Relaxed);
                evicted += 1;
            }
        }
        debug!(
            evicted,
            total_bytes = self.total_bytes.load(Ordering::Relaxed),
            "memory cache over budget"
        );
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.len())
            .field("max_bytes", &self.max_bytes)
            .field("total_bytes", &self.total_bytes.load(Ordering::Relaxed))
            .finish()
    }
}

impl TileCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Buffer> {
        let entry = self.entries.get(key)?;
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(Buffer::clone(&entry.data))
    }

    fn peek(&self, key: &CacheKey) -> Option<Buffer> {
        self.get(key)
    }

    fn put(&self, key: CacheKey, data: Buffer) {
        let len = data.len();
        if len > self.max_bytes {
            debug!(%key, len, "payload larger than memory cache budget, not cached");
            return;
        }
        let entry = Entry {
            data,
            last_used: AtomicU64::new(self.tick()),
        };
        self.total_bytes.fetch_add(len, Ordering::Relaxed);
        if let Some(old) = self.entries.insert(key, entry) {
            self.total_bytes.fetch_sub(old.data.len(), Ordering::Relaxed);
        }
        if self.is_over_budget() {
            self.enforce_budget();
        }
    }

    fn clear(&self) {
        self.entries.clear();
        self.total_bytes.store(0, Ordering::Relaxed);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn total_bytes(&self) -> usize {
        self.total_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(item: &str) -> CacheKey {
        CacheKey::new("image", "c1", item)
    }

    fn bytes(len: usize) -> Buffer {
        Arc::from(vec![7u8; len])
    }

    /// Stored payloads are returned unchanged.
    #[test]
    fn test_put_then_get() {
        let cache = MemoryCache::new(1024);
        cache.put(key("0/0/0"), Arc::from(&b"tile"[..]));
        assert_eq!(cache.get(&key("0/0/0")).as_deref(), Some(&b"tile"[..]));
        assert!(cache.get(&key("0/0/1")).is_none());
    }

    /// Replacing an entry updates the byte total instead of double counting.
    #[test]
    fn test_replace_updates_totals() {
        let cache = MemoryCache::new(1024);
        cache.put(key("a"), bytes(100));
        cache.put(key("a"), bytes(40));
        assert_eq!(cache.total_bytes(), 40);
        assert_eq!(cache.len(), 1);
    }

    /// The least recently used entry is evicted first.
    #[test]
    fn test_lru_eviction_order() {
        let cache = MemoryCache::new(300);
        cache.put(key("old"), bytes(100));
        cache.put(key("mid"), bytes(100));
        cache.put(key("new"), bytes(100));
        // Touch "old" so "mid" becomes the least recently used.
        assert!(cache.get(&key("old")).is_some());

        cache.put(key("extra"), bytes(100));

        assert!(cache.get(&key("mid")).is_none(), "LRU entry should be evicted");
        assert!(cache.get(&key("old")).is_some());
        assert!(cache.get(&key("extra")).is_some());
        assert!(cache.total_bytes() <= 300);
    }

    /// Payloads larger than the budget are skipped.
    #[test]
    fn test_oversized_payload_not_stored() {
        let cache = MemoryCache::new(10);
        cache.put(key("big"), bytes(11));
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    /// Concurrent writers of the same key leave a consistent total.
    #[test]
    fn test_concurrent_idempotent_writes() {
        let cache = Arc::new(MemoryCache::new(1 << 20));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.put(key(&format!("{i}")), bytes(16));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 50);
        assert_eq!(cache.total_bytes(), 50 * 16);
    }

    /// Clearing drops all entries and resets usage.
    #[test]
    fn test_clear() {
        let cache = MemoryCache::new(1024);
        cache.put(key("a"), bytes(10));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
