//! On-disk payload cache.
//!
//! ## Layout
//!
//! ```text
//! <root>/v<SCHEMA_VERSION>/<namespace>/<collection>/<item segments...>[.<attribute>].bin
//! ```
//!
//! Files hold the raw payload bytes with no header or compression. The
//! schema version lives in the directory name, so entries written by an
//! incompatible build are simply never found.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::{Buffer, CacheError, CacheKey, TileCache};

/// Version of the on-disk layout. Bump when payload encoding changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Filesystem-backed cache.
#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    /// Suffix counter for temporary files, so concurrent writers never share one.
    temp_counter: AtomicU64,
}

impl DiskCache {
    /// Open (creating if needed) a cache below `base`.
    pub fn open(base: impl AsRef<Path>) -> Result<Self, CacheError> {
        let root = base.as_ref().join(format!("v{SCHEMA_VERSION}"));
        std::fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            path: root.clone(),
            source,
        })?;
        debug!(root = %root.display(), "opened disk cache");
        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Versioned root directory holding the entries.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn write(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so readers never observe a partial file.
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!("tmp{}-{n}", std::process::id()));
        std::fs::write(&temp, data)?;
        std::fs::rename(&temp, path).inspect_err(|_| {
            let _ = std::fs::remove_file(&temp);
        })
    }
}

impl TileCache for DiskCache {
    fn get(&self, key: &CacheKey) -> Option<Buffer> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Some(Arc::from(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(%key, error = %err, "disk cache read failed");
                None
            }
        }
    }

    fn put(&self, key: CacheKey, data: Buffer) {
        let path = self.path_for(&key);
        if let Err(err) = self.write(&path, &data) {
            warn!(%key, error = %err, "disk cache write failed");
        }
    }

    fn clear(&self) {
        if let Err(err) = std::fs::remove_dir_all(&self.root) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(root = %self.root.display(), error = %err, "disk cache clear failed");
            }
        }
        if let Err(err) = std::fs::create_dir_all(&self.root) {
            warn!(root = %self.root.display(), error = %err, "disk cache recreate failed");
        }
    }

    fn len(&self) -> usize {
        walk(&self.root).0
    }

    fn total_bytes(&self) -> usize {
        walk(&self.root).1
    }
}

/// Count `.bin` entries and their bytes below `dir`.
fn walk(dir: &Path) -> (usize, usize) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return (0, 0);
    };
    let mut count = 0;
    let mut bytes = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            let (c, b) = walk(&path);
            count += c;
            bytes += b;
        } else if path.extension().is_some_and(|ext| ext == "bin") {
            count += 1;
            bytes += meta.len() as usize;
        }
    }
    (count, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(item: &str) -> CacheKey {
        CacheKey::new("points", "survey", item)
    }

    /// Entries survive reopening the cache.
    #[test]
    fn test_entries_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = DiskCache::open(dir.path()).unwrap();
            cache.put(key("1/0/0/1"), Arc::from(&b"points"[..]));
        }
        let cache = DiskCache::open(dir.path()).unwrap();
        assert_eq!(cache.get(&key("1/0/0/1")).as_deref(), Some(&b"points"[..]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 6);
    }

    /// Files land in the versioned layout.
    #[test]
    fn test_versioned_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        cache.put(key("2/3/1/0").with_attribute("intensity"), Arc::from(&b"i"[..]));
        let expected = dir
            .path()
            .join(format!("v{SCHEMA_VERSION}"))
            .join("points/survey/2/3/1/0.intensity.bin");
        assert!(expected.is_file());
    }

    /// Entries from another schema version are invisible.
    #[test]
    fn test_other_schema_version_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("v0/points/survey/0/0/0");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("0.bin"), b"old format").unwrap();

        let cache = DiskCache::open(dir.path()).unwrap();
        assert!(cache.get(&key("0/0/0/0")).is_none());
        assert!(cache.is_empty());
    }

    /// Misses are `None`, never errors.
    #[test]
    fn test_miss_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        assert!(cache.get(&key("9/9/9/9")).is_none());
    }

    /// Clear removes every entry but keeps the cache usable.
    #[test]
    fn test_clear_then_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        cache.put(key("0/0/0/0"), Arc::from(&b"a"[..]));
        cache.clear();
        assert!(cache.is_empty());
        cache.put(key("0/0/0/0"), Arc::from(&b"b"[..]));
        assert_eq!(cache.get(&key("0/0/0/0")).as_deref(), Some(&b"b"[..]));
    }
}
