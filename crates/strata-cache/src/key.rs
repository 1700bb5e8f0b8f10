//! Cache entry identity.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Identity of one cached payload: `(namespace, collection, item[, attribute])`.
///
/// `item` is usually a grid path such as `level/x/y` or `level/x/y/z`; each
/// `/`-separated segment becomes one directory level on disk.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Dataset family, e.g. `"image"` or `"points"`.
    pub namespace: Arc<str>,
    /// Collection (dataset) identifier.
    pub collection: Arc<str>,
    /// Item identifier within the collection.
    pub item: String,
    /// Optional per-item attribute (channel, point attribute, ...).
    pub attribute: Option<String>,
}

impl CacheKey {
    /// Key for a whole item.
    #[must_use]
    pub fn new(namespace: impl Into<Arc<str>>, collection: impl Into<Arc<str>>, item: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            collection: collection.into(),
            item: item.into(),
            attribute: None,
        }
    }

    /// Builder-style attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Relative on-disk path: `namespace/collection/item[.attribute].bin`.
    ///
    /// Segments are sanitised so a key can never escape the cache root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        path.push(sanitize(&self.namespace));
        path.push(sanitize(&self.collection));

        let segments: Vec<String> = self.item.split('/').map(sanitize).collect();
        let (last, dirs) = match segments.split_last() {
            Some((last, dirs)) => (last.clone(), dirs),
            None => ("_".to_string(), &[][..]),
        };
        for dir in dirs {
            path.push(dir);
        }
        let file = match &self.attribute {
            Some(attribute) => format!("{last}.{}.bin", sanitize(attribute)),
            None => format!("{last}.bin"),
        };
        path.push(file);
        path
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.collection, self.item)?;
        if let Some(attribute) = &self.attribute {
            write!(f, ":{attribute}")?;
        }
        Ok(())
    }
}

fn sanitize(segment: &str) -> String {
    if segment.is_empty() || segment == "." || segment == ".." {
        return "_".to_string();
    }
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
