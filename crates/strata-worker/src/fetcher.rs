//! The content-fetching seam between the pool and the data source.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use strata_cache::Buffer;

use crate::{CancellationToken, FetchError, TileRequest};

/// Read size between cancellation checks.
const READ_CHUNK: usize = 64 * 1024;

/// Produces the payload of a node. Runs on worker threads.
///
/// Long fetches must poll `token` and return [`FetchError::Cancelled`] once it
/// is set; the pool never interrupts a unit.
pub trait ContentFetcher: Send + Sync + 'static {
    /// Fetch the payload described by `request`.
    fn fetch(&self, request: &TileRequest, token: &CancellationToken) -> Result<Buffer, FetchError>;
}

impl<F> ContentFetcher for F
where
    F: Fn(&TileRequest, &CancellationToken) -> Result<Buffer, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self, request: &TileRequest, token: &CancellationToken) -> Result<Buffer, FetchError> {
        self(request, token)
    }
}

/// Reads payloads from files below a root directory.
///
/// Each content descriptor's `uri` is a path relative to the root; byte
/// ranges select a region of a shared file. Multiple descriptors are
/// concatenated in order.
#[derive(Clone, Debug)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    /// Serve files below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(uri);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(FetchError::NotFound(uri.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ContentFetcher for FileFetcher {
    fn fetch(&self, request: &TileRequest, token: &CancellationToken) -> Result<Buffer, FetchError> {
        let mut out = Vec::new();
        for descriptor in &request.content {
            token.check()?;
            let path = self.resolve(&descriptor.uri)?;
            let mut file = std::fs::File::open(&path).map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => FetchError::NotFound(descriptor.uri.clone()),
                _ => FetchError::Transport(format!("{}: {err}", path.display())),
            })?;

            let remaining = match &descriptor.byte_range {
                Some(range) => {
                    file.seek(SeekFrom::Start(range.start))
                        .map_err(|err| FetchError::Transport(err.to_string()))?;
                    Some(range.end.saturating_sub(range.start) as usize)
                }
                None => None,
            };

            let mut buf = vec![0u8; READ_CHUNK];
            let mut read_total = 0usize;
            loop {
                token.check()?;
                let want = match remaining {
                    Some(limit) => (limit - read_total).min(READ_CHUNK),
                    None => READ_CHUNK,
                };
                if want == 0 {
                    break;
                }
                let n = file
                    .read(&mut buf[..want])
                    .map_err(|err| FetchError::Transport(err.to_string()))?;
                if n == 0 {
                    if remaining.is_some() {
                        return Err(FetchError::Transport(format!(
                            "{}: range ends past end of file",
                            descriptor.uri
                        )));
                    }
                    break;
                }
                out.extend_from_slice(&buf[..n]);
                read_total += n;
            }
        }
        Ok(Arc::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_spatial::{ContentDescriptor, NodeKey};

    fn request(content: Vec<ContentDescriptor>) -> TileRequest {
        TileRequest {
            key: NodeKey::ROOT,
            nonce: 1,
            content,
            cache_key: None,
            read_cache: false,
        }
    }

    /// Whole files and byte ranges are read and concatenated.
    #[test]
    fn test_reads_files_and_ranges() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"hello").unwrap();
        std::fs::write(dir.path().join("packed.bin"), b"0123456789").unwrap();

        let fetcher = FileFetcher::new(dir.path());
        let data = fetcher
            .fetch(
                &request(vec![
                    ContentDescriptor::uri("a.bin"),
                    ContentDescriptor::region("packed.bin", 2..5),
                ]),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(&*data, b"hello234");
    }

    /// Missing files and escaping paths are not found.
    #[test]
    fn test_missing_and_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FileFetcher::new(dir.path());
        let token = CancellationToken::new();
        assert_eq!(
            fetcher.fetch(&request(vec![ContentDescriptor::uri("nope.bin")]), &token),
            Err(FetchError::NotFound("nope.bin".into()))
        );
        assert!(matches!(
            fetcher.fetch(&request(vec![ContentDescriptor::uri("../etc/passwd")]), &token),
            Err(FetchError::NotFound(_))
        ));
    }

    /// A cancelled token stops the read.
    #[test]
    fn test_cancelled_token_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"hello").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            FileFetcher::new(dir.path()).fetch(&request(vec![ContentDescriptor::uri("a.bin")]), &token),
            Err(FetchError::Cancelled)
        );
    }

    /// Ranges past the end of the file are transport errors.
    #[test]
    fn test_range_past_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("short.bin"), b"abc").unwrap();
        let result = FileFetcher::new(dir.path()).fetch(
            &request(vec![ContentDescriptor::region("short.bin", 1..10)]),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
