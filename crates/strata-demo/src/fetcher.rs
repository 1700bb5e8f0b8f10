//! Stand-in for a remote tile service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_cache::Buffer;
use strata_worker::{CancellationToken, ContentFetcher, FetchError, TileRequest};

/// Interval between cancellation checks while "waiting on the network".
const POLL: Duration = Duration::from_millis(2);

/// Produces deterministic payloads after a fixed latency.
#[derive(Clone, Debug)]
pub struct SyntheticFetcher {
    latency: Duration,
    payload_bytes: usize,
}

impl SyntheticFetcher {
    pub fn new(latency: Duration, payload_bytes: usize) -> Self {
        Self {
            latency,
            payload_bytes,
        }
    }
}

impl ContentFetcher for SyntheticFetcher {
    fn fetch(&self, request: &TileRequest, token: &CancellationToken) -> Result<Buffer, FetchError> {
        let deadline = Instant::now() + self.latency;
        loop {
            token.check()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(POLL));
        }

        let seed = request.key.raw().to_le_bytes();
        let payload: Vec<u8> = seed.iter().copied().cycle().take(self.payload_bytes).collect();
        Ok(Arc::from(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_spatial::NodeKey;

    fn request(key: NodeKey) -> TileRequest {
        TileRequest {
            key,
            nonce: 1,
            content: Vec::new(),
            cache_key: None,
            read_cache: false,
        }
    }

    #[test]
    fn test_payload_is_deterministic() {
        let fetcher = SyntheticFetcher::new(Duration::ZERO, 20);
        let token = CancellationToken::new();
        let a = fetcher.fetch(&request(NodeKey::from_raw(5)), &token).unwrap();
        let b = fetcher.fetch(&request(NodeKey::from_raw(5)), &token).unwrap();
        assert_eq!(a.len(), 20);
        assert_eq!(a, b);
        assert_eq!(a[0], 5);
    }

    #[test]
    fn test_cancel_interrupts_latency() {
        let fetcher = SyntheticFetcher::new(Duration::from_secs(30), 4);
        let token = CancellationToken::new();
        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            canceller.cancel();
        });
        let start = Instant::now();
        let result = fetcher.fetch(&request(NodeKey::ROOT), &token);
        handle.join().unwrap();
        assert_eq!(result, Err(FetchError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
