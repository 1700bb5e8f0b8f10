//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::FetchError;

/// Shared flag a long-running fetch polls to abort its own I/O.
///
/// Cancelling never interrupts the worker; the fetch must observe the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(FetchError::Cancelled)` once cancelled, for use with `?`.
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clones observe cancellation of the original.
    #[test]
    fn test_clone_shares_flag() {
        let token = CancellationToken::new();
        let seen_by_worker = token.clone();
        assert!(seen_by_worker.check().is_ok());
        token.cancel();
        assert!(seen_by_worker.is_cancelled());
        assert_eq!(seen_by_worker.check(), Err(FetchError::Cancelled));
    }
}
