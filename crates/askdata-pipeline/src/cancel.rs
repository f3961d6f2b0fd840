//! Cooperative cancellation of a running cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use askdata_core::{Error, Result};

/// Shared flag checked before every external call of a cycle.
///
/// Cloning yields a handle to the same flag, so the caller keeps one clone
/// and hands another to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Return [`Error::Cancelled`] if the flag is set.
    pub fn check(&self, before: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled(format!("cycle cancelled before {}", before)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancellationFlag::new();
        let handle = flag.clone();
        assert!(flag.check("generation").is_ok());

        handle.cancel();
        assert!(flag.is_cancelled());
        let err = flag.check("generation").unwrap_err();
        assert!(matches!(err, Error::Cancelled(msg) if msg.contains("generation")));
    }
}
