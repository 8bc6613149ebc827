//! Cooperative cancellation for long-running engine calls.
//!
//! The engine never owns a thread or a timer; callers that want a time
//! bound build one externally (e.g. a timer thread that calls
//! [`CancellationToken::cancel`]) and pass the token in. The engine only
//! ever reads it between augmentation iterations and before each SPF run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheap, `Clone`-able handle that can be signalled from outside the
/// engine call it was passed into.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, unsignalled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`Self::cancel`] has been called on this token or any of
    /// its clones.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unsignalled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn clone_shares_signal() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
