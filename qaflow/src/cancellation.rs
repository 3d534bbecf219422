//! Cooperative cancellation for pipeline runs.
//!
//! Cancellation never pre-empts an in-flight stage call; the engine
//! polls the token at stage boundaries and before each fan-out
//! dispatch.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A token for cooperative run cancellation.
///
/// Cancellation is idempotent - only the first reason is kept.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancelToken {
    /// Creates a new token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation with a reason. First reason wins.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.reason.write() = Some(reason.into());
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_cancel_sets_reason() {
        let token = CancelToken::new();
        token.cancel("caller requested");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("caller requested".to_string()));
    }

    #[test]
    fn test_cancel_idempotent() {
        let token = CancelToken::new();
        token.cancel("first");
        token.cancel("second");

        assert_eq!(token.reason(), Some("first".to_string()));
    }
}
