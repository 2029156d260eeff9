//! Cooperative interrupt flag shared between a signal handler and the
//! executor's blocking waits.

use crate::clock::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Longest uninterrupted sleep while waiting on a token.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cloneable flag that marks the current invocation as interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token. Safe to call from a signal handler.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in short slices, returning `false` as soon as the
    /// token fires.
    pub fn sleep(&self, clock: &dyn Clock, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let slice = remaining.min(POLL_INTERVAL);
            clock.sleep(slice);
            remaining -= slice;
        }
        !self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_sleep_runs_full_duration() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert!(CancelToken::new().sleep(&clock, Duration::from_millis(105)));
        assert_eq!(clock.now() - start, Duration::from_millis(105));
    }

    #[test]
    fn test_sleep_stops_when_cancelled() {
        let clock = ManualClock::new();
        let token = CancelToken::new();
        token.cancel();
        let start = clock.now();
        assert!(!token.sleep(&clock, Duration::from_secs(10)));
        assert_eq!(clock.now(), start);
    }
}
