//! Mock clock with controllable time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::traits::TimeProvider;

/// Mock time provider with a settable, advanceable value. Clones share
/// state, so the harness and the engine see the same clock.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new(initial: u64) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(initial)),
        }
    }

    /// Set the clock to an absolute timestamp.
    pub fn set(&self, timestamp: u64) {
        self.current.store(timestamp, Ordering::SeqCst);
    }

    /// Advance the clock by `seconds`.
    pub fn advance(&self, seconds: u64) {
        self.current.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn get(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(1_704_067_200) // 2024-01-01 00:00:00 UTC
    }
}

impl TimeProvider for MockClock {
    fn now_unix(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
