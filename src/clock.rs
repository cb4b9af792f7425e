//! Time Source
//!
//! Injectable clock so window and TTL arithmetic is testable.

use std::time::Instant;

/// Source of monotonic time for the admission controller and the
/// credential cache.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Production clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Controllable clock for deterministic tests.
#[cfg(test)]
pub struct MockClock {
    current: parking_lot::Mutex<Instant>,
}

#[cfg(test)]
impl MockClock {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            current: parking_lot::Mutex::new(Instant::now()),
        })
    }

    /// Move time forward.
    pub fn advance(&self, delta: std::time::Duration) {
        *self.current.lock() += delta;
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}
