//! Admission Control
//!
//! Sliding-window rate limiting per (actor, operation). A sliding
//! window counts events in the trailing N seconds, so a burst cannot
//! straddle a bucket boundary the way it can with fixed windows.

use crate::clock::Clock;
use crate::{ActorKey, OperationKey};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per (actor, operation) sliding-window admission controller.
///
/// State is a single map of ordered timestamps per key; entries older
/// than the window are pruned lazily on access. Absence of history is
/// zero usage. No operation here ever errors.
pub struct AdmissionController {
    max_requests: usize,
    window: Duration,
    windows: DashMap<(ActorKey, OperationKey), Vec<Instant>>,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    pub fn new(max_requests: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
            clock,
        }
    }

    /// Check whether `actor` may run `operation` now, recording the
    /// call if allowed. Denied checks record nothing.
    pub fn check(&self, actor: ActorKey, operation: OperationKey) -> bool {
        let now = self.clock.now();
        let mut entry = self.windows.entry((actor, operation)).or_default();

        self.prune(entry.value_mut(), now);

        if entry.len() >= self.max_requests {
            tracing::debug!(actor, operation, used = entry.len(), "admission denied");
            return false;
        }

        entry.push(now);
        true
    }

    /// Calls still available to `actor` for `operation` in the current
    /// window. Prunes stale stamps but records nothing.
    pub fn remaining(&self, actor: ActorKey, operation: OperationKey) -> usize {
        match self.windows.get_mut(&(actor, operation)) {
            Some(mut entry) => {
                let now = self.clock.now();
                self.prune(entry.value_mut(), now);
                self.max_requests.saturating_sub(entry.len())
            }
            None => self.max_requests,
        }
    }

    /// Instant at which the oldest recorded call falls outside the
    /// window, i.e. the earliest moment a denied caller can try again.
    /// `None` when there is no history.
    pub fn reset_time(&self, actor: ActorKey, operation: OperationKey) -> Option<Instant> {
        let entry = self.windows.get(&(actor, operation))?;
        entry.first().map(|&oldest| oldest + self.window)
    }

    /// How long a denied caller has to wait before the next call can
    /// succeed. Zero when the window already has room.
    pub fn retry_after(&self, actor: ActorKey, operation: OperationKey) -> Duration {
        match self.reset_time(actor, operation) {
            Some(at) => at.saturating_duration_since(self.clock.now()),
            None => Duration::ZERO,
        }
    }

    /// Administrative clear of one operation, or of all of an actor's
    /// state when `operation` is `None`.
    pub fn reset(&self, actor: ActorKey, operation: Option<OperationKey>) {
        match operation {
            Some(op) => {
                self.windows.remove(&(actor, op));
            }
            None => {
                self.windows.retain(|(a, _), _| *a != actor);
            }
        }
    }

    fn prune(&self, stamps: &mut Vec<Instant>, now: Instant) {
        stamps.retain(|&ts| now.duration_since(ts) < self.window);
    }
}
