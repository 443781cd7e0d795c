#![forbid(unsafe_code)]

//! Host-driven timer queue.
//!
//! Nothing here sleeps or spawns. Timers are entries keyed by deadline on a
//! [`DeterministicClock`]; the host advances time and pops due entries one at
//! a time, so every dispatch runs to completion before the next one starts.
//!
//! Cancelling a timer removes its entry. A cancelled timer can never be
//! popped, which is what keeps a superseded verification from confirming
//! anything.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use qflow_core::{DeterministicClock, ItemId};

use crate::verification::VerificationStage;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Timers used by the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowTimer {
    /// A staged visibility check for one verification generation.
    Verify {
        /// Generation of the verification that scheduled the check.
        generation: u64,
        /// Stage to evaluate.
        stage: VerificationStage,
    },
    /// Debounced persistence flush.
    PersistFlush,
    /// Deferred completion re-check.
    CompletionRecheck,
    /// Re-check that a freshly materialized slot still has content.
    ContentProbe {
        /// Window index of the slot.
        index: usize,
        /// Item the slot was bound to when the probe was scheduled.
        item_id: ItemId,
    },
}

/// Deadline-ordered timer queue. Timers with equal deadlines fire in
/// scheduling order.
#[derive(Debug)]
pub struct Scheduler<T> {
    clock: DeterministicClock,
    queue: BTreeMap<(Duration, u64), T>,
    deadlines: HashMap<u64, Duration>,
    next_seq: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// Create an empty scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: DeterministicClock::new(),
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Schedule `payload` to fire `delay` from now.
    pub fn schedule_after(&mut self, delay: Duration, payload: T) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = self.clock.now().saturating_add(delay);
        self.queue.insert((deadline, seq), payload);
        self.deadlines.insert(seq, deadline);
        TimerId(seq)
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id.0) {
            Some(deadline) => self.queue.remove(&(deadline, id.0)).is_some(),
            None => false,
        }
    }

    /// Whether `id` is still pending.
    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id.0)
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|&(deadline, _)| deadline)
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to
    /// its deadline.
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerId, T)> {
        let &(deadline, seq) = self.queue.keys().next()?;
        if deadline > until {
            return None;
        }
        let payload = self.queue.remove(&(deadline, seq))?;
        self.deadlines.remove(&seq);
        self.clock.set(deadline);
        Some((TimerId(seq), payload))
    }

    /// Move the clock forward to `now` without firing anything.
    pub fn advance_to(&mut self, now: Duration) {
        self.clock.set(now);
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Cancel everything.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }
}
