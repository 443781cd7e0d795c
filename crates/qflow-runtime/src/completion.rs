#![forbid(unsafe_code)]

//! Completion gating.
//!
//! The completion callback fires at most once per flow, and only once every
//! item is answered, the last item is current, and its slot has resolved
//! visibility verification (confirmed or forced).
//!
//! An answer mutation that completes the set "arms" the coordinator. If the
//! last item is not current, one deferred re-check is scheduled; the
//! coordinator stays armed and fires on the next resolution for the last
//! item.

use qflow_core::AnswerRecord;

use crate::scheduler::{FlowTimer, Scheduler, TimerId};
use crate::verification::VerificationStatus;

/// What the flow should do after consulting the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionAction {
    /// Nothing.
    None,
    /// Invoke the completion callback now.
    Fire,
    /// Activate verification for the last item.
    Verify,
    /// Verification is in flight; its resolution will fire.
    Await,
    /// Schedule the deferred re-check.
    ScheduleRecheck,
}

/// Tracks whether completion is armed, pending, or already delivered.
#[derive(Debug, Default)]
pub struct CompletionCoordinator {
    fired: bool,
    armed: bool,
    recheck: Option<TimerId>,
}

impl CompletionCoordinator {
    /// Create an unarmed coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consult after an answer mutation.
    pub fn on_mutation(
        &mut self,
        all_complete: bool,
        on_last: bool,
        last_status: VerificationStatus,
    ) -> CompletionAction {
        if self.fired || !all_complete {
            return CompletionAction::None;
        }
        self.armed = true;
        if on_last {
            Self::gate(last_status)
        } else if self.recheck.is_none() {
            CompletionAction::ScheduleRecheck
        } else {
            CompletionAction::None
        }
    }

    /// Consult when the deferred re-check fires.
    pub fn on_recheck(
        &mut self,
        all_complete: bool,
        on_last: bool,
        last_status: VerificationStatus,
    ) -> CompletionAction {
        self.recheck = None;
        if self.fired || !self.armed || !all_complete {
            return CompletionAction::None;
        }
        if on_last {
            Self::gate(last_status)
        } else {
            tracing::debug!("all items answered but the last item is not current; staying armed");
            CompletionAction::None
        }
    }

    /// Consult when verification resolves for the last item while it is current.
    #[must_use]
    pub fn on_resolution(&self, all_complete: bool) -> bool {
        !self.fired && self.armed && all_complete
    }

    fn gate(status: VerificationStatus) -> CompletionAction {
        match status {
            VerificationStatus::Resolved => CompletionAction::Fire,
            VerificationStatus::InFlight => CompletionAction::Await,
            VerificationStatus::Idle => CompletionAction::Verify,
        }
    }

    /// Remember the scheduled re-check.
    pub fn set_recheck(&mut self, id: TimerId) {
        self.recheck = Some(id);
    }

    /// Cancel a pending re-check.
    pub fn cancel_recheck(&mut self, scheduler: &mut Scheduler<FlowTimer>) {
        if let Some(id) = self.recheck.take() {
            scheduler.cancel(id);
        }
    }

    /// Disarm without touching the fired flag.
    pub fn disarm(&mut self, scheduler: &mut Scheduler<FlowTimer>) {
        self.armed = false;
        self.cancel_recheck(scheduler);
    }

    /// Record that the callback ran.
    pub fn mark_fired(&mut self) {
        self.fired = true;
        self.armed = false;
    }

    /// Whether the callback has run.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired
    }

    /// Whether completion is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether a re-check is pending.
    #[must_use]
    pub fn has_recheck(&self) -> bool {
        self.recheck.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────────────────────────────────────

/// Receives the answered percentage after every navigation or mutation.
pub trait ProgressSink {
    /// `percent_answered` is in `[0, 100]`.
    fn on_progress(&mut self, percent_answered: f64);
}

impl<F: FnMut(f64)> ProgressSink for F {
    fn on_progress(&mut self, percent_answered: f64) {
        self(percent_answered)
    }
}

/// Receives the final records once.
pub trait CompletionSink {
    /// Called exactly once per flow.
    fn on_complete(&mut self, records: &[AnswerRecord]);
}

impl<F: FnMut(&[AnswerRecord])> CompletionSink for F {
    fn on_complete(&mut self, records: &[AnswerRecord]) {
        self(records)
    }
}

/// Progress sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&mut self, _percent_answered: f64) {}
}

/// Completion sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompletion;

impl CompletionSink for NoopCompletion {
    fn on_complete(&mut self, _records: &[AnswerRecord]) {}
}
