#![forbid(unsafe_code)]

//! Staged visibility verification.
//!
//! Requesting a slot to be visible is not the same as it being visible: a
//! renderer may still be building, or may have failed silently. The verifier
//! confirms the current slot is actually perceptible before anything that
//! depends on it (the completion callback) is allowed to run.
//!
//! # State Machine
//!
//! ```text
//! Idle ── activate ──▶ Staged(Immediate) ─▶ Staged(Short) ─▶ Staged(Standard) ─▶ Staged(Ceiling)
//!                           │                    │                  │                  │
//!                           └──── perceptible ───┴──────────────────┴──▶ Confirmed     └─▶ ForcedOverride
//! ```
//!
//! - Each stage is a timer scheduled at activation, at a fixed offset.
//! - A failed check at `Standard` re-applies the visible style before the
//!   final check.
//! - A structural-change signal runs the next pending check immediately.
//!   Only the ceiling timer itself can force visibility.
//! - Activation supersedes the previous instance: its timers are cancelled
//!   and its generation is retired, so a stale timer cannot confirm anything.

use std::time::Duration;

use qflow_widgets::{ItemRendererFactory, SlotLifecycleController, SlotState};

use crate::config::VerificationTimings;
use crate::scheduler::{FlowTimer, Scheduler, TimerId};

/// One staged check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VerificationStage {
    /// ~1ms after activation.
    Immediate,
    /// ~25ms after activation.
    Short,
    /// ~75ms after activation; failure triggers the corrective re-style.
    Standard,
    /// Final check; failure forces visibility.
    Ceiling,
}

impl VerificationStage {
    /// All stages in firing order.
    pub const ALL: [VerificationStage; 4] = [
        VerificationStage::Immediate,
        VerificationStage::Short,
        VerificationStage::Standard,
        VerificationStage::Ceiling,
    ];

    /// Offset from activation.
    #[must_use]
    pub fn offset(self, timings: &VerificationTimings, terminal: bool) -> Duration {
        match self {
            VerificationStage::Immediate => timings.immediate,
            VerificationStage::Short => timings.short,
            VerificationStage::Standard => timings.standard,
            VerificationStage::Ceiling => timings.ceiling_for(terminal),
        }
    }
}

/// Where the current verification instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationPhase {
    /// Nothing to verify.
    Idle,
    /// Waiting for the given stage's check.
    Staged(VerificationStage),
    /// A check passed.
    Confirmed,
    /// The ceiling passed without success; visibility was forced.
    ForcedOverride,
}

/// Status of verification for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Not being verified.
    Idle,
    /// Checks are pending.
    InFlight,
    /// Confirmed or forced.
    Resolved,
}

/// Result of running a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The slot is perceptible.
    Confirmed {
        /// Verified index.
        index: usize,
        /// Stage that passed.
        stage: VerificationStage,
    },
    /// The check failed; later stages are still pending.
    Retry {
        /// Verified index.
        index: usize,
        /// Stage that failed.
        stage: VerificationStage,
    },
    /// The ceiling failed; the slot was forced visible.
    ForcedOverride {
        /// Verified index.
        index: usize,
        /// Time from activation to the override.
        waited: Duration,
    },
    /// The timer belonged to a superseded or resolved instance.
    Stale,
}

impl CheckOutcome {
    /// The index resolved by this outcome, if it resolved one.
    #[must_use]
    pub fn resolved_index(&self) -> Option<usize> {
        match *self {
            CheckOutcome::Confirmed { index, .. } | CheckOutcome::ForcedOverride { index, .. } => {
                Some(index)
            }
            CheckOutcome::Retry { .. } | CheckOutcome::Stale => None,
        }
    }
}

/// Counters kept by the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationStats {
    /// Activations.
    pub started: u64,
    /// Instances confirmed by a check.
    pub confirmed: u64,
    /// Instances resolved by forced override.
    pub forced: u64,
    /// Instances superseded before resolving.
    pub superseded: u64,
}

/// The verification state machine.
#[derive(Debug)]
pub struct VisibilityVerifier {
    timings: VerificationTimings,
    generation: u64,
    target: Option<usize>,
    phase: VerificationPhase,
    pending: Vec<(VerificationStage, TimerId)>,
    activated_at: Duration,
    stats: VerificationStats,
}

impl VisibilityVerifier {
    /// Create an idle verifier.
    #[must_use]
    pub fn new(timings: VerificationTimings) -> Self {
        Self {
            timings,
            generation: 0,
            target: None,
            phase: VerificationPhase::Idle,
            pending: Vec::new(),
            activated_at: Duration::ZERO,
            stats: VerificationStats::default(),
        }
    }

    /// Start verifying `index`, superseding any in-flight instance.
    ///
    /// The target is requested visible and every other slot hidden before
    /// any check is scheduled. `terminal` selects the extended ceiling.
    pub fn activate<F: ItemRendererFactory>(
        &mut self,
        index: usize,
        terminal: bool,
        slots: &mut SlotLifecycleController<F>,
        scheduler: &mut Scheduler<FlowTimer>,
    ) {
        if matches!(self.phase, VerificationPhase::Staged(_)) {
            self.stats.superseded += 1;
            tracing::debug!(previous = ?self.target, next = index, "verification superseded");
        }
        self.cancel_pending(scheduler);
        self.generation += 1;
        self.target = Some(index);
        self.phase = VerificationPhase::Staged(VerificationStage::Immediate);
        self.activated_at = scheduler.now();
        self.stats.started += 1;

        slots.show_only(index);

        for stage in VerificationStage::ALL {
            let id = scheduler.schedule_after(
                stage.offset(&self.timings, terminal),
                FlowTimer::Verify {
                    generation: self.generation,
                    stage,
                },
            );
            self.pending.push((stage, id));
        }
        tracing::debug!(index, generation = self.generation, terminal, "verification activated");
    }

    /// Handle a `Verify` timer.
    pub fn on_timer<F: ItemRendererFactory>(
        &mut self,
        generation: u64,
        stage: VerificationStage,
        slots: &mut SlotLifecycleController<F>,
        scheduler: &mut Scheduler<FlowTimer>,
    ) -> CheckOutcome {
        if generation != self.generation || !matches!(self.phase, VerificationPhase::Staged(_)) {
            return CheckOutcome::Stale;
        }
        self.pending.retain(|&(s, _)| s != stage);
        self.run_check(stage, slots, scheduler)
    }

    /// Handle a structural-change signal for `index`: run the staged check
    /// now instead of waiting for its timer.
    ///
    /// An early `Ceiling` check can only confirm. If the slot is still not
    /// perceptible, the ceiling timer stays scheduled and the override waits
    /// for it.
    pub fn on_structural_change<F: ItemRendererFactory>(
        &mut self,
        index: usize,
        slots: &mut SlotLifecycleController<F>,
        scheduler: &mut Scheduler<FlowTimer>,
    ) -> CheckOutcome {
        let VerificationPhase::Staged(stage) = self.phase else {
            return CheckOutcome::Stale;
        };
        if self.target != Some(index) {
            return CheckOutcome::Stale;
        }
        if stage == VerificationStage::Ceiling && !slots.is_perceptible(index) {
            tracing::trace!(index, "structural change before the ceiling; still not perceptible");
            return CheckOutcome::Retry { index, stage };
        }
        if let Some(pos) = self.pending.iter().position(|&(s, _)| s == stage) {
            let (_, id) = self.pending.remove(pos);
            scheduler.cancel(id);
        }
        tracing::trace!(index, ?stage, "structural change short-circuits check");
        self.run_check(stage, slots, scheduler)
    }

    fn run_check<F: ItemRendererFactory>(
        &mut self,
        stage: VerificationStage,
        slots: &mut SlotLifecycleController<F>,
        scheduler: &mut Scheduler<FlowTimer>,
    ) -> CheckOutcome {
        let Some(index) = self.target else {
            return CheckOutcome::Stale;
        };

        if slots.is_perceptible(index) {
            slots.set_state(index, SlotState::Visible);
            self.cancel_pending(scheduler);
            self.phase = VerificationPhase::Confirmed;
            self.stats.confirmed += 1;
            tracing::debug!(index, ?stage, "visibility confirmed");
            return CheckOutcome::Confirmed { index, stage };
        }

        slots.set_state(index, SlotState::Failed);
        match stage {
            VerificationStage::Ceiling => {
                slots.force_visible(index);
                self.cancel_pending(scheduler);
                self.phase = VerificationPhase::ForcedOverride;
                self.stats.forced += 1;
                let waited = scheduler.now().saturating_sub(self.activated_at);
                tracing::warn!(
                    index,
                    waited_ms = waited.as_millis() as u64,
                    "visibility never confirmed; forcing slot visible"
                );
                CheckOutcome::ForcedOverride { index, waited }
            }
            VerificationStage::Standard => {
                slots.ensure_visible(index);
                self.phase = VerificationPhase::Staged(VerificationStage::Ceiling);
                tracing::debug!(index, "standard check failed; re-applied visible style");
                CheckOutcome::Retry { index, stage }
            }
            VerificationStage::Immediate => {
                self.phase = VerificationPhase::Staged(VerificationStage::Short);
                CheckOutcome::Retry { index, stage }
            }
            VerificationStage::Short => {
                self.phase = VerificationPhase::Staged(VerificationStage::Standard);
                CheckOutcome::Retry { index, stage }
            }
        }
    }

    /// Cancel the in-flight instance and return to idle.
    pub fn cancel(&mut self, scheduler: &mut Scheduler<FlowTimer>) {
        self.cancel_pending(scheduler);
        self.generation += 1;
        self.target = None;
        self.phase = VerificationPhase::Idle;
    }

    fn cancel_pending(&mut self, scheduler: &mut Scheduler<FlowTimer>) {
        for (_, id) in self.pending.drain(..) {
            scheduler.cancel(id);
        }
    }

    /// Verification status of `index`.
    #[must_use]
    pub fn status_for(&self, index: usize) -> VerificationStatus {
        if self.target != Some(index) {
            return VerificationStatus::Idle;
        }
        match self.phase {
            VerificationPhase::Idle => VerificationStatus::Idle,
            VerificationPhase::Staged(_) => VerificationStatus::InFlight,
            VerificationPhase::Confirmed | VerificationPhase::ForcedOverride => {
                VerificationStatus::Resolved
            }
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> VerificationPhase {
        self.phase
    }

    /// Index being verified.
    #[must_use]
    pub fn target(&self) -> Option<usize> {
        self.target
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Timers still pending for the current instance.
    #[must_use]
    pub fn pending_checks(&self) -> usize {
        self.pending.len()
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> VerificationStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflow_core::{Item, ItemKind};
    use qflow_widgets::{
        AnswerListener, ConstructionError, Extent, SlotHandle, VisibilityStyle,
    };
    use std::cell::Cell;
    use std::rc::Rc;

    /// Handle that stays hidden until `shown` is set.
    struct Lagging {
        style: VisibilityStyle,
        shown: Rc<Cell<bool>>,
    }

    impl SlotHandle for Lagging {
        fn has_content(&self) -> bool {
            true
        }
        fn extent(&self) -> Extent {
            if self.shown.get() { Extent::new(40, 4) } else { Extent::ZERO }
        }
        fn is_hidden(&self) -> bool {
            self.style == VisibilityStyle::Hidden || !self.shown.get()
        }
        fn apply_style(&mut self, style: VisibilityStyle) {
            self.style = style;
        }
    }

    type Factory =
        Box<dyn FnMut(&Item, AnswerListener) -> Result<Box<dyn SlotHandle>, ConstructionError>>;

    fn setup(shown: bool) -> (SlotLifecycleController<Factory>, Rc<Cell<bool>>) {
        let flag = Rc::new(Cell::new(shown));
        let f = flag.clone();
        let factory: Factory = Box::new(move |_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            Ok(Box::new(Lagging {
                style: VisibilityStyle::Hidden,
                shown: f.clone(),
            }) as Box<dyn SlotHandle>)
        });
        let mut slots = SlotLifecycleController::new(factory);
        for i in 0..2 {
            slots.acquire(i, &Item::new(format!("q{}", i + 1), i, ItemKind::SingleChoice), None);
        }
        (slots, flag)
    }

    fn drive(
        verifier: &mut VisibilityVerifier,
        slots: &mut SlotLifecycleController<Factory>,
        scheduler: &mut Scheduler<FlowTimer>,
        until: Duration,
    ) -> Vec<CheckOutcome> {
        let mut outcomes = Vec::new();
        while let Some((_, timer)) = scheduler.pop_due(until) {
            if let FlowTimer::Verify { generation, stage } = timer {
                outcomes.push(verifier.on_timer(generation, stage, slots, scheduler));
            }
        }
        outcomes
    }

    #[test]
    fn confirms_at_first_stage_and_cancels_rest() {
        let (mut slots, _) = setup(true);
        let mut scheduler = Scheduler::new();
        let mut verifier = VisibilityVerifier::new(VerificationTimings::default());

        verifier.activate(0, false, &mut slots, &mut scheduler);
        assert_eq!(verifier.status_for(0), VerificationStatus::InFlight);
        assert_eq!(scheduler.pending(), 4);

        let outcomes = drive(&mut verifier, &mut slots, &mut scheduler, Duration::from_secs(1));
        assert_eq!(
            outcomes,
            vec![CheckOutcome::Confirmed { index: 0, stage: VerificationStage::Immediate }]
        );
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(slots.slot(0).unwrap().state(), SlotState::Visible);
        assert_eq!(slots.slot(1).unwrap().state(), SlotState::Hidden);
        assert_eq!(verifier.status_for(0), VerificationStatus::Resolved);
    }

    #[test]
    fn forced_override_at_ceiling() {
        let (mut slots, _) = setup(false);
        let mut scheduler = Scheduler::new();
        let mut verifier = VisibilityVerifier::new(VerificationTimings::default());

        verifier.activate(1, true, &mut slots, &mut scheduler);
        let early = drive(&mut verifier, &mut slots, &mut scheduler, Duration::from_millis(1999));
        assert_eq!(early.len(), 3);
        assert!(early.iter().all(|o| matches!(o, CheckOutcome::Retry { .. })));
        assert_eq!(slots.slot(1).unwrap().state(), SlotState::Failed);

        let last = drive(&mut verifier, &mut slots, &mut scheduler, Duration::from_millis(2000));
        assert_eq!(
            last,
            vec![CheckOutcome::ForcedOverride { index: 1, waited: Duration::from_millis(2000) }]
        );
        assert_eq!(slots.slot(1).unwrap().state(), SlotState::Visible);
        assert_eq!(verifier.phase(), VerificationPhase::ForcedOverride);
    }

    #[test]
    fn structural_change_short_circuits() {
        let (mut slots, shown) = setup(false);
        let mut scheduler = Scheduler::new();
        let mut verifier = VisibilityVerifier::new(VerificationTimings::default());

        verifier.activate(0, false, &mut slots, &mut scheduler);
        drive(&mut verifier, &mut slots, &mut scheduler, Duration::from_millis(30));
        assert_eq!(verifier.phase(), VerificationPhase::Staged(VerificationStage::Standard));

        shown.set(true);
        let outcome = verifier.on_structural_change(0, &mut slots, &mut scheduler);
        assert_eq!(
            outcome,
            CheckOutcome::Confirmed { index: 0, stage: VerificationStage::Standard }
        );
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(verifier.on_structural_change(0, &mut slots, &mut scheduler), CheckOutcome::Stale);
    }

    #[test]
    fn early_ceiling_check_never_forces() {
        let (mut slots, shown) = setup(false);
        let mut scheduler = Scheduler::new();
        let mut verifier = VisibilityVerifier::new(VerificationTimings::default());

        verifier.activate(1, true, &mut slots, &mut scheduler);
        drive(&mut verifier, &mut slots, &mut scheduler, Duration::from_millis(80));
        assert_eq!(verifier.phase(), VerificationPhase::Staged(VerificationStage::Ceiling));
        assert_eq!(verifier.pending_checks(), 1);

        let outcome = verifier.on_structural_change(1, &mut slots, &mut scheduler);
        assert_eq!(
            outcome,
            CheckOutcome::Retry { index: 1, stage: VerificationStage::Ceiling }
        );
        assert_eq!(verifier.phase(), VerificationPhase::Staged(VerificationStage::Ceiling));
        assert_eq!(verifier.pending_checks(), 1);
        assert_eq!(verifier.target(), Some(1));
        assert_eq!(scheduler.next_deadline(), Some(Duration::from_millis(2000)));

        shown.set(true);
        let outcome = verifier.on_structural_change(1, &mut slots, &mut scheduler);
        assert_eq!(
            outcome,
            CheckOutcome::Confirmed { index: 1, stage: VerificationStage::Ceiling }
        );
        assert_eq!(verifier.pending_checks(), 0);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(verifier.stats().forced, 0);
    }

    #[test]
    fn reactivation_supersedes_old_timers() {
        let (mut slots, shown) = setup(false);
        let mut scheduler = Scheduler::new();
        let mut verifier = VisibilityVerifier::new(VerificationTimings::default());

        verifier.activate(0, false, &mut slots, &mut scheduler);
        let old = verifier.generation();
        verifier.activate(1, false, &mut slots, &mut scheduler);
        assert_eq!(scheduler.pending(), 4);
        assert_eq!(verifier.stats().superseded, 1);

        shown.set(true);
        assert_eq!(
            verifier.on_timer(old, VerificationStage::Immediate, &mut slots, &mut scheduler),
            CheckOutcome::Stale
        );
        let outcomes = drive(&mut verifier, &mut slots, &mut scheduler, Duration::from_secs(1));
        assert_eq!(outcomes[0].resolved_index(), Some(1));
        assert_eq!(slots.slot(0).unwrap().state(), SlotState::Hidden);
    }

    #[test]
    fn cancel_returns_to_idle() {
        let (mut slots, _) = setup(false);
        let mut scheduler = Scheduler::new();
        let mut verifier = VisibilityVerifier::new(VerificationTimings::default());
        verifier.activate(0, false, &mut slots, &mut scheduler);
        verifier.cancel(&mut scheduler);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(verifier.status_for(0), VerificationStatus::Idle);
    }
}
