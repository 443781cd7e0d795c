#![forbid(unsafe_code)]

//! The question flow orchestrator.
//!
//! [`QuestionFlow`] wires the window, slot lifecycle, verifier, navigation,
//! answer store, and completion coordinator together. It is host-driven:
//! input arrives through method calls, slot events through [`pump`], and
//! time through [`advance_time`].
//!
//! # Ordering
//!
//! Navigation and answer handlers run to completion and never fire timers.
//! Timers fire only inside [`advance_time`], one at a time in deadline order,
//! so a verification check always sees the state left by the navigation that
//! scheduled it.
//!
//! # Failure Modes
//!
//! Nothing here returns an error. Source, construction, storage, visibility,
//! and data-shape failures are logged, recorded in [`diagnostics`], and the
//! flow continues in a degraded mode.
//!
//! [`pump`]: QuestionFlow::pump
//! [`advance_time`]: QuestionFlow::advance_time
//! [`diagnostics`]: QuestionFlow::diagnostics

use std::sync::Arc;
use std::time::Duration;

use qflow_core::{AnswerRecord, AnswerValue, Item, ItemId, QuestionSource};
use qflow_widgets::{
    ItemRendererFactory, RenderSlot, SlotLifecycleController, SlotSignal, SlotState,
    ViewportWindow, ViewportWindowManager,
};

use crate::answer_store::AnswerStore;
use crate::completion::{
    CompletionAction, CompletionCoordinator, CompletionSink, NoopCompletion, NoopProgress,
    ProgressSink,
};
use crate::config::FlowConfig;
use crate::diagnostics::{DiagnosticLog, FlowDiagnostic};
use crate::navigation::{NavCommand, NavigationController, NavigationState};
use crate::persistence::{NullStore, PersistenceStore};
use crate::scheduler::{FlowTimer, Scheduler, TimerId};
use crate::verification::{CheckOutcome, VerificationPhase, VerificationStatus, VisibilityVerifier};

/// Memory attributed to each materialized slot in [`FlowStats`].
const SLOT_MEMORY_ESTIMATE: usize = 50 * 1024;

/// Progress for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// 1-based position of the current item; 0 when there are no items.
    pub current_number: usize,
    /// Number of items.
    pub total: usize,
    /// Items answered.
    pub completed: usize,
    /// `current_number / total` as a percentage.
    pub position_percent: f64,
    /// `completed / total` as a percentage.
    pub answered_percent: f64,
}

/// Runtime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowStats {
    /// Window renders.
    pub render_passes: u64,
    /// Slots served from the pool.
    pub pool_hits: u64,
    /// Slots that required construction.
    pub pool_misses: u64,
    /// Materialized slots.
    pub active_slots: usize,
    /// Pooled slots.
    pub pooled_slots: usize,
    /// Materialized fallback slots.
    pub fallback_slots: usize,
    /// Verification activations.
    pub verifications_started: u64,
    /// Verifications confirmed by a check.
    pub verifications_confirmed: u64,
    /// Verifications resolved by forced override.
    pub verifications_forced: u64,
    /// Successful persistence writes.
    pub saves: u64,
    /// Failed persistence writes.
    pub save_failures: u64,
    /// Rough memory held by materialized slots, in bytes.
    pub memory_estimate_bytes: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a [`QuestionFlow`]. Collaborators other than the source and the
/// factory default to no-ops.
pub struct FlowBuilder<S, F> {
    source: S,
    factory: F,
    store: Arc<dyn PersistenceStore>,
    progress: Box<dyn ProgressSink>,
    completion: Box<dyn CompletionSink>,
    config: FlowConfig,
}

impl<S: QuestionSource, F: ItemRendererFactory> FlowBuilder<S, F> {
    /// Start a builder.
    #[must_use]
    pub fn new(source: S, factory: F) -> Self {
        Self {
            source,
            factory,
            store: Arc::new(NullStore),
            progress: Box::new(NoopProgress),
            completion: Box::new(NoopCompletion),
            config: FlowConfig::default(),
        }
    }

    /// Set the Persistence Store.
    #[must_use]
    pub fn persistence(mut self, store: Arc<dyn PersistenceStore>) -> Self {
        self.store = store;
        self
    }

    /// Set the Progress Sink.
    #[must_use]
    pub fn on_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(sink);
        self
    }

    /// Set the Completion Sink.
    #[must_use]
    pub fn on_complete(mut self, sink: impl CompletionSink + 'static) -> Self {
        self.completion = Box::new(sink);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    /// Load items and stored answers and build the flow. Never fails.
    pub fn build(self) -> QuestionFlow<F> {
        let mut diagnostics = DiagnosticLog::new(self.config.max_diagnostics);

        let items = match self.source.load_items() {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(source = self.source.name(), error = %e, "question source failed; flow is empty");
                diagnostics.record(Duration::ZERO, FlowDiagnostic::SourceUnavailable(e.to_string()));
                Vec::new()
            }
        };

        let mut answers = AnswerStore::new(self.store);
        let report = answers.load();
        if let Some(e) = report.error {
            diagnostics.record(Duration::ZERO, FlowDiagnostic::StorageRead(e.to_string()));
        }
        for repair in report.repairs {
            diagnostics.record(Duration::ZERO, FlowDiagnostic::InvariantViolation(repair));
        }

        tracing::info!(
            source = self.source.name(),
            items = items.len(),
            restored = report.loaded,
            "question flow built"
        );

        QuestionFlow {
            nav: NavigationController::new(items.len()),
            window: ViewportWindowManager::new(self.config.buffer_size),
            slots: SlotLifecycleController::new(self.factory),
            verifier: VisibilityVerifier::new(self.config.verification),
            scheduler: Scheduler::new(),
            completion: CompletionCoordinator::new(),
            progress_sink: self.progress,
            completion_sink: self.completion,
            items,
            answers,
            diagnostics,
            config: self.config,
            render_passes: 0,
            started: false,
            shut_down: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flow
// ─────────────────────────────────────────────────────────────────────────────

/// A windowed, verified question flow.
pub struct QuestionFlow<F> {
    config: FlowConfig,
    items: Vec<Item>,
    scheduler: Scheduler<FlowTimer>,
    slots: SlotLifecycleController<F>,
    window: ViewportWindowManager,
    nav: NavigationController,
    verifier: VisibilityVerifier,
    answers: AnswerStore,
    completion: CompletionCoordinator,
    progress_sink: Box<dyn ProgressSink>,
    completion_sink: Box<dyn CompletionSink>,
    diagnostics: DiagnosticLog,
    render_passes: u64,
    started: bool,
    shut_down: bool,
}

impl<F: ItemRendererFactory> QuestionFlow<F> {
    /// Render the first window and start verifying the current item.
    pub fn start(&mut self) {
        if self.started || self.shut_down {
            return;
        }
        self.started = true;
        self.render();
        self.emit_progress();
    }

    /// Move forward if the current item is answered.
    pub fn go_next(&mut self) -> bool {
        if !self.ready() {
            return false;
        }
        match self.nav.go_next(&self.items, &self.answers) {
            Some(index) => {
                tracing::debug!(index, "navigated forward");
                self.render();
                self.emit_progress();
                true
            }
            None => false,
        }
    }

    /// Move back.
    pub fn go_previous(&mut self) -> bool {
        if !self.ready() {
            return false;
        }
        match self.nav.go_previous() {
            Some(index) => {
                tracing::debug!(index, "navigated back");
                self.render();
                self.emit_progress();
                true
            }
            None => false,
        }
    }

    /// Apply a navigation command if its affordance is enabled.
    pub fn handle_command(&mut self, command: NavCommand) -> bool {
        match command {
            NavCommand::Next if self.can_go_next() => self.go_next(),
            NavCommand::Previous if self.can_go_previous() => self.go_previous(),
            NavCommand::Next | NavCommand::Previous => false,
        }
    }

    /// Record an answer for `item_id`.
    ///
    /// Unknown items and values that do not fit the item kind are rejected
    /// and recorded as invariant violations. Returns whether the store changed.
    pub fn submit_answer(&mut self, item_id: &str, value: AnswerValue) -> bool {
        if self.shut_down {
            return false;
        }
        let Some(item) = self.items.iter().find(|i| i.id.as_str() == item_id) else {
            self.record(FlowDiagnostic::InvariantViolation(format!(
                "answer for unknown item {item_id}"
            )));
            return false;
        };
        if !value.fits(item.kind) {
            let msg = format!("{} answer does not fit {:?} item {item_id}", value.label(), item.kind);
            self.record(FlowDiagnostic::InvariantViolation(msg));
            return false;
        }

        let id = item.id.clone();
        if !self.answers.upsert(&id, value) {
            return false;
        }
        tracing::debug!(item = %id, "answer recorded");
        self.answers
            .debounced_persist(&mut self.scheduler, self.config.persist_debounce);
        self.on_mutation();
        self.emit_progress();
        true
    }

    /// Deliver `value` to the current slot as user input.
    ///
    /// Handles that accept input report through their listener, so the
    /// answer is applied by the pump that follows. Handles without input
    /// support get the answer recorded directly.
    pub fn select_current(&mut self, value: AnswerValue) -> bool {
        if !self.ready() {
            return false;
        }
        let current = self.nav.current();
        let accepted = self
            .slots
            .slot_mut(current)
            .is_some_and(|slot| slot.handle_mut().input(value.clone()));
        if accepted {
            self.pump();
            true
        } else {
            let Some(item_id) = self.items.get(current).map(|i| i.id.clone()) else {
                return false;
            };
            self.submit_answer(item_id.as_str(), value)
        }
    }

    /// Drain pending slot signals. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(signal) = self.slots.poll_signal() {
            handled += 1;
            match signal {
                SlotSignal::Answer { item_id, value, .. } => {
                    self.submit_answer(item_id.as_str(), value);
                }
                SlotSignal::StructureChanged { item_id } => {
                    self.notify_structural_change(item_id.as_str());
                }
            }
        }
        handled
    }

    /// A slot's render tree changed. If it is the slot under verification,
    /// its next check runs now.
    pub fn notify_structural_change(&mut self, item_id: &str) {
        if !self.ready() {
            return;
        }
        let current = self.nav.current();
        let is_current = self
            .slots
            .slot(current)
            .is_some_and(|slot| slot.item_id().as_str() == item_id);
        if !is_current {
            tracing::trace!(item = item_id, "structural change on a non-current slot");
            return;
        }
        let outcome = self
            .verifier
            .on_structural_change(current, &mut self.slots, &mut self.scheduler);
        self.handle_outcome(outcome);
    }

    /// Advance the flow clock by `dt`, firing every timer that falls due.
    pub fn advance_time(&mut self, dt: Duration) {
        let target = self.scheduler.now().saturating_add(dt);
        self.pump();
        while let Some((id, timer)) = self.scheduler.pop_due(target) {
            self.dispatch(id, timer);
            self.pump();
        }
        self.scheduler.advance_to(target);
    }

    /// Destroy every answer, clear persisted data, and return to the first item.
    ///
    /// A completion that already fired stays fired.
    pub fn reset(&mut self) {
        if self.shut_down {
            return;
        }
        if let Err(e) = self.answers.reset(&mut self.scheduler) {
            self.record(FlowDiagnostic::StorageWrite(e.to_string()));
        }
        self.completion.disarm(&mut self.scheduler);
        self.nav.set_current(0);
        tracing::info!("question flow reset");
        if self.started {
            self.render();
            self.emit_progress();
        }
    }

    /// Stop the flow: cancel timers, flush a pending save, and recycle slots.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.verifier.cancel(&mut self.scheduler);
        self.completion.cancel_recheck(&mut self.scheduler);
        if let Some(Err(e)) = self.answers.flush_pending(&mut self.scheduler) {
            self.record(FlowDiagnostic::StorageWrite(e.to_string()));
        }
        self.window.reset(&mut self.slots);
        self.slots.clear_pool();
        self.scheduler.clear();
        self.shut_down = true;
        tracing::info!("question flow shut down");
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn ready(&self) -> bool {
        self.started && !self.shut_down
    }

    fn render(&mut self) {
        let current = self.nav.current();
        let change = self
            .window
            .set_current(current, &self.items, &mut self.slots, &self.answers);
        self.render_passes += 1;

        for (item_id, error) in self.slots.take_failures() {
            self.record(FlowDiagnostic::Construction { item_id, error });
        }

        for index in change.acquired {
            let probe = self
                .slots
                .slot(index)
                .filter(|slot| !slot.is_fallback())
                .map(|slot| slot.item_id().clone());
            if let Some(item_id) = probe {
                self.scheduler.schedule_after(
                    self.config.content_probe_delay,
                    FlowTimer::ContentProbe { index, item_id },
                );
            }
        }

        if !self.items.is_empty() {
            self.activate_verification();
        }
    }

    fn activate_verification(&mut self) {
        let current = self.nav.current();
        self.verifier
            .activate(current, self.nav.is_last(), &mut self.slots, &mut self.scheduler);
    }

    fn dispatch(&mut self, _id: TimerId, timer: FlowTimer) {
        match timer {
            FlowTimer::Verify { generation, stage } => {
                let outcome =
                    self.verifier
                        .on_timer(generation, stage, &mut self.slots, &mut self.scheduler);
                self.handle_outcome(outcome);
            }
            FlowTimer::PersistFlush => {
                if let Err(e) = self.answers.on_flush_timer() {
                    self.record(FlowDiagnostic::StorageWrite(e.to_string()));
                }
            }
            FlowTimer::CompletionRecheck => {
                let action = self.completion.on_recheck(
                    self.all_complete(),
                    self.nav.is_last(),
                    self.verifier.status_for(self.nav.current()),
                );
                self.apply_completion(action);
            }
            FlowTimer::ContentProbe { index, item_id } => self.probe_content(index, &item_id),
        }
    }

    fn probe_content(&mut self, index: usize, item_id: &ItemId) {
        let Some(item) = self.items.get(index).filter(|i| &i.id == item_id) else {
            return;
        };
        if !self.slots.probe_content(index, item) {
            return;
        }
        self.record(FlowDiagnostic::ContentMissing {
            item_id: item_id.clone(),
        });
        if index == self.nav.current() {
            self.activate_verification();
        }
    }

    fn handle_outcome(&mut self, outcome: CheckOutcome) {
        if let CheckOutcome::ForcedOverride { index, waited } = outcome
            && let Some(item) = self.items.get(index)
        {
            let item_id = item.id.clone();
            self.record(FlowDiagnostic::VisibilityTimeout { item_id, waited });
        }
        if let Some(index) = outcome.resolved_index() {
            self.on_resolution(index);
        }
    }

    fn on_resolution(&mut self, index: usize) {
        if index != self.nav.current() || !self.nav.is_last() {
            return;
        }
        if self.completion.on_resolution(self.all_complete()) {
            self.fire_completion();
        }
    }

    fn on_mutation(&mut self) {
        let action = self.completion.on_mutation(
            self.all_complete(),
            self.nav.is_last(),
            self.verifier.status_for(self.nav.current()),
        );
        self.apply_completion(action);
    }

    fn apply_completion(&mut self, action: CompletionAction) {
        match action {
            CompletionAction::Fire => self.fire_completion(),
            CompletionAction::Verify => self.activate_verification(),
            CompletionAction::ScheduleRecheck => {
                let id = self.scheduler.schedule_after(
                    self.config.completion_recheck_delay,
                    FlowTimer::CompletionRecheck,
                );
                self.completion.set_recheck(id);
            }
            CompletionAction::Await | CompletionAction::None => {}
        }
    }

    fn fire_completion(&mut self) {
        if let Some(Err(e)) = self.answers.flush_pending(&mut self.scheduler) {
            self.record(FlowDiagnostic::StorageWrite(e.to_string()));
        }
        self.completion.mark_fired();
        tracing::info!(
            records = self.answers.len(),
            at_ms = self.scheduler.now().as_millis() as u64,
            "question flow complete"
        );
        self.completion_sink.on_complete(self.answers.records());
    }

    fn emit_progress(&mut self) {
        let percent = self.progress().answered_percent;
        self.progress_sink.on_progress(percent);
    }
}

impl<F> QuestionFlow<F> {
    fn all_complete(&self) -> bool {
        !self.items.is_empty() && self.answers.completed_count(&self.items) == self.items.len()
    }

    fn record(&mut self, diagnostic: FlowDiagnostic) {
        self.diagnostics.record(self.scheduler.now(), diagnostic);
    }

    /// Loaded items.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Current index.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.nav.current()
    }

    /// The current item.
    #[must_use]
    pub fn current_item(&self) -> Option<&Item> {
        self.items.get(self.nav.current())
    }

    /// Materialized window.
    #[must_use]
    pub fn window(&self) -> Option<ViewportWindow> {
        self.window.window()
    }

    /// Whether forward navigation is enabled.
    #[must_use]
    pub fn can_go_next(&self) -> bool {
        !self.shut_down && self.nav.can_go_next(&self.items, &self.answers)
    }

    /// Whether backward navigation is enabled.
    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        !self.shut_down && self.nav.can_go_previous()
    }

    /// Navigation snapshot.
    #[must_use]
    pub fn navigation_state(&self) -> NavigationState {
        self.nav.state(&self.items, &self.answers)
    }

    /// Progress snapshot.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        let total = self.items.len();
        let completed = self.answers.completed_count(&self.items);
        let current_number = if total == 0 { 0 } else { self.nav.current() + 1 };
        let percent = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 / total as f64 * 100.0
            }
        };
        ProgressSnapshot {
            current_number,
            total,
            completed,
            position_percent: percent(current_number),
            answered_percent: percent(completed),
        }
    }

    /// Runtime counters.
    #[must_use]
    pub fn stats(&self) -> FlowStats {
        let lifecycle = self.slots.stats();
        let verification = self.verifier.stats();
        let active = self.slots.active_len();
        FlowStats {
            render_passes: self.render_passes,
            pool_hits: lifecycle.pool_hits,
            pool_misses: lifecycle.pool_misses,
            active_slots: active,
            pooled_slots: self.slots.pool().len(),
            fallback_slots: self.slots.fallback_count(),
            verifications_started: verification.started,
            verifications_confirmed: verification.confirmed,
            verifications_forced: verification.forced,
            saves: self.answers.saves(),
            save_failures: self.answers.save_failures(),
            memory_estimate_bytes: active * SLOT_MEMORY_ESTIMATE,
        }
    }

    /// Recorded diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    /// Answer records.
    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        self.answers.records()
    }

    /// Record for one item.
    #[must_use]
    pub fn answer_for(&self, item_id: &str) -> Option<&AnswerRecord> {
        self.answers.find(item_id)
    }

    /// State of the slot at `index`, if materialized.
    #[must_use]
    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.slots.slot(index).map(RenderSlot::state)
    }

    /// The slot at `index`, if materialized.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&RenderSlot> {
        self.slots.slot(index)
    }

    /// Materialized slots in index order.
    pub fn active_slots(&self) -> impl Iterator<Item = (usize, &RenderSlot)> {
        self.slots.active()
    }

    /// Slots in the `Visible` state, materialized or pooled.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.slots.visible_count()
    }

    /// Pooled item ids.
    pub fn pooled_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.slots.pool().item_ids()
    }

    /// Text of the current slot.
    #[must_use]
    pub fn current_lines(&self) -> Vec<String> {
        self.slots
            .slot(self.nav.current())
            .map(|slot| slot.handle().lines())
            .unwrap_or_default()
    }

    /// Verification phase of the current instance.
    #[must_use]
    pub fn verification_phase(&self) -> VerificationPhase {
        self.verifier.phase()
    }

    /// Verification status of `index`.
    #[must_use]
    pub fn verification_status(&self, index: usize) -> VerificationStatus {
        self.verifier.status_for(index)
    }

    /// Whether the completion callback has run.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completion.is_fired()
    }

    /// Whether a debounced save is pending.
    #[must_use]
    pub fn has_pending_save(&self) -> bool {
        self.answers.has_pending_flush()
    }

    /// Flow clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    /// Pending timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<F> std::fmt::Debug for QuestionFlow<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionFlow")
            .field("items", &self.items.len())
            .field("current", &self.nav.current())
            .field("window", &self.window.window())
            .field("answers", &self.answers)
            .field("verification", &self.verifier.phase())
            .field("completed", &self.completion.is_fired())
            .finish()
    }
}
