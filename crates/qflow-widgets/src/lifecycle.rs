#![forbid(unsafe_code)]

//! Slot construction, wiring, recycling, and repair.
//!
//! [`SlotLifecycleController`] owns the materialized slots (keyed by item
//! index) and the [`SlotPool`]. Acquiring an item reuses its pooled slot when
//! one exists and otherwise asks the [`ItemRendererFactory`] for a new handle.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `ConstructionError::Failed` | Factory returned an error | Fallback slot, logged |
//! | `ConstructionError::Panicked` | Factory panicked | Panic caught, fallback slot, logged |
//! | `ConstructionError::EmptyContent` | Handle has no content | Fallback slot, logged |
//!
//! Construction errors never propagate; they are queued for the owner to
//! inspect with [`SlotLifecycleController::take_failures`].

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;

use qflow_core::{AnswerRecord, Item, ItemId};

use crate::fallback::FallbackSlot;
use crate::pool::SlotPool;
use crate::slot::{AnswerListener, RenderSlot, SlotHandle, SlotSignal, SlotState, VisibilityStyle};

/// Why a factory-built handle could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// The factory reported an error.
    Failed(String),
    /// The factory panicked; the payload message is kept.
    Panicked(String),
    /// The handle has no discoverable content.
    EmptyContent,
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionError::Failed(msg) => write!(f, "construction failed: {msg}"),
            ConstructionError::Panicked(msg) => write!(f, "construction panicked: {msg}"),
            ConstructionError::EmptyContent => write!(f, "constructed slot has no content"),
        }
    }
}

impl std::error::Error for ConstructionError {}

/// Builds handles for items.
pub trait ItemRendererFactory {
    /// Build a handle for `item`. The handle must report answers and render
    /// changes through `listener`.
    fn create(
        &mut self,
        item: &Item,
        listener: AnswerListener,
    ) -> Result<Box<dyn SlotHandle>, ConstructionError>;
}

impl<F> ItemRendererFactory for F
where
    F: FnMut(&Item, AnswerListener) -> Result<Box<dyn SlotHandle>, ConstructionError>,
{
    fn create(
        &mut self,
        item: &Item,
        listener: AnswerListener,
    ) -> Result<Box<dyn SlotHandle>, ConstructionError> {
        self(item, listener)
    }
}

/// How [`SlotLifecycleController::acquire`] satisfied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The item was already materialized.
    Existing,
    /// A pooled slot was reused.
    Recycled,
    /// A new slot was built.
    Constructed {
        /// Whether the fallback stand-in was used.
        fallback: bool,
    },
}

/// Counters kept by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    /// Acquisitions served from the pool.
    pub pool_hits: u64,
    /// Acquisitions that required construction.
    pub pool_misses: u64,
    /// Factory-built slots in use.
    pub constructed: u64,
    /// Fallback slots built (at construction or by a later content probe).
    pub fallbacks: u64,
    /// Answers restored into slots.
    pub restores: u64,
}

/// Owns materialized slots and the pool.
pub struct SlotLifecycleController<F> {
    factory: F,
    active: BTreeMap<usize, RenderSlot>,
    pool: SlotPool,
    tx: mpsc::Sender<SlotSignal>,
    rx: mpsc::Receiver<SlotSignal>,
    failures: Vec<(ItemId, ConstructionError)>,
    stats: LifecycleStats,
}

impl<F: ItemRendererFactory> SlotLifecycleController<F> {
    /// Create a controller around `factory`.
    #[must_use]
    pub fn new(factory: F) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            factory,
            active: BTreeMap::new(),
            pool: SlotPool::new(),
            tx,
            rx,
            failures: Vec::new(),
            stats: LifecycleStats::default(),
        }
    }

    /// Materialize `item` at `index`, attached and hidden.
    ///
    /// When `restore` is given and the handle supports it, the stored answer
    /// is shown.
    pub fn acquire(&mut self, index: usize, item: &Item, restore: Option<&AnswerRecord>) -> Acquired {
        if self.active.contains_key(&index) {
            return Acquired::Existing;
        }

        let (mut slot, acquired) = match self.pool.acquire(item.id.as_str()) {
            Some(slot) => {
                self.stats.pool_hits += 1;
                (slot, Acquired::Recycled)
            }
            None => {
                self.stats.pool_misses += 1;
                let slot = self.construct(item);
                let fallback = slot.is_fallback();
                (slot, Acquired::Constructed { fallback })
            }
        };

        slot.attach();
        if let Some(record) = restore
            && slot.handle_mut().restore(record)
        {
            self.stats.restores += 1;
        }
        tracing::debug!(index, item = %item.id, ?acquired, "slot materialized");
        self.active.insert(index, slot);
        acquired
    }

    /// Recycle the slot at `index` into the pool.
    pub fn release(&mut self, index: usize) -> bool {
        match self.active.remove(&index) {
            Some(slot) => {
                let id = slot.item_id().clone();
                tracing::debug!(index, item = %id, "slot recycled");
                self.pool.release(id, slot);
                true
            }
            None => false,
        }
    }

    /// Recycle every materialized slot.
    pub fn release_all(&mut self) {
        let indices: Vec<usize> = self.active.keys().copied().collect();
        for index in indices {
            self.release(index);
        }
    }

    /// Request visibility for `index` and hide every other slot.
    pub fn show_only(&mut self, index: usize) {
        for (&i, slot) in &mut self.active {
            if i == index {
                slot.request_visible();
            } else {
                slot.hide();
            }
        }
    }

    /// Re-apply canonical visible styling to `index`.
    pub fn ensure_visible(&mut self, index: usize) -> bool {
        match self.active.get_mut(&index) {
            Some(slot) => {
                slot.reapply_visible();
                true
            }
            None => false,
        }
    }

    /// Apply maximum-priority visible styling to `index`.
    pub fn force_visible(&mut self, index: usize) -> bool {
        match self.active.get_mut(&index) {
            Some(slot) => {
                slot.force_visible();
                true
            }
            None => false,
        }
    }

    /// Run the visibility predicate for `index`.
    #[must_use]
    pub fn is_perceptible(&self, index: usize) -> bool {
        self.active.get(&index).is_some_and(RenderSlot::is_perceptible)
    }

    /// Replace the handle at `index` with a fallback if it has no content.
    ///
    /// Returns true when a replacement happened. The new handle inherits the
    /// old one's visibility request.
    pub fn probe_content(&mut self, index: usize, item: &Item) -> bool {
        let tx = self.tx.clone();
        let Some(slot) = self.active.get_mut(&index) else {
            return false;
        };
        if slot.is_fallback() || slot.item_id() != &item.id || slot.handle().has_content() {
            return false;
        }

        let mut fallback = FallbackSlot::new(AnswerListener::new(item, tx));
        let style = match slot.state() {
            SlotState::Verifying | SlotState::Failed | SlotState::Visible => VisibilityStyle::Visible,
            SlotState::Unbound | SlotState::Hidden => VisibilityStyle::Hidden,
        };
        fallback.apply_style(style);
        let mut old = slot.replace_handle(Box::new(fallback), true);
        old.on_detach();
        slot.handle_mut().on_attach();

        tracing::warn!(index, item = %item.id, "slot lost its content; replaced with fallback");
        self.stats.fallbacks += 1;
        self.stats.constructed = self.stats.constructed.saturating_sub(1);
        true
    }

    fn construct(&mut self, item: &Item) -> RenderSlot {
        let listener = AnswerListener::new(item, self.tx.clone());
        let factory = &mut self.factory;
        let outcome = catch_unwind(AssertUnwindSafe(|| factory.create(item, listener.clone())));

        let error = match outcome {
            Ok(Ok(handle)) if handle.has_content() => {
                self.stats.constructed += 1;
                return RenderSlot::new(item, handle, false);
            }
            Ok(Ok(_)) => ConstructionError::EmptyContent,
            Ok(Err(e)) => e,
            Err(payload) => ConstructionError::Panicked(panic_message(payload.as_ref())),
        };

        tracing::warn!(item = %item.id, error = %error, "slot construction failed; using fallback");
        self.stats.fallbacks += 1;
        self.failures.push((item.id.clone(), error));
        RenderSlot::new(item, Box::new(FallbackSlot::new(listener)), true)
    }
}

impl<F> SlotLifecycleController<F> {
    /// The slot at `index`.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&RenderSlot> {
        self.active.get(&index)
    }

    /// The slot at `index`, mutably.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut RenderSlot> {
        self.active.get_mut(&index)
    }

    /// Set the state of the slot at `index`.
    pub fn set_state(&mut self, index: usize, state: SlotState) -> bool {
        match self.active.get_mut(&index) {
            Some(slot) => {
                slot.set_state(state);
                true
            }
            None => false,
        }
    }

    /// Materialized slots in index order.
    pub fn active(&self) -> impl Iterator<Item = (usize, &RenderSlot)> {
        self.active.iter().map(|(&i, s)| (i, s))
    }

    /// Materialized indices in order.
    #[must_use]
    pub fn active_indices(&self) -> Vec<usize> {
        self.active.keys().copied().collect()
    }

    /// Number of materialized slots.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Slots in [`SlotState::Visible`], materialized or pooled.
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.active
            .values()
            .chain(self.pool.slots())
            .filter(|s| s.state() == SlotState::Visible)
            .count()
    }

    /// Materialized fallback slots.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.active.values().filter(|s| s.is_fallback()).count()
    }

    /// The pool.
    #[must_use]
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    /// Drop every pooled slot.
    pub fn clear_pool(&mut self) {
        self.pool.clear();
    }

    /// Next pending signal from any slot listener.
    pub fn poll_signal(&self) -> Option<SlotSignal> {
        self.rx.try_recv().ok()
    }

    /// Drain queued construction failures.
    pub fn take_failures(&mut self) -> Vec<(ItemId, ConstructionError)> {
        std::mem::take(&mut self.failures)
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> LifecycleStats {
        self.stats
    }
}

impl<F> fmt::Debug for SlotLifecycleController<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotLifecycleController")
            .field("active", &self.active)
            .field("pool", &self.pool.len())
            .field("stats", &self.stats)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::test_handle::TestHandle;
    use qflow_core::{AnswerValue, Choice, ItemKind};

    type BoxedFactory =
        Box<dyn FnMut(&Item, AnswerListener) -> Result<Box<dyn SlotHandle>, ConstructionError>>;

    fn ok_factory() -> BoxedFactory {
        Box::new(|_item: &Item, _l: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            Ok(Box::new(TestHandle::visible_sized().0) as Box<dyn SlotHandle>)
        })
    }

    fn item(i: usize) -> Item {
        Item::new(format!("q{}", i + 1), i, ItemKind::SingleChoice)
    }

    #[test]
    fn construct_then_recycle_hits_pool() {
        let mut ctl = SlotLifecycleController::new(ok_factory());
        assert_eq!(
            ctl.acquire(0, &item(0), None),
            Acquired::Constructed { fallback: false }
        );
        assert_eq!(ctl.acquire(0, &item(0), None), Acquired::Existing);

        assert!(ctl.release(0));
        assert!(ctl.pool().contains("q1"));
        assert_eq!(ctl.acquire(0, &item(0), None), Acquired::Recycled);

        let stats = ctl.stats();
        assert_eq!(stats.pool_hits, 1);
        assert_eq!(stats.pool_misses, 1);
    }

    #[test]
    fn factory_error_yields_fallback() {
        let factory = |_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            Err(ConstructionError::Failed("no template".into()))
        };
        let mut ctl = SlotLifecycleController::new(factory);
        assert_eq!(
            ctl.acquire(0, &item(0), None),
            Acquired::Constructed { fallback: true }
        );
        assert!(ctl.slot(0).unwrap().is_fallback());

        let failures = ctl.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, ConstructionError::Failed("no template".into()));
    }

    #[test]
    fn factory_panic_yields_fallback() {
        let factory = |_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            panic!("renderer exploded")
        };
        let mut ctl = SlotLifecycleController::new(factory);
        ctl.acquire(0, &item(0), None);
        assert!(ctl.slot(0).unwrap().is_fallback());
        assert!(matches!(
            &ctl.take_failures()[0].1,
            ConstructionError::Panicked(msg) if msg.contains("renderer exploded")
        ));
    }

    #[test]
    fn empty_handle_yields_fallback() {
        let factory = |_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            let (handle, probe) = TestHandle::visible_sized();
            probe.borrow_mut().empty = true;
            Ok(Box::new(handle))
        };
        let mut ctl = SlotLifecycleController::new(factory);
        ctl.acquire(0, &item(0), None);
        assert!(ctl.slot(0).unwrap().is_fallback());
        assert_eq!(ctl.take_failures()[0].1, ConstructionError::EmptyContent);
    }

    #[test]
    fn fallback_listener_reaches_channel() {
        let factory = |_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            Err(ConstructionError::Failed("x".into()))
        };
        let mut ctl = SlotLifecycleController::new(factory);
        ctl.acquire(0, &item(0), None);
        let slot = ctl.slot_mut(0).unwrap();
        assert!(slot.handle_mut().input(AnswerValue::Single(Choice::new("A"))));

        match ctl.poll_signal() {
            Some(SlotSignal::Answer { item_id, .. }) => assert_eq!(item_id.as_str(), "q1"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ctl.poll_signal().is_none());
    }

    #[test]
    fn show_only_hides_others() {
        let mut ctl = SlotLifecycleController::new(ok_factory());
        for i in 0..3 {
            ctl.acquire(i, &item(i), None);
        }
        ctl.show_only(1);
        assert_eq!(ctl.slot(0).unwrap().state(), SlotState::Hidden);
        assert_eq!(ctl.slot(1).unwrap().state(), SlotState::Verifying);
        assert_eq!(ctl.slot(2).unwrap().state(), SlotState::Hidden);
        assert!(ctl.is_perceptible(1));
        assert!(!ctl.is_perceptible(0));
    }

    #[test]
    fn restore_is_applied_on_acquire() {
        let restored = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = restored.clone();
        let factory = move |_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            let (handle, probe) = TestHandle::visible_sized();
            sink.borrow_mut().push(probe);
            Ok(Box::new(handle))
        };
        let mut ctl = SlotLifecycleController::new(factory);
        let mut record = AnswerRecord::new(ItemId::new("q1"), 0);
        record.apply(AnswerValue::Single(Choice::new("B")));

        ctl.acquire(0, &item(0), Some(&record));
        assert_eq!(ctl.stats().restores, 1);
        assert_eq!(restored.borrow()[0].borrow().restored.len(), 1);
    }

    #[test]
    fn probe_replaces_contentless_handle() {
        let probes = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = probes.clone();
        let factory = move |_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            let (handle, probe) = TestHandle::visible_sized();
            sink.borrow_mut().push(probe);
            Ok(Box::new(handle))
        };
        let mut ctl = SlotLifecycleController::new(factory);
        ctl.acquire(0, &item(0), None);
        ctl.show_only(0);
        assert!(!ctl.probe_content(0, &item(0)));

        probes.borrow()[0].borrow_mut().empty = true;
        assert!(ctl.probe_content(0, &item(0)));
        let slot = ctl.slot(0).unwrap();
        assert!(slot.is_fallback());
        assert!(slot.is_perceptible());
        assert!(!ctl.probe_content(0, &item(0)));
    }

    #[test]
    fn visible_count_includes_pool() {
        let mut ctl = SlotLifecycleController::new(ok_factory());
        ctl.acquire(0, &item(0), None);
        ctl.acquire(1, &item(1), None);
        ctl.force_visible(0);
        assert_eq!(ctl.visible_count(), 1);
        ctl.release(0);
        assert_eq!(ctl.visible_count(), 0);
    }
}
