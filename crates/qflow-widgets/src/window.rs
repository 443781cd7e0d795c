#![forbid(unsafe_code)]

//! Viewport window around the current item.
//!
//! Only items within `buffer` positions of the current index are
//! materialized. Moving the current index recycles slots that leave the
//! window before acquiring slots that enter it, so at most
//! `2 * buffer + 1` slots are ever materialized at once.

use std::ops::RangeInclusive;

use qflow_core::{AnswerLookup, Item};

use crate::lifecycle::{ItemRendererFactory, SlotLifecycleController};

/// Inclusive index range `[start, end]` of materialized items.
///
/// `start = clamp(current - buffer, 0, n - 1)` and
/// `end = clamp(current + buffer, 0, n - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportWindow {
    /// First materialized index.
    pub start: usize,
    /// Last materialized index.
    pub end: usize,
}

impl ViewportWindow {
    /// Window around `current`, clamped to `[0, len - 1]`. `None` when `len` is 0.
    #[must_use]
    pub fn around(current: usize, buffer: usize, len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let current = current.min(len - 1);
        let start = current.saturating_sub(buffer);
        let end = current.saturating_add(buffer).min(len - 1);
        Some(Self { start, end })
    }

    /// Whether `index` is inside the window.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }

    /// Number of indices in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false: a window holds at least the current index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The window as a range.
    #[must_use]
    pub fn range(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Result of moving the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowChange {
    /// The window after the move.
    pub window: Option<ViewportWindow>,
    /// Indices that were materialized by this move.
    pub acquired: Vec<usize>,
    /// Indices that were recycled by this move.
    pub released: Vec<usize>,
}

/// Keeps the window around the current index materialized.
#[derive(Debug, Clone)]
pub struct ViewportWindowManager {
    buffer: usize,
    window: Option<ViewportWindow>,
}

impl ViewportWindowManager {
    /// Create a manager with `buffer` items on either side of the current one.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            window: None,
        }
    }

    /// Items kept on either side of the current one.
    #[must_use]
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Current window.
    #[must_use]
    pub fn window(&self) -> Option<ViewportWindow> {
        self.window
    }

    /// Upper bound on simultaneously materialized slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.saturating_mul(2).saturating_add(1)
    }

    /// Move the window to `current` (clamped into range).
    ///
    /// Slots outside the new window go back to the pool first; then every
    /// index inside it is materialized, with stored answers restored.
    pub fn set_current<F: ItemRendererFactory>(
        &mut self,
        current: usize,
        items: &[Item],
        slots: &mut SlotLifecycleController<F>,
        answers: &dyn AnswerLookup,
    ) -> WindowChange {
        let next = ViewportWindow::around(current, self.buffer, items.len());

        let released: Vec<usize> = slots
            .active_indices()
            .into_iter()
            .filter(|&i| !next.is_some_and(|w| w.contains(i)))
            .collect();
        for &index in &released {
            slots.release(index);
        }

        let mut acquired = Vec::new();
        if let Some(window) = next {
            for index in window.range() {
                if slots.slot(index).is_some() {
                    continue;
                }
                let item = &items[index];
                slots.acquire(index, item, answers.find_answer(item.id.as_str()));
                acquired.push(index);
            }
        }

        if self.window != next {
            tracing::debug!(
                window = ?next.map(|w| w.range()),
                acquired = acquired.len(),
                released = released.len(),
                "viewport window moved"
            );
        }
        self.window = next;
        WindowChange {
            window: next,
            acquired,
            released,
        }
    }

    /// Forget the current window and recycle every materialized slot.
    pub fn reset<F: ItemRendererFactory>(&mut self, slots: &mut SlotLifecycleController<F>) {
        slots.release_all();
        self.window = None;
    }
}

impl Default for ViewportWindowManager {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ConstructionError;
    use crate::slot::test_handle::TestHandle;
    use crate::slot::{AnswerListener, SlotHandle};
    use qflow_core::{AnswerRecord, ItemKind};

    fn items(n: usize) -> Vec<Item> {
        (0..n)
            .map(|i| Item::new(format!("q{}", i + 1), i, ItemKind::SingleChoice))
            .collect()
    }

    fn controller() -> SlotLifecycleController<
        impl FnMut(&Item, AnswerListener) -> Result<Box<dyn SlotHandle>, ConstructionError>,
    > {
        SlotLifecycleController::new(|_: &Item, _: AnswerListener| -> Result<Box<dyn SlotHandle>, ConstructionError> {
            Ok(Box::new(TestHandle::visible_sized().0) as Box<dyn SlotHandle>)
        })
    }

    #[test]
    fn around_clamps_edges() {
        assert_eq!(
            ViewportWindow::around(0, 1, 30),
            Some(ViewportWindow { start: 0, end: 1 })
        );
        assert_eq!(
            ViewportWindow::around(5, 1, 30),
            Some(ViewportWindow { start: 4, end: 6 })
        );
        assert_eq!(
            ViewportWindow::around(29, 1, 30),
            Some(ViewportWindow { start: 28, end: 29 })
        );
        assert_eq!(
            ViewportWindow::around(99, 1, 30),
            Some(ViewportWindow { start: 28, end: 29 })
        );
        assert_eq!(ViewportWindow::around(0, 1, 0), None);

        let single = ViewportWindow::around(0, 1, 1).unwrap();
        assert_eq!(single, ViewportWindow { start: 0, end: 0 });
        assert_eq!(single.len(), 1);
        assert!(single.contains(0));
        assert!(!single.contains(1));
        assert_eq!(ViewportWindow::around(5, 1, 30).unwrap().len(), 3);
    }

    #[test]
    fn moving_recycles_then_acquires() {
        let items = items(10);
        let mut slots = controller();
        let mut mgr = ViewportWindowManager::new(1);

        let change = mgr.set_current(0, &items, &mut slots, &Vec::<AnswerRecord>::new());
        assert_eq!(change.acquired, vec![0, 1]);
        assert!(change.released.is_empty());

        let change = mgr.set_current(5, &items, &mut slots, &Vec::<AnswerRecord>::new());
        assert_eq!(change.released, vec![0, 1]);
        assert_eq!(change.acquired, vec![4, 5, 6]);
        assert_eq!(slots.active_indices(), vec![4, 5, 6]);
        assert_eq!(slots.pool().len(), 2);
    }

    #[test]
    fn returning_reuses_pooled_slots() {
        let items = items(10);
        let mut slots = controller();
        let mut mgr = ViewportWindowManager::new(1);

        mgr.set_current(0, &items, &mut slots, &Vec::<AnswerRecord>::new());
        mgr.set_current(5, &items, &mut slots, &Vec::<AnswerRecord>::new());
        mgr.set_current(0, &items, &mut slots, &Vec::<AnswerRecord>::new());
        assert_eq!(slots.stats().pool_hits, 2);
        assert_eq!(slots.stats().pool_misses, 5);
    }

    #[test]
    fn empty_items_materialize_nothing() {
        let mut slots = controller();
        let mut mgr = ViewportWindowManager::new(1);
        let change = mgr.set_current(0, &[], &mut slots, &Vec::<AnswerRecord>::new());
        assert_eq!(change.window, None);
        assert_eq!(slots.active_len(), 0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_exceeds_capacity(
                len in 1usize..60,
                buffer in 0usize..4,
                moves in proptest::collection::vec(0usize..80, 1..40),
            ) {
                let items = items(len);
                let mut slots = controller();
                let mut mgr = ViewportWindowManager::new(buffer);
                for target in moves {
                    mgr.set_current(target, &items, &mut slots, &Vec::<AnswerRecord>::new());
                    prop_assert!(slots.active_len() <= mgr.capacity());
                    let window = mgr.window().unwrap();
                    prop_assert_eq!(slots.active_indices(), window.range().collect::<Vec<_>>());
                    for (i, slot) in slots.active() {
                        prop_assert_eq!(slot.item_id(), &items[i].id);
                    }
                }
            }
        }
    }
}
