#![forbid(unsafe_code)]

//! Keyed pool of recycled render slots.
//!
//! Holds at most one slot per item id. Releasing a second slot for an id that
//! is already pooled replaces the pooled entry; the displaced handle is
//! dropped.

use std::collections::HashMap;

use qflow_core::ItemId;

use crate::slot::RenderSlot;

/// Recycled slots keyed by item id.
#[derive(Debug, Default)]
pub struct SlotPool {
    slots: HashMap<ItemId, RenderSlot>,
}

impl SlotPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the pooled slot for `item_id`, if any.
    pub fn acquire(&mut self, item_id: &str) -> Option<RenderSlot> {
        self.slots.remove(item_id)
    }

    /// Reset `slot` (hidden, detached) and store it under `item_id`.
    pub fn release(&mut self, item_id: ItemId, mut slot: RenderSlot) {
        slot.reset();
        if let Some(displaced) = self.slots.insert(item_id, slot) {
            tracing::debug!(
                item = %displaced.item_id(),
                "pool already held a slot for this item; dropped the older handle"
            );
        }
    }

    /// Whether a slot for `item_id` is pooled.
    #[must_use]
    pub fn contains(&self, item_id: &str) -> bool {
        self.slots.contains_key(item_id)
    }

    /// Number of pooled slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pooled item ids.
    pub fn item_ids(&self) -> impl Iterator<Item = &ItemId> {
        self.slots.keys()
    }

    /// Pooled slots.
    pub fn slots(&self) -> impl Iterator<Item = &RenderSlot> {
        self.slots.values()
    }

    /// Drop every pooled slot.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotState;
    use crate::slot::test_handle::TestHandle;
    use qflow_core::{Item, ItemKind};

    fn slot(id: &str) -> RenderSlot {
        let (handle, _) = TestHandle::visible_sized();
        RenderSlot::new(&Item::new(id, 0, ItemKind::SingleChoice), Box::new(handle), false)
    }

    #[test]
    fn acquire_pops() {
        let mut pool = SlotPool::new();
        pool.release(ItemId::new("q1"), slot("q1"));
        assert!(pool.contains("q1"));

        let s = pool.acquire("q1").unwrap();
        assert_eq!(s.item_id().as_str(), "q1");
        assert!(pool.acquire("q1").is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn release_resets_slot() {
        let mut pool = SlotPool::new();
        let mut s = slot("q1");
        s.attach();
        s.force_visible();
        pool.release(ItemId::new("q1"), s);

        let s = pool.acquire("q1").unwrap();
        assert_eq!(s.state(), SlotState::Hidden);
        assert!(!s.is_attached());
    }

    #[test]
    fn second_release_replaces_entry() {
        let mut pool = SlotPool::new();
        let first = slot("q1");
        let mut second = slot("q1");
        second.replace_handle(Box::new(TestHandle::visible_sized().0), true);

        pool.release(ItemId::new("q1"), first);
        pool.release(ItemId::new("q1"), second);

        assert_eq!(pool.len(), 1);
        assert!(pool.acquire("q1").unwrap().is_fallback());
    }

    #[test]
    fn missing_id_is_none() {
        let mut pool = SlotPool::new();
        assert!(pool.acquire("nope").is_none());
    }
}
