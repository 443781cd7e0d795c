#![forbid(unsafe_code)]

//! Current-index ownership and completeness gating.
//!
//! Forward movement requires the current item to be answered; backward
//! movement is unconditional. Denied moves are silent no-ops; the
//! affordance queries let a UI disable its controls instead.

use qflow_core::{AnswerLookup, Item, completed_count, is_answered};

/// A navigation request from an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavCommand {
    /// Move forward.
    Next,
    /// Move back.
    Previous,
}

/// Snapshot of navigation state. `completed_count` is always recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationState {
    /// Current index.
    pub current_index: usize,
    /// Number of items.
    pub total_items: usize,
    /// Items currently answered.
    pub completed_count: usize,
}

/// Owns the current index.
#[derive(Debug, Clone, Default)]
pub struct NavigationController {
    current: usize,
    total: usize,
}

impl NavigationController {
    /// Start at index 0 of `total` items.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    /// Current index.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of items.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether the current index is the last item.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.total > 0 && self.current + 1 == self.total
    }

    /// Whether the current item satisfies its completeness rule.
    #[must_use]
    pub fn current_answered<L: AnswerLookup + ?Sized>(&self, items: &[Item], answers: &L) -> bool {
        items
            .get(self.current)
            .is_some_and(|item| is_answered(item, answers.find_answer(item.id.as_str())))
    }

    /// Whether `go_next` would move.
    #[must_use]
    pub fn can_go_next<L: AnswerLookup + ?Sized>(&self, items: &[Item], answers: &L) -> bool {
        self.current + 1 < self.total && self.current_answered(items, answers)
    }

    /// Whether `go_previous` would move.
    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        self.current > 0
    }

    /// Move forward if allowed. Returns the new index.
    pub fn go_next<L: AnswerLookup + ?Sized>(&mut self, items: &[Item], answers: &L) -> Option<usize> {
        if !self.can_go_next(items, answers) {
            tracing::trace!(current = self.current, "forward navigation denied");
            return None;
        }
        self.current += 1;
        Some(self.current)
    }

    /// Move back if not at the start. Returns the new index.
    pub fn go_previous(&mut self) -> Option<usize> {
        if !self.can_go_previous() {
            return None;
        }
        self.current -= 1;
        Some(self.current)
    }

    /// Jump to `index`, clamped into range.
    pub fn set_current(&mut self, index: usize) -> usize {
        self.current = index.min(self.total.saturating_sub(1));
        self.current
    }

    /// Snapshot of the state.
    #[must_use]
    pub fn state<L: AnswerLookup + ?Sized>(&self, items: &[Item], answers: &L) -> NavigationState {
        NavigationState {
            current_index: self.current,
            total_items: self.total,
            completed_count: completed_count(items, answers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qflow_core::{AnswerRecord, AnswerValue, Choice, ItemId, ItemKind};

    fn items() -> Vec<Item> {
        vec![
            Item::new("q1", 0, ItemKind::SingleChoice),
            Item::new("q2", 1, ItemKind::DualChoice),
            Item::new("q3", 2, ItemKind::SingleChoice),
        ]
    }

    fn answer(records: &mut Vec<AnswerRecord>, id: &str, value: AnswerValue) {
        match records.iter_mut().find(|r| r.item_id.as_str() == id) {
            Some(r) => {
                r.apply(value);
            }
            None => {
                let mut r = AnswerRecord::new(ItemId::new(id), 0);
                r.apply(value);
                records.push(r);
            }
        }
    }

    #[test]
    fn next_is_gated_on_completeness() {
        let items = items();
        let mut records = Vec::new();
        let mut nav = NavigationController::new(items.len());

        assert_eq!(nav.go_next(&items, &records), None);
        answer(&mut records, "q1", AnswerValue::Single(Choice::new("A")));
        assert_eq!(nav.go_next(&items, &records), Some(1));

        answer(&mut records, "q2", AnswerValue::Inner(Choice::new("A")));
        assert!(!nav.can_go_next(&items, &records));
        assert_eq!(nav.go_next(&items, &records), None);

        answer(&mut records, "q2", AnswerValue::Outer(Choice::new("B")));
        assert_eq!(nav.go_next(&items, &records), Some(2));
        assert!(nav.is_last());

        answer(&mut records, "q3", AnswerValue::Single(Choice::new("C")));
        assert_eq!(nav.go_next(&items, &records), None);
        assert_eq!(nav.state(&items, &records).completed_count, 3);
    }

    #[test]
    fn previous_is_unconditional_but_bounded() {
        let mut nav = NavigationController::new(3);
        assert!(!nav.can_go_previous());
        assert_eq!(nav.go_previous(), None);
        nav.set_current(2);
        assert_eq!(nav.go_previous(), Some(1));
    }

    #[test]
    fn set_current_clamps() {
        let mut nav = NavigationController::new(3);
        assert_eq!(nav.set_current(99), 2);
        let mut empty = NavigationController::new(0);
        assert_eq!(empty.set_current(5), 0);
        assert!(!empty.is_last());
    }
}
