#![forbid(unsafe_code)]

//! The per-kind completeness predicate.
//!
//! A single-choice item is answered once it has a non-empty `single_value`.
//! A dual-choice item needs both halves. The predicate is pure: the completed
//! count is always recomputed from the records, never stored.

use crate::answer::{AnswerLookup, AnswerRecord};
use crate::item::{Item, ItemKind};

/// Whether `record` satisfies the completeness rule of `item`.
#[must_use]
pub fn is_answered(item: &Item, record: Option<&AnswerRecord>) -> bool {
    let Some(record) = record else {
        return false;
    };
    match item.kind {
        ItemKind::SingleChoice => record.single_value.as_deref().is_some_and(|v| !v.is_empty()),
        ItemKind::DualChoice => record.inner_value.is_some() && record.outer_value.is_some(),
    }
}

/// Number of items whose record satisfies [`is_answered`].
#[must_use]
pub fn completed_count<L: AnswerLookup + ?Sized>(items: &[Item], answers: &L) -> usize {
    items
        .iter()
        .filter(|item| is_answered(item, answers.find_answer(item.id.as_str())))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{AnswerValue, Choice};
    use crate::item::ItemId;

    fn record(id: &str, values: &[AnswerValue]) -> AnswerRecord {
        let mut r = AnswerRecord::new(ItemId::new(id), 0);
        for v in values {
            r.apply(v.clone());
        }
        r
    }

    #[test]
    fn missing_record_is_unanswered() {
        let item = Item::new("q1", 0, ItemKind::SingleChoice);
        assert!(!is_answered(&item, None));
    }

    #[test]
    fn single_needs_non_empty_value() {
        let item = Item::new("q1", 0, ItemKind::SingleChoice);
        let empty = record("q1", &[AnswerValue::Single(Choice::new(""))]);
        let set = record("q1", &[AnswerValue::Single(Choice::new("A"))]);
        assert!(!is_answered(&item, Some(&empty)));
        assert!(is_answered(&item, Some(&set)));
    }

    #[test]
    fn dual_needs_both_halves() {
        let item = Item::new("q25", 24, ItemKind::DualChoice);
        let inner_only = record("q25", &[AnswerValue::Inner(Choice::new("A"))]);
        let outer_only = record("q25", &[AnswerValue::Outer(Choice::new("B"))]);
        let both = record(
            "q25",
            &[
                AnswerValue::Inner(Choice::new("A")),
                AnswerValue::Outer(Choice::new("B")),
            ],
        );
        assert!(!is_answered(&item, Some(&inner_only)));
        assert!(!is_answered(&item, Some(&outer_only)));
        assert!(is_answered(&item, Some(&both)));
    }

    #[test]
    fn completed_count_ignores_stray_records() {
        let items = vec![
            Item::new("q1", 0, ItemKind::SingleChoice),
            Item::new("q2", 1, ItemKind::DualChoice),
        ];
        let records = vec![
            record("q1", &[AnswerValue::Single(Choice::new("A"))]),
            record("q2", &[AnswerValue::Inner(Choice::new("A"))]),
            record("zz", &[AnswerValue::Single(Choice::new("A"))]),
        ];
        assert_eq!(completed_count(&items, &records), 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn completed_count_never_exceeds_items(
                answered in proptest::collection::vec(0u8..4, 1..40)
            ) {
                // 0 = no record, 1 = single/inner only, 2 = outer only, 3 = full
                let items: Vec<Item> = answered
                    .iter()
                    .enumerate()
                    .map(|(i, _)| {
                        let kind = if i % 3 == 0 { ItemKind::DualChoice } else { ItemKind::SingleChoice };
                        Item::new(format!("q{i}"), i, kind)
                    })
                    .collect();
                let mut records = Vec::new();
                let mut expected = 0;
                for (item, state) in items.iter().zip(&answered) {
                    let values: Vec<AnswerValue> = match (item.kind, state) {
                        (_, 0) => continue,
                        (ItemKind::SingleChoice, _) => vec![AnswerValue::Single(Choice::new("A"))],
                        (ItemKind::DualChoice, 1) => vec![AnswerValue::Inner(Choice::new("A"))],
                        (ItemKind::DualChoice, 2) => vec![AnswerValue::Outer(Choice::new("B"))],
                        (ItemKind::DualChoice, _) => vec![
                            AnswerValue::Inner(Choice::new("A")),
                            AnswerValue::Outer(Choice::new("B")),
                        ],
                    };
                    if item.kind == ItemKind::SingleChoice || *state == 3 {
                        expected += 1;
                    }
                    records.push(record(item.id.as_str(), &values));
                }
                let count = completed_count(&items, &records);
                prop_assert_eq!(count, expected);
                prop_assert!(count <= items.len());
            }
        }
    }
}
