#![forbid(unsafe_code)]

//! Answer records and the tagged "answer changed" payload.
//!
//! A record is created on the first mutation for an item and upserted in
//! place afterwards. Dual-choice answers set `inner_value` and `outer_value`
//! independently, in either order.

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, ItemKind};

/// A weighted tag attached to a choice, consumed by downstream scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTag {
    /// Dimension name.
    pub key: String,
    /// Signed weight.
    pub value: f64,
}

impl ScoringTag {
    /// Create a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A selected option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Option value (for example `"A"`).
    pub value: String,
    /// Tags carried by the option.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scoring_tags: Vec<ScoringTag>,
}

impl Choice {
    /// A choice without scoring tags.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            scoring_tags: Vec::new(),
        }
    }

    /// Attach scoring tags.
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<ScoringTag>) -> Self {
        self.scoring_tags = tags;
        self
    }
}

/// Payload of an "answer changed" event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// The only choice of a single-choice item.
    Single(Choice),
    /// The inner half of a dual-choice item.
    Inner(Choice),
    /// The outer half of a dual-choice item.
    Outer(Choice),
}

impl AnswerValue {
    /// Whether this value can be applied to an item of `kind`.
    #[must_use]
    pub fn fits(&self, kind: ItemKind) -> bool {
        matches!(
            (self, kind),
            (Self::Single(_), ItemKind::SingleChoice)
                | (Self::Inner(_) | Self::Outer(_), ItemKind::DualChoice)
        )
    }

    /// The carried choice.
    #[must_use]
    pub fn choice(&self) -> &Choice {
        match self {
            Self::Single(c) | Self::Inner(c) | Self::Outer(c) => c,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Inner(_) => "inner",
            Self::Outer(_) => "outer",
        }
    }
}

/// The stored answer for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    /// Item the record belongs to.
    pub item_id: ItemId,
    /// Creation time in milliseconds since the UNIX epoch.
    #[serde(default)]
    pub timestamp: u64,
    /// Selected value of a single-choice item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_value: Option<String>,
    /// Tags of the single-choice selection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scoring_tags: Vec<ScoringTag>,
    /// Inner half of a dual-choice item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_value: Option<Choice>,
    /// Outer half of a dual-choice item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_value: Option<Choice>,
}

impl AnswerRecord {
    /// An empty record for `item_id` created at `timestamp`.
    #[must_use]
    pub fn new(item_id: ItemId, timestamp: u64) -> Self {
        Self {
            item_id,
            timestamp,
            single_value: None,
            scoring_tags: Vec::new(),
            inner_value: None,
            outer_value: None,
        }
    }

    /// Merge a value into the record.
    ///
    /// Single values overwrite `single_value` and its tags; inner and outer
    /// values overwrite only their own half. Returns whether anything changed.
    pub fn apply(&mut self, value: AnswerValue) -> bool {
        match value {
            AnswerValue::Single(choice) => {
                let changed = self.single_value.as_deref() != Some(choice.value.as_str())
                    || self.scoring_tags != choice.scoring_tags;
                self.single_value = Some(choice.value);
                self.scoring_tags = choice.scoring_tags;
                changed
            }
            AnswerValue::Inner(choice) => {
                let changed = self.inner_value.as_ref() != Some(&choice);
                self.inner_value = Some(choice);
                changed
            }
            AnswerValue::Outer(choice) => {
                let changed = self.outer_value.as_ref() != Some(&choice);
                self.outer_value = Some(choice);
                changed
            }
        }
    }

    /// Whether no field has been set yet.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.single_value.is_none() && self.inner_value.is_none() && self.outer_value.is_none()
    }
}

/// Read access to answer records by item id.
pub trait AnswerLookup {
    /// Find the record for `item_id`.
    fn find_answer(&self, item_id: &str) -> Option<&AnswerRecord>;
}

impl AnswerLookup for [AnswerRecord] {
    fn find_answer(&self, item_id: &str) -> Option<&AnswerRecord> {
        self.iter().find(|r| r.item_id.as_str() == item_id)
    }
}

impl AnswerLookup for Vec<AnswerRecord> {
    fn find_answer(&self, item_id: &str) -> Option<&AnswerRecord> {
        self.as_slice().find_answer(item_id)
    }
}
