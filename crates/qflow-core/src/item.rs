#![forbid(unsafe_code)]

//! Items: the immutable units of an ordered question flow.
//!
//! An [`Item`] is loaded once from a question source and never mutated for the
//! lifetime of the flow. Its `payload` is opaque to the flow; only renderer
//! factories look inside it.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable identifier of an item (for example `"q17"`).
///
/// Cheap to clone; the string is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Arc<str>);

impl ItemId {
    /// Create an id from any string-like value.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// How an item is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// One choice answers the item.
    SingleChoice,
    /// Two independent choices (inner and outer) are both required.
    DualChoice,
}

impl ItemKind {
    /// Infer the kind from a raw item payload.
    ///
    /// An item is dual-choice when it is flagged as a scenario, carries both
    /// `inner_q` and `outer_q` prompts, or groups its options in an object
    /// (`{"inner": [...], "outer": [...]}`) instead of a flat array.
    #[must_use]
    pub fn infer(payload: &Value) -> Self {
        let truthy = |key: &str| match payload.get(key) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        let grouped_options = matches!(payload.get("options"), Some(Value::Object(_)));

        if truthy("scenario") || (truthy("inner_q") && truthy("outer_q")) || grouped_options {
            Self::DualChoice
        } else {
            Self::SingleChoice
        }
    }

    /// Parse an explicit kind tag (`"single"` / `"dual"`, case-insensitive).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "single" | "single_choice" => Some(Self::SingleChoice),
            "dual" | "dual_choice" | "scenario" => Some(Self::DualChoice),
            _ => None,
        }
    }
}

/// One question in the flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Stable id.
    pub id: ItemId,
    /// Zero-based position in the flow.
    pub ordinal: usize,
    /// Answer shape.
    pub kind: ItemKind,
    /// Opaque content handed to the renderer factory.
    pub payload: Value,
}

impl Item {
    /// Create an item with an empty payload.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, ordinal: usize, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            ordinal,
            kind,
            payload: Value::Null,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Whether this is a single-choice item.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.kind == ItemKind::SingleChoice
    }
}
