#![forbid(unsafe_code)]

//! Fallback slot used when a renderer factory fails.
//!
//! The stand-in keeps the same event contract as a real handle: it accepts
//! input, reports answers through its listener, restores stored answers, and
//! honors visibility styles. It always has content and a non-zero extent, so
//! a fallback can always pass visibility verification once shown.

use qflow_core::{AnswerRecord, AnswerValue, ItemId, ItemKind};

use crate::slot::{AnswerListener, Extent, SlotHandle, VisibilityStyle};

/// Width reported by a fallback slot, in cells.
const FALLBACK_WIDTH: u16 = 40;

/// Minimal stand-in handle.
#[derive(Debug)]
pub struct FallbackSlot {
    item_id: ItemId,
    kind: ItemKind,
    listener: AnswerListener,
    style: VisibilityStyle,
    single: Option<String>,
    inner: Option<String>,
    outer: Option<String>,
}

impl FallbackSlot {
    /// Create a hidden fallback reporting through `listener`.
    #[must_use]
    pub fn new(listener: AnswerListener) -> Self {
        Self {
            item_id: listener.item_id().clone(),
            kind: listener.kind(),
            listener,
            style: VisibilityStyle::Hidden,
            single: None,
            inner: None,
            outer: None,
        }
    }

    /// Currently applied style.
    #[must_use]
    pub fn style(&self) -> VisibilityStyle {
        self.style
    }

    fn record_value(&mut self, value: &AnswerValue) {
        let v = Some(value.choice().value.clone());
        match value {
            AnswerValue::Single(_) => self.single = v,
            AnswerValue::Inner(_) => self.inner = v,
            AnswerValue::Outer(_) => self.outer = v,
        }
    }
}

impl SlotHandle for FallbackSlot {
    fn has_content(&self) -> bool {
        true
    }

    fn extent(&self) -> Extent {
        match self.style {
            VisibilityStyle::Hidden => Extent::ZERO,
            VisibilityStyle::Visible | VisibilityStyle::Forced => {
                Extent::new(FALLBACK_WIDTH, self.lines().len() as u16)
            }
        }
    }

    fn is_hidden(&self) -> bool {
        self.style == VisibilityStyle::Hidden
    }

    fn apply_style(&mut self, style: VisibilityStyle) {
        self.style = style;
    }

    fn restore(&mut self, record: &AnswerRecord) -> bool {
        self.single = record.single_value.clone();
        self.inner = record.inner_value.as_ref().map(|c| c.value.clone());
        self.outer = record.outer_value.as_ref().map(|c| c.value.clone());
        true
    }

    fn input(&mut self, value: AnswerValue) -> bool {
        if !value.fits(self.kind) {
            return false;
        }
        self.record_value(&value);
        self.listener.answer_changed(value);
        true
    }

    fn lines(&self) -> Vec<String> {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
        match self.kind {
            ItemKind::SingleChoice => vec![
                format!("[fallback] {}", self.item_id),
                format!("answer: {}", show(&self.single)),
            ],
            ItemKind::DualChoice => vec![
                format!("[fallback] {}", self.item_id),
                format!("inner: {}", show(&self.inner)),
                format!("outer: {}", show(&self.outer)),
            ],
        }
    }
}
