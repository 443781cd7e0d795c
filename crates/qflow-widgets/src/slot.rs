#![forbid(unsafe_code)]

//! Render slots and the handle contract.
//!
//! A [`RenderSlot`] binds one item to one [`SlotHandle`]. The handle is the
//! opaque visual object produced by a renderer factory; the slot adds the
//! lifecycle state the flow needs to enforce "exactly one visible slot".
//!
//! # State machine
//!
//! ```text
//!   Unbound ──attach──▶ Hidden ──request_visible──▶ Verifying
//!                         ▲                           │    ▲
//!                         │                     check │    │ next stage
//!                         │                     fails ▼    │
//!                         │                          Failed
//!                         │                           │
//!                         └────────reset────── Visible ◀── confirmed / forced
//! ```
//!
//! Handles report answer changes and render-tree changes through the
//! [`AnswerListener`] they receive at construction.

use std::fmt;
use std::sync::mpsc;

use qflow_core::{AnswerRecord, AnswerValue, Item, ItemId, ItemKind};

/// Rendered size of a handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    /// Width in cells.
    pub width: u16,
    /// Height in cells.
    pub height: u16,
}

impl Extent {
    /// Zero-sized extent.
    pub const ZERO: Self = Self {
        width: 0,
        height: 0,
    };

    /// Create an extent.
    #[must_use]
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Styling applied to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityStyle {
    /// Not displayed.
    Hidden,
    /// Canonical visible styling.
    Visible,
    /// Maximum-priority visible styling, used when verification times out.
    Forced,
}

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Constructed, not yet attached to the viewport.
    Unbound,
    /// Attached and hidden.
    Hidden,
    /// Visible requested; a verification check is pending.
    Verifying,
    /// The last verification check failed; a later stage is pending.
    Failed,
    /// Confirmed (or forced) visible.
    Visible,
}

/// Message emitted by a slot through its listener.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotSignal {
    /// The user changed the answer shown in the slot.
    Answer {
        /// Item the slot is bound to.
        item_id: ItemId,
        /// Kind of that item.
        kind: ItemKind,
        /// The new value.
        value: AnswerValue,
    },
    /// The slot's render tree changed (style, class, or children).
    StructureChanged {
        /// Item the slot is bound to.
        item_id: ItemId,
    },
}

/// The single listener wired into every constructed slot.
///
/// Cloning is allowed so a handle can hand it to its own children, but the
/// lifecycle controller creates exactly one per slot.
#[derive(Debug, Clone)]
pub struct AnswerListener {
    item_id: ItemId,
    kind: ItemKind,
    tx: mpsc::Sender<SlotSignal>,
}

impl AnswerListener {
    /// Create a listener for `item` sending into `tx`.
    #[must_use]
    pub fn new(item: &Item, tx: mpsc::Sender<SlotSignal>) -> Self {
        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            tx,
        }
    }

    /// Item this listener reports for.
    #[must_use]
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Kind of that item.
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Report an answer change. Returns false if the flow is gone.
    pub fn answer_changed(&self, value: AnswerValue) -> bool {
        self.tx
            .send(SlotSignal::Answer {
                item_id: self.item_id.clone(),
                kind: self.kind,
                value,
            })
            .is_ok()
    }

    /// Report a render-tree change. Returns false if the flow is gone.
    pub fn structure_changed(&self) -> bool {
        self.tx
            .send(SlotSignal::StructureChanged {
                item_id: self.item_id.clone(),
            })
            .is_ok()
    }
}

/// The visual object behind a slot.
///
/// Implementations come from an [`ItemRendererFactory`](crate::ItemRendererFactory).
/// Only the first four methods are required.
pub trait SlotHandle {
    /// Whether the handle produced any discoverable content.
    fn has_content(&self) -> bool;

    /// Current rendered size.
    fn extent(&self) -> Extent;

    /// Whether the handle is flagged hidden.
    fn is_hidden(&self) -> bool;

    /// Apply visibility styling.
    fn apply_style(&mut self, style: VisibilityStyle);

    /// Show a previously stored answer. Returns false if unsupported.
    fn restore(&mut self, _record: &AnswerRecord) -> bool {
        false
    }

    /// Deliver user input. A handle that accepts it must report the change
    /// through its listener. Returns false if unsupported.
    fn input(&mut self, _value: AnswerValue) -> bool {
        false
    }

    /// Called when the slot enters the viewport.
    fn on_attach(&mut self) {}

    /// Called when the slot leaves the viewport.
    fn on_detach(&mut self) {}

    /// Text lines for terminal rendering.
    fn lines(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A handle bound to one item.
pub struct RenderSlot {
    item_id: ItemId,
    kind: ItemKind,
    state: SlotState,
    handle: Box<dyn SlotHandle>,
    fallback: bool,
    attached: bool,
}

impl RenderSlot {
    /// Bind `handle` to `item`. The slot starts [`SlotState::Unbound`].
    #[must_use]
    pub fn new(item: &Item, handle: Box<dyn SlotHandle>, fallback: bool) -> Self {
        Self {
            item_id: item.id.clone(),
            kind: item.kind,
            state: SlotState::Unbound,
            handle,
            fallback,
            attached: false,
        }
    }

    /// Bound item id.
    #[must_use]
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Bound item kind.
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Overwrite the state.
    pub fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }

    /// Whether this slot is a fallback stand-in.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Whether the slot is attached to the viewport.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The handle.
    #[must_use]
    pub fn handle(&self) -> &dyn SlotHandle {
        self.handle.as_ref()
    }

    /// The handle, mutably.
    pub fn handle_mut(&mut self) -> &mut dyn SlotHandle {
        self.handle.as_mut()
    }

    /// Attach to the viewport, hidden.
    pub fn attach(&mut self) {
        if !self.attached {
            self.attached = true;
            self.handle.on_attach();
        }
        self.hide();
    }

    /// Detach from the viewport.
    pub fn detach(&mut self) {
        if self.attached {
            self.attached = false;
            self.handle.on_detach();
        }
    }

    /// Hide the slot.
    pub fn hide(&mut self) {
        self.state = SlotState::Hidden;
        self.handle.apply_style(VisibilityStyle::Hidden);
    }

    /// Detach and hide; the state a pooled slot rests in.
    pub fn reset(&mut self) {
        self.detach();
        self.hide();
    }

    /// Request the canonical visible style and await verification.
    pub fn request_visible(&mut self) {
        self.state = SlotState::Verifying;
        self.handle.apply_style(VisibilityStyle::Visible);
    }

    /// Re-apply the canonical visible style without changing state.
    pub fn reapply_visible(&mut self) {
        self.handle.apply_style(VisibilityStyle::Visible);
    }

    /// Apply maximum-priority visible styling and mark the slot visible.
    pub fn force_visible(&mut self) {
        self.handle.apply_style(VisibilityStyle::Forced);
        self.state = SlotState::Visible;
    }

    /// The visibility predicate: not flagged hidden and a non-zero extent.
    #[must_use]
    pub fn is_perceptible(&self) -> bool {
        !self.handle.is_hidden() && !self.handle.extent().is_empty()
    }

    /// Swap the handle, returning the old one.
    pub fn replace_handle(
        &mut self,
        handle: Box<dyn SlotHandle>,
        fallback: bool,
    ) -> Box<dyn SlotHandle> {
        self.fallback = fallback;
        std::mem::replace(&mut self.handle, handle)
    }
}

impl fmt::Debug for RenderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSlot")
            .field("item_id", &self.item_id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("fallback", &self.fallback)
            .field("attached", &self.attached)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_handle::TestHandle;
    use super::*;
    use qflow_core::Choice;

    fn item() -> Item {
        Item::new("q1", 0, ItemKind::SingleChoice)
    }

    #[test]
    fn new_slot_is_unbound_and_attach_hides() {
        let (handle, probe) = TestHandle::visible_sized();
        let mut slot = RenderSlot::new(&item(), Box::new(handle), false);
        assert_eq!(slot.state(), SlotState::Unbound);

        slot.attach();
        assert_eq!(slot.state(), SlotState::Hidden);
        assert!(slot.is_attached());
        assert!(probe.borrow().attached);
        assert_eq!(probe.borrow().style, Some(VisibilityStyle::Hidden));
    }

    #[test]
    fn perceptible_needs_style_and_extent() {
        let (handle, probe) = TestHandle::visible_sized();
        let mut slot = RenderSlot::new(&item(), Box::new(handle), false);
        slot.attach();
        assert!(!slot.is_perceptible());

        slot.request_visible();
        assert_eq!(slot.state(), SlotState::Verifying);
        assert!(slot.is_perceptible());

        probe.borrow_mut().extent = Extent::new(40, 0);
        assert!(!slot.is_perceptible());
    }

    #[test]
    fn force_visible_marks_visible() {
        let (handle, probe) = TestHandle::visible_sized();
        let mut slot = RenderSlot::new(&item(), Box::new(handle), false);
        slot.force_visible();
        assert_eq!(slot.state(), SlotState::Visible);
        assert_eq!(probe.borrow().style, Some(VisibilityStyle::Forced));
    }

    #[test]
    fn reset_detaches_and_hides() {
        let (handle, probe) = TestHandle::visible_sized();
        let mut slot = RenderSlot::new(&item(), Box::new(handle), false);
        slot.attach();
        slot.force_visible();
        slot.reset();
        assert_eq!(slot.state(), SlotState::Hidden);
        assert!(!slot.is_attached());
        assert!(!probe.borrow().attached);
    }

    #[test]
    fn listener_tags_signals_with_item() {
        let (tx, rx) = mpsc::channel();
        let listener = AnswerListener::new(&item(), tx);
        assert!(listener.answer_changed(AnswerValue::Single(Choice::new("A"))));
        assert!(listener.structure_changed());

        match rx.try_recv().unwrap() {
            SlotSignal::Answer { item_id, kind, .. } => {
                assert_eq!(item_id.as_str(), "q1");
                assert_eq!(kind, ItemKind::SingleChoice);
            }
            other => panic!("unexpected signal {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            SlotSignal::StructureChanged { .. }
        ));

        drop(rx);
        assert!(!listener.structure_changed());
    }

    #[test]
    fn extent_emptiness() {
        assert!(Extent::ZERO.is_empty());
        assert!(Extent::new(0, 3).is_empty());
        assert!(!Extent::new(1, 1).is_empty());
    }
}
