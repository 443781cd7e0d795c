#![forbid(unsafe_code)]

//! Scripted renderer factory.
//!
//! Each item can be given a [`Behavior`]. Every handle built is registered
//! with a [`HandleControl`] so a test can reveal it, strip its content, or
//! emit answers as if a user clicked.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use qflow_core::{AnswerRecord, AnswerValue, Item, ItemId, ItemKind};
use qflow_widgets::{
    AnswerListener, ConstructionError, Extent, ItemRendererFactory, SlotHandle, VisibilityStyle,
};

/// How the factory treats an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// A handle that is perceptible as soon as it is styled visible.
    #[default]
    Normal,
    /// A handle that stays imperceptible until [`HandleControl::reveal`].
    Lagging,
    /// A handle that is never perceptible.
    Stuck,
    /// The factory returns an error.
    Fail,
    /// The factory panics.
    Panic,
    /// The handle is built without content.
    Empty,
}

#[derive(Debug)]
struct HandleState {
    item_id: ItemId,
    kind: ItemKind,
    listener: AnswerListener,
    style: VisibilityStyle,
    revealed: bool,
    content: bool,
    attached: bool,
    restored: Vec<AnswerRecord>,
    styles: Vec<VisibilityStyle>,
}

/// Test-side control over one scripted handle.
#[derive(Debug, Clone)]
pub struct HandleControl(Rc<RefCell<HandleState>>);

impl HandleControl {
    /// Make the handle perceptible and signal a structural change.
    pub fn reveal(&self) {
        let mut state = self.0.borrow_mut();
        state.revealed = true;
        state.listener.structure_changed();
    }

    /// Signal a structural change without changing anything.
    pub fn touch(&self) {
        self.0.borrow().listener.structure_changed();
    }

    /// Remove the handle's content.
    pub fn strip_content(&self) {
        self.0.borrow_mut().content = false;
    }

    /// Emit an answer through the listener, as user input would.
    pub fn emit_answer(&self, value: AnswerValue) -> bool {
        self.0.borrow().listener.answer_changed(value)
    }

    /// Last applied style.
    #[must_use]
    pub fn style(&self) -> VisibilityStyle {
        self.0.borrow().style
    }

    /// Every style applied, in order.
    #[must_use]
    pub fn styles(&self) -> Vec<VisibilityStyle> {
        self.0.borrow().styles.clone()
    }

    /// Records restored into the handle.
    #[must_use]
    pub fn restored(&self) -> Vec<AnswerRecord> {
        self.0.borrow().restored.clone()
    }

    /// Whether the handle is attached to the viewport.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.borrow().attached
    }

    /// Item the handle renders.
    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.0.borrow().item_id.clone()
    }
}

/// A handle built by [`ScriptedFactory`].
#[derive(Debug)]
pub struct ScriptedHandle(Rc<RefCell<HandleState>>);

impl SlotHandle for ScriptedHandle {
    fn has_content(&self) -> bool {
        self.0.borrow().content
    }

    fn extent(&self) -> Extent {
        let state = self.0.borrow();
        if state.revealed && state.content && state.style != VisibilityStyle::Hidden {
            Extent::new(60, 6)
        } else {
            Extent::ZERO
        }
    }

    fn is_hidden(&self) -> bool {
        let state = self.0.borrow();
        state.style == VisibilityStyle::Hidden || !state.revealed
    }

    fn apply_style(&mut self, style: VisibilityStyle) {
        let mut state = self.0.borrow_mut();
        state.style = style;
        state.styles.push(style);
    }

    fn restore(&mut self, record: &AnswerRecord) -> bool {
        self.0.borrow_mut().restored.push(record.clone());
        true
    }

    fn input(&mut self, value: AnswerValue) -> bool {
        let state = self.0.borrow();
        value.fits(state.kind) && state.listener.answer_changed(value)
    }

    fn on_attach(&mut self) {
        self.0.borrow_mut().attached = true;
    }

    fn on_detach(&mut self) {
        self.0.borrow_mut().attached = false;
    }

    fn lines(&self) -> Vec<String> {
        let state = self.0.borrow();
        vec![format!("{} [{:?}]", state.item_id, state.kind)]
    }
}

/// Shared view of what a [`ScriptedFactory`] built.
#[derive(Debug, Clone, Default)]
pub struct FactoryRegistry {
    handles: Rc<RefCell<Vec<HandleControl>>>,
    calls: Rc<Cell<usize>>,
}

impl FactoryRegistry {
    /// Most recent handle built for `item_id`.
    #[must_use]
    pub fn latest(&self, item_id: &str) -> Option<HandleControl> {
        self.handles
            .borrow()
            .iter()
            .rev()
            .find(|h| h.item_id().as_str() == item_id)
            .cloned()
    }

    /// Handles built for `item_id`.
    #[must_use]
    pub fn built_for(&self, item_id: &str) -> usize {
        self.handles
            .borrow()
            .iter()
            .filter(|h| h.item_id().as_str() == item_id)
            .count()
    }

    /// Handles built in total.
    #[must_use]
    pub fn built(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Factory invocations, including failures.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

/// Renderer factory driven by per-item behaviors.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    behaviors: HashMap<String, Behavior>,
    default: Behavior,
    registry: FactoryRegistry,
}

impl ScriptedFactory {
    /// Factory building [`Behavior::Normal`] handles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the behavior for one item.
    #[must_use]
    pub fn with(mut self, item_id: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(item_id.to_string(), behavior);
        self
    }

    /// Behavior for items without an override.
    #[must_use]
    pub fn default_behavior(mut self, behavior: Behavior) -> Self {
        self.default = behavior;
        self
    }

    /// Handle to the registry of built handles.
    #[must_use]
    pub fn registry(&self) -> FactoryRegistry {
        self.registry.clone()
    }
}

impl ItemRendererFactory for ScriptedFactory {
    fn create(
        &mut self,
        item: &Item,
        listener: AnswerListener,
    ) -> Result<Box<dyn SlotHandle>, ConstructionError> {
        self.registry.calls.set(self.registry.calls.get() + 1);
        let behavior = self
            .behaviors
            .get(item.id.as_str())
            .copied()
            .unwrap_or(self.default);

        match behavior {
            Behavior::Fail => {
                return Err(ConstructionError::Failed(format!("no renderer for {}", item.id)));
            }
            Behavior::Panic => panic!("renderer for {} panicked", item.id),
            Behavior::Normal | Behavior::Lagging | Behavior::Stuck | Behavior::Empty => {}
        }

        let state = Rc::new(RefCell::new(HandleState {
            item_id: item.id.clone(),
            kind: item.kind,
            listener,
            style: VisibilityStyle::Hidden,
            revealed: behavior == Behavior::Normal || behavior == Behavior::Empty,
            content: behavior != Behavior::Empty,
            attached: false,
            restored: Vec::new(),
            styles: Vec::new(),
        }));
        self.registry
            .handles
            .borrow_mut()
            .push(HandleControl(state.clone()));
        Ok(Box::new(ScriptedHandle(state)))
    }
}
