#![forbid(unsafe_code)]

//! Test collaborators for the question flow.
//!
//! - [`ScriptedFactory`] - Renderer factory whose handles fail, panic, lag,
//!   or lose content on request, with a [`FactoryRegistry`] to reach them
//! - [`RecordingProgress`] / [`RecordingCompletion`] - Sinks that remember calls
//! - [`FailingStore`] - Persistence Store that fails on demand
//! - [`LogCapture`] - `tracing` layer that keeps emitted events
//!
//! # Quick Start
//!
//! ```ignore
//! use qflow_harness::{ScriptedFactory, Behavior, survey_source};
//! use qflow_runtime::FlowBuilder;
//!
//! let factory = ScriptedFactory::new().with("q30", Behavior::Lagging);
//! let registry = factory.registry();
//! let mut flow = FlowBuilder::new(survey_source(), factory).build();
//! flow.start();
//! ```

pub mod capture;
pub mod scripted;
pub mod sinks;
pub mod store;

pub use capture::{CapturedEvent, LogCapture, LogHandle};
pub use scripted::{Behavior, FactoryRegistry, HandleControl, ScriptedFactory, ScriptedHandle};
pub use sinks::{RecordingCompletion, RecordingProgress};
pub use store::FailingStore;

use qflow_core::{AnswerValue, Choice, ItemKind, StaticSource};
use qflow_runtime::QuestionFlow;
use qflow_widgets::ItemRendererFactory;

/// Number of single-choice items in [`survey_source`].
pub const SURVEY_SINGLES: usize = 24;
/// Number of dual-choice items in [`survey_source`].
pub const SURVEY_DUALS: usize = 6;

/// The 30-item survey: `q1`..`q24` single-choice, `q25`..`q30` dual-choice.
#[must_use]
pub fn survey_source() -> StaticSource {
    StaticSource::numbered(SURVEY_SINGLES, SURVEY_DUALS)
}

/// Values that fully answer an item of `kind`.
#[must_use]
pub fn full_answer(kind: ItemKind) -> Vec<AnswerValue> {
    match kind {
        ItemKind::SingleChoice => vec![AnswerValue::Single(Choice::new("A"))],
        ItemKind::DualChoice => vec![
            AnswerValue::Inner(Choice::new("A")),
            AnswerValue::Outer(Choice::new("B")),
        ],
    }
}

/// Fully answer the item at `index` through the flow.
pub fn answer_fully<F: ItemRendererFactory>(flow: &mut QuestionFlow<F>, index: usize) {
    let Some(item) = flow.items().get(index).cloned() else {
        return;
    };
    for value in full_answer(item.kind) {
        flow.submit_answer(item.id.as_str(), value);
    }
}
