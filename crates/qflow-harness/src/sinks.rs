#![forbid(unsafe_code)]

//! Sinks that remember what they were given.

use std::cell::RefCell;
use std::rc::Rc;

use qflow_core::AnswerRecord;
use qflow_runtime::{CompletionSink, ProgressSink};

/// Keeps every reported percentage.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress(Rc<RefCell<Vec<f64>>>);

impl RecordingProgress {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reported percentages, in order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.0.borrow().clone()
    }

    /// Last reported percentage.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        self.0.borrow().last().copied()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&mut self, percent_answered: f64) {
        self.0.borrow_mut().push(percent_answered);
    }
}

/// Keeps every completion delivery.
#[derive(Debug, Clone, Default)]
pub struct RecordingCompletion(Rc<RefCell<Vec<Vec<AnswerRecord>>>>);

impl RecordingCompletion {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.0.borrow().len()
    }

    /// Records of the first delivery.
    #[must_use]
    pub fn first(&self) -> Option<Vec<AnswerRecord>> {
        self.0.borrow().first().cloned()
    }
}

impl CompletionSink for RecordingCompletion {
    fn on_complete(&mut self, records: &[AnswerRecord]) {
        self.0.borrow_mut().push(records.to_vec());
    }
}
