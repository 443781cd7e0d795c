#![forbid(unsafe_code)]

//! Soft-failure diagnostics.
//!
//! No failure inside the flow reaches the caller as an error. Each one is
//! logged and appended here instead. The log is bounded; when full, the
//! oldest entry is dropped.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use qflow_core::ItemId;
use qflow_widgets::ConstructionError;

/// A recovered failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowDiagnostic {
    /// The renderer factory failed; a fallback slot is in use.
    Construction {
        /// Item whose slot failed.
        item_id: ItemId,
        /// What went wrong.
        error: ConstructionError,
    },
    /// A slot lost its content after construction and was replaced.
    ContentMissing {
        /// Item whose slot was replaced.
        item_id: ItemId,
    },
    /// Visibility was never confirmed; the slot was forced visible.
    VisibilityTimeout {
        /// Item that was forced.
        item_id: ItemId,
        /// Time from activation to the override.
        waited: Duration,
    },
    /// Stored answers could not be read.
    StorageRead(String),
    /// Answers could not be written.
    StorageWrite(String),
    /// Data violated a model invariant and was repaired or rejected.
    InvariantViolation(String),
    /// The Question Source failed; the flow has no items.
    SourceUnavailable(String),
}

impl FlowDiagnostic {
    /// Short stable name of the variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FlowDiagnostic::Construction { .. } => "construction",
            FlowDiagnostic::ContentMissing { .. } => "content_missing",
            FlowDiagnostic::VisibilityTimeout { .. } => "visibility_timeout",
            FlowDiagnostic::StorageRead(_) => "storage_read",
            FlowDiagnostic::StorageWrite(_) => "storage_write",
            FlowDiagnostic::InvariantViolation(_) => "invariant_violation",
            FlowDiagnostic::SourceUnavailable(_) => "source_unavailable",
        }
    }
}

impl fmt::Display for FlowDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowDiagnostic::Construction { item_id, error } => {
                write!(f, "slot for {item_id} replaced by fallback: {error}")
            }
            FlowDiagnostic::ContentMissing { item_id } => {
                write!(f, "slot for {item_id} lost its content")
            }
            FlowDiagnostic::VisibilityTimeout { item_id, waited } => {
                write!(f, "slot for {item_id} forced visible after {}ms", waited.as_millis())
            }
            FlowDiagnostic::StorageRead(msg) => write!(f, "storage read failed: {msg}"),
            FlowDiagnostic::StorageWrite(msg) => write!(f, "storage write failed: {msg}"),
            FlowDiagnostic::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            FlowDiagnostic::SourceUnavailable(msg) => write!(f, "question source unavailable: {msg}"),
        }
    }
}

/// A diagnostic with the flow time it was recorded at.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEntry {
    /// Flow clock time.
    pub at: Duration,
    /// What happened.
    pub diagnostic: FlowDiagnostic,
}

/// Bounded diagnostics log.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<DiagnosticEntry>,
    capacity: usize,
    dropped: u64,
}

impl DiagnosticLog {
    /// Create a log holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    /// Append a diagnostic.
    pub fn record(&mut self, at: Duration, diagnostic: FlowDiagnostic) {
        tracing::debug!(kind = diagnostic.kind(), %diagnostic, "diagnostic recorded");
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(DiagnosticEntry { at, diagnostic });
    }

    /// Entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.entries.iter()
    }

    /// Entries of one kind (see [`FlowDiagnostic::kind`]).
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a DiagnosticEntry> + 'a {
        self.entries.iter().filter(move |e| e.diagnostic.kind() == kind)
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped to stay within capacity.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_drops_oldest() {
        let mut log = DiagnosticLog::new(2);
        for i in 0..3 {
            log.record(Duration::from_millis(i), FlowDiagnostic::StorageWrite(format!("w{i}")));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.dropped(), 1);
        assert_eq!(
            log.iter().next().unwrap().diagnostic,
            FlowDiagnostic::StorageWrite("w1".into())
        );
    }

    #[test]
    fn of_kind_filters() {
        let mut log = DiagnosticLog::new(8);
        log.record(Duration::ZERO, FlowDiagnostic::StorageRead("r".into()));
        log.record(Duration::ZERO, FlowDiagnostic::InvariantViolation("i".into()));
        assert_eq!(log.of_kind("storage_read").count(), 1);
        assert_eq!(log.of_kind("visibility_timeout").count(), 0);
    }

    #[test]
    fn display_mentions_item() {
        let d = FlowDiagnostic::VisibilityTimeout {
            item_id: ItemId::new("q30"),
            waited: Duration::from_millis(2000),
        };
        assert_eq!(d.to_string(), "slot for q30 forced visible after 2000ms");
    }
}
