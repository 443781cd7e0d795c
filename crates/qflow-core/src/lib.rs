#![forbid(unsafe_code)]

//! Core: items, answer records, completeness rules, and question sources.

pub mod answer;
pub mod clock;
pub mod completeness;
pub mod item;
pub mod logging;
pub mod source;

pub use answer::{AnswerLookup, AnswerRecord, AnswerValue, Choice, ScoringTag};
pub use clock::{DeterministicClock, wall_clock_ms};
pub use completeness::{completed_count, is_answered};
pub use item::{Item, ItemId, ItemKind};
pub use source::{JsonSource, QuestionSource, SourceError, StaticSource};

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, error, info, trace, warn};
