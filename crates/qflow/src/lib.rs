#![forbid(unsafe_code)]

//! qflow public facade crate.
//!
//! Re-exports the item model, slot machinery, and flow runtime from the
//! internal crates, plus a prelude for hosts that embed a question flow.
//!
//! # Example
//!
//! ```ignore
//! use qflow::prelude::*;
//!
//! let mut flow = FlowBuilder::new(StaticSource::numbered(24, 6), my_factory)
//!     .on_complete(|records: &[AnswerRecord]| println!("{} answers", records.len()))
//!     .build();
//! flow.start();
//! flow.advance_time(std::time::Duration::from_millis(16));
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use qflow_core::{
    AnswerLookup, AnswerRecord, AnswerValue, Choice, DeterministicClock, Item, ItemId, ItemKind,
    JsonSource, QuestionSource, ScoringTag, SourceError, StaticSource, completed_count,
    is_answered, wall_clock_ms,
};

// --- Widget re-exports -----------------------------------------------------

pub use qflow_widgets::{
    AnswerListener, ConstructionError, Extent, FallbackSlot, ItemRendererFactory, RenderSlot,
    SlotHandle, SlotSignal, SlotState, ViewportWindow, VisibilityStyle,
};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use qflow_runtime::{
    CompletionSink, DiagnosticEntry, FlowBuilder, FlowConfig, FlowDiagnostic, FlowStats,
    MemoryStore, NavCommand, NavigationState, NullStore, PersistenceStore, ProgressSink,
    ProgressSnapshot, QuestionFlow, StorageError, VerificationPhase, VerificationStatus,
    VerificationTimings,
};

#[cfg(feature = "state-persistence")]
pub use qflow_runtime::FileStore;

// --- Errors ---------------------------------------------------------------

/// Top-level error type for qflow hosts.
#[derive(Debug)]
pub enum Error {
    /// I/O failure in the host.
    Io(std::io::Error),
    /// The question source could not be loaded.
    Source(SourceError),
    /// A persistence backend failed.
    #[cfg(feature = "runtime")]
    Storage(StorageError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Source(err) => write!(f, "question source: {err}"),
            #[cfg(feature = "runtime")]
            Self::Storage(err) => write!(f, "storage: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Source(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SourceError> for Error {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}

#[cfg(feature = "runtime")]
impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Standard result type for qflow hosts.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        AnswerListener, AnswerRecord, AnswerValue, Choice, ConstructionError, Error, Extent, Item,
        ItemKind, ItemRendererFactory, JsonSource, QuestionSource, Result, SlotHandle,
        StaticSource, VisibilityStyle,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{
        FlowBuilder, FlowConfig, MemoryStore, NavCommand, PersistenceStore, QuestionFlow,
    };

    pub use crate::{core, widgets};

    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use qflow_core as core;
#[cfg(feature = "runtime")]
pub use qflow_runtime as runtime;
pub use qflow_widgets as widgets;
