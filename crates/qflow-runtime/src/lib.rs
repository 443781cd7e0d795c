#![forbid(unsafe_code)]

//! Runtime for the windowed question flow.
//!
//! # Key Components
//!
//! - [`QuestionFlow`] - Host-driven orchestrator, built with [`FlowBuilder`]
//! - [`Scheduler`] - Deadline-ordered timer queue on a deterministic clock
//! - [`VisibilityVerifier`] - Staged, cancellable visibility confirmation
//! - [`NavigationController`] - Current index with completeness gating
//! - [`AnswerStore`] - Answer records with debounced persistence
//! - [`CompletionCoordinator`] - Fires the completion callback once, after verification
//!
//! # Feature Gates
//!
//! - `state-persistence`: Enables [`FileStore`].

pub mod answer_store;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod flow;
pub mod navigation;
pub mod persistence;
pub mod scheduler;
pub mod verification;

pub use answer_store::{AnswerStore, LoadReport, decode_records, encode_records};
pub use completion::{
    CompletionAction, CompletionCoordinator, CompletionSink, NoopCompletion, NoopProgress,
    ProgressSink,
};
pub use config::{FlowConfig, VerificationTimings};
pub use diagnostics::{DiagnosticEntry, DiagnosticLog, FlowDiagnostic};
pub use flow::{FlowBuilder, FlowStats, ProgressSnapshot, QuestionFlow};
pub use navigation::{NavCommand, NavigationController, NavigationState};
#[cfg(feature = "state-persistence")]
pub use persistence::FileStore;
pub use persistence::{MemoryStore, NullStore, PersistenceStore, StorageError, StorageResult};
pub use scheduler::{FlowTimer, Scheduler, TimerId};
pub use verification::{
    CheckOutcome, VerificationPhase, VerificationStage, VerificationStats, VerificationStatus,
    VisibilityVerifier,
};
