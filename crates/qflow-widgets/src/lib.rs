#![forbid(unsafe_code)]

//! Render slots for the windowed question flow.
//!
//! # Key Components
//!
//! - [`SlotHandle`] - The opaque visual object a renderer factory builds
//! - [`RenderSlot`] - A handle bound to one item, with its [`SlotState`]
//! - [`SlotPool`] - Keyed cache of recycled slots, one per item id
//! - [`SlotLifecycleController`] - Builds, wires, recycles, and repairs slots
//! - [`ViewportWindowManager`] - Keeps only the window around the current item materialized
//!
//! Slot construction is expensive, so a slot is never dropped once built: it
//! moves between the active window and the pool.

pub mod fallback;
pub mod lifecycle;
pub mod pool;
pub mod slot;
pub mod window;

pub use fallback::FallbackSlot;
pub use lifecycle::{
    Acquired, ConstructionError, ItemRendererFactory, LifecycleStats, SlotLifecycleController,
};
pub use pool::SlotPool;
pub use slot::{AnswerListener, Extent, RenderSlot, SlotHandle, SlotSignal, SlotState, VisibilityStyle};
pub use window::{ViewportWindow, ViewportWindowManager, WindowChange};
