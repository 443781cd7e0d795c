#![forbid(unsafe_code)]

//! Terminal demo for qflow.
//!
//! Runs a question flow in the terminal: one item is shown at a time, the
//! flow keeps a small window of slots materialized around it, and answers
//! are saved to a JSON file.

pub mod app;
pub mod cli;
pub mod render;
pub mod sample;
pub mod terminal;
