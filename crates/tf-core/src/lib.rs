//! Shared building blocks for the taskforge execution engine.
//!
//! Holds the data model passed between the orchestrator and the repository
//! cache, the error taxonomy surfaced to callers, input validation rules,
//! configuration loading, and the subprocess seam used to drive `git`.

pub mod config;
pub mod error;
pub mod git;
pub mod types;
pub mod validation;
