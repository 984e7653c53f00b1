//! Runs project stages inside per-execution containers.
//!
//! [`TaskOrchestrator`] drives one stage per call (primary task, dependency
//! install, build, merge, push) against a [`container::ContainerManager`],
//! scrapes artifacts out of the command output and hands back an
//! [`tf_core::types::ExecutionResult`]. Install and build run under a
//! bounded [`retry::RetryPolicy`].

pub mod capture;
pub mod container;
pub mod docker;
pub mod git_ops;
pub mod npm;
pub mod orchestrator;
pub mod retry;
pub mod services;

pub use container::{CleanupStats, ContainerHandle, ContainerManager, ContainerSession, ExecOutput};
pub use orchestrator::{OrchestratorSettings, TaskOrchestrator};
pub use retry::RetryPolicy;
