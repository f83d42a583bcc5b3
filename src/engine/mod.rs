// src/engine/mod.rs

//! Orchestration engine for assetdag.
//!
//! This module ties together:
//! - the build engine (one run at a time)
//! - the work queue (what happens when changes arrive while a run is active)
//! - the main event loop that reacts to:
//!   - build requests
//!   - debounced change batches
//!   - finished build runs
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::path::PathBuf;

use crate::build::BuildRun;
use crate::watch::ChangeBatch;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Operating mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run one full build, then exit.
    Once,
    /// Build, then keep rebuilding on changes until shut down.
    Watch,
}

/// Externally visible state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Watching,
    Building,
    Stopped,
}

/// Explicit request for a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRequest {
    Full,
    /// Paths relative to the project root.
    Paths(Vec<PathBuf>),
}

/// Events flowing into the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    BuildRequested(BuildRequest),
    ChangesObserved(ChangeBatch),
    RunFinished(BuildRun),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// What a session amounted to, used for the process exit status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub runs: usize,
    /// Runs in which at least one task did not succeed.
    pub failed_runs: usize,
    /// Whether the most recent run succeeded completely.
    pub last_run_succeeded: Option<bool>,
    /// Tasks cancelled by shutdown and never rerun.
    pub carried_over: Vec<TaskName>,
}

impl SessionSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed_runs == 0
    }
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use self::core::OrchestratorCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::WorkQueue;
pub use runtime::Orchestrator;
