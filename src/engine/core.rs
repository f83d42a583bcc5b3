// src/engine/core.rs

//! Pure core orchestrator state machine.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`OrchestratorEvent`]s and produces:
//! - an updated core state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Orchestrator`) is responsible for:
//! - reading events and change batches
//! - running build plans on the build engine
//! - broadcasting reload messages
//! - handling Ctrl+C / shutdown
//!
//! The core is intended to be unit tested without any Tokio, channels,
//! filesystem, or processes.

use std::sync::Arc;

use crate::dag::TaskGraph;
use crate::engine::event_handlers::{
    CoreStep, handle_build_request, handle_changes, handle_run_finished, handle_shutdown,
};
use crate::engine::queue::WorkQueue;
use crate::engine::{Mode, OrchestratorEvent, OrchestratorState, SessionSummary};

/// Pure core state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct OrchestratorCore {
    pub(super) graph: Arc<TaskGraph>,
    pub(super) mode: Mode,
    pub(super) state: OrchestratorState,
    pub(super) queue: WorkQueue,
    pub(super) shutting_down: bool,
    pub(super) summary: SessionSummary,
}

impl OrchestratorCore {
    pub fn new(graph: Arc<TaskGraph>, mode: Mode) -> Self {
        let state = match mode {
            Mode::Once => OrchestratorState::Idle,
            Mode::Watch => OrchestratorState::Watching,
        };
        Self {
            graph,
            mode,
            state,
            queue: WorkQueue::new(),
            shutting_down: false,
            summary: SessionSummary::default(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    /// Expose the pending work item (for tests).
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Whether the shell should hand over change batches right now. While a
    /// run is active they stay with the dispatcher, which keeps merging them.
    pub fn accepts_changes(&self) -> bool {
        self.mode == Mode::Watch && self.state == OrchestratorState::Watching
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: OrchestratorEvent) -> CoreStep {
        if self.state == OrchestratorState::Stopped {
            return CoreStep::exit();
        }

        match event {
            OrchestratorEvent::BuildRequested(request) => handle_build_request(self, request),
            OrchestratorEvent::ChangesObserved(batch) => handle_changes(self, batch),
            OrchestratorEvent::RunFinished(run) => handle_run_finished(self, run),
            OrchestratorEvent::ShutdownRequested => handle_shutdown(self),
        }
    }
}
