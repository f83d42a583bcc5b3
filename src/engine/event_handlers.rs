// src/engine/event_handlers.rs

//! Event handling logic for the core orchestrator.

use tracing::{debug, info};

use crate::build::{BuildRun, RunPlan};
use crate::engine::core::OrchestratorCore;
use crate::engine::{BuildRequest, Mode, OrchestratorState};
use crate::watch::ChangeBatch;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Execute this plan on the build engine.
    StartRun(RunPlan),
    /// Broadcast the reload message derived from this run.
    NotifyReload(BuildRun),
    /// Cancel the in-flight run's token.
    CancelRun,
    /// Drop the file-system subscription.
    StopWatching,
    /// Request that the process exits.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn keep(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub fn exit() -> Self {
        Self {
            commands: vec![CoreCommand::RequestExit],
            keep_running: false,
        }
    }
}

/// Handle an explicit build request.
///
/// Requests arriving during a run are merged into the pending work item.
pub fn handle_build_request(core: &mut OrchestratorCore, request: BuildRequest) -> CoreStep {
    if core.shutting_down {
        debug!(?request, "ignoring build request during shutdown");
        return CoreStep::keep(Vec::new());
    }

    match request {
        BuildRequest::Full => core.queue.record_full(),
        BuildRequest::Paths(paths) => core.queue.record_paths(paths),
    }

    if core.state == OrchestratorState::Building {
        return CoreStep::keep(Vec::new());
    }
    start_pending_work(core)
}

/// Handle a debounced change batch.
pub fn handle_changes(core: &mut OrchestratorCore, batch: ChangeBatch) -> CoreStep {
    if core.shutting_down || batch.is_empty() {
        return CoreStep::keep(Vec::new());
    }

    debug!(paths = ?batch.paths(), "change batch received");
    core.queue.record_batch(&batch);

    if core.state == OrchestratorState::Building {
        return CoreStep::keep(Vec::new());
    }
    start_pending_work(core)
}

/// Handle the end of a build run.
///
/// - Updates the session summary.
/// - Carries cancelled tasks into the pending work item.
/// - In watch mode, asks the shell to broadcast a reload.
/// - Starts queued work, or goes back to watching / exits.
pub fn handle_run_finished(core: &mut OrchestratorCore, run: BuildRun) -> CoreStep {
    let mut commands = Vec::new();

    core.summary.runs += 1;
    core.summary.last_run_succeeded = Some(run.is_success());
    if !run.is_success() {
        core.summary.failed_runs += 1;
    }

    if !run.tasks_cancelled.is_empty() {
        info!(tasks = ?run.tasks_cancelled, "carrying cancelled tasks into the next cycle");
        core.queue.record_carried(run.tasks_cancelled.iter().cloned());
    }

    if core.mode == Mode::Watch {
        commands.push(CoreCommand::NotifyReload(run));
    }

    if core.shutting_down || core.mode == Mode::Once {
        core.summary.carried_over = core.queue.carried().to_vec();
        core.state = OrchestratorState::Stopped;
        commands.push(CoreCommand::RequestExit);
        return CoreStep {
            commands,
            keep_running: false,
        };
    }

    core.state = OrchestratorState::Watching;
    let mut next = start_pending_work(core);
    commands.append(&mut next.commands);
    CoreStep::keep(commands)
}

/// Handle a shutdown request in any state.
///
/// A running build is cancelled and the loop keeps going until its
/// `RunFinished` arrives; otherwise the core stops immediately.
pub fn handle_shutdown(core: &mut OrchestratorCore) -> CoreStep {
    if core.shutting_down {
        return CoreStep::keep(Vec::new());
    }
    core.shutting_down = true;
    info!(state = ?core.state, "shutdown requested");

    let mut commands = vec![CoreCommand::StopWatching];

    if core.state == OrchestratorState::Building {
        commands.push(CoreCommand::CancelRun);
        return CoreStep::keep(commands);
    }

    core.summary.carried_over = core.queue.carried().to_vec();
    core.state = OrchestratorState::Stopped;
    commands.push(CoreCommand::RequestExit);
    CoreStep {
        commands,
        keep_running: false,
    }
}

/// Turn the pending work item into a run, if there is one.
fn start_pending_work(core: &mut OrchestratorCore) -> CoreStep {
    match core.queue.take_plan(&core.graph) {
        Some(plan) => {
            info!(trigger = %plan.trigger, tasks = ?plan.tasks, "starting build");
            core.state = OrchestratorState::Building;
            CoreStep::keep(vec![CoreCommand::StartRun(plan)])
        }
        None => {
            if core.mode == Mode::Once {
                // Nothing to build at all; a one-shot session is done.
                core.state = OrchestratorState::Stopped;
                return CoreStep::exit();
            }
            core.state = OrchestratorState::Watching;
            CoreStep::keep(Vec::new())
        }
    }
}
