// src/build/scheduler.rs

//! Per-run state machine deciding which planned tasks may start.
//!
//! The scheduler is pure: it never runs anything. The build engine asks it
//! for ready tasks, reports outcomes back, and spawns whatever it returns.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::dag::TaskGraph;
use crate::engine::TaskName;

/// State of a planned task within one build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRunState {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// An upstream task failed, was skipped, or never produced output.
    Skipped,
    /// The run was cancelled before this task started.
    Cancelled,
}

impl TaskRunState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskRunState::Pending | TaskRunState::Running)
    }
}

/// Result of a single scheduler step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStep {
    /// Tasks that became ready and are now `Running`, in plan order.
    pub newly_ready: Vec<TaskName>,
    /// Tasks newly marked `Skipped` by this step.
    pub newly_skipped: Vec<TaskName>,
    /// Tasks newly marked `Cancelled` by this step.
    pub newly_cancelled: Vec<TaskName>,
    /// Whether every planned task has reached a terminal state.
    pub finished: bool,
}

#[derive(Debug)]
struct PlannedTask {
    state: TaskRunState,
    /// Dependencies that are part of this run.
    in_run_deps: Vec<TaskName>,
    /// Dependents that are part of this run.
    in_run_dependents: Vec<TaskName>,
    /// A dependency outside the run has never succeeded.
    blocked: bool,
}

#[derive(Debug)]
pub struct RunScheduler {
    order: Vec<TaskName>,
    tasks: HashMap<TaskName, PlannedTask>,
}

impl RunScheduler {
    /// Plan a run over `plan` (any order; unknown names are dropped).
    ///
    /// `has_succeeded` reports whether a task outside the run has ever
    /// completed successfully; dependents of one that has not are skipped.
    pub fn new<F>(graph: &TaskGraph, plan: &[TaskName], has_succeeded: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let order = graph.order_names(plan);
        let in_run: HashSet<&str> = order.iter().map(String::as_str).collect();

        let mut tasks = HashMap::with_capacity(order.len());
        for name in &order {
            let mut in_run_deps = Vec::new();
            let mut blocked = false;
            for dep in graph.dependencies_of(name) {
                if in_run.contains(dep) {
                    in_run_deps.push(dep.to_string());
                } else if !has_succeeded(dep) {
                    debug!(
                        task = %name,
                        dependency = %dep,
                        "out-of-run dependency never succeeded"
                    );
                    blocked = true;
                }
            }

            let in_run_dependents = graph
                .dependents_of(name)
                .into_iter()
                .filter(|d| in_run.contains(d))
                .map(str::to_string)
                .collect();

            tasks.insert(
                name.clone(),
                PlannedTask {
                    state: TaskRunState::Pending,
                    in_run_deps,
                    in_run_dependents,
                    blocked,
                },
            );
        }

        Self { order, tasks }
    }

    /// Planned tasks in the order they are considered.
    pub fn planned(&self) -> &[TaskName] {
        &self.order
    }

    pub fn state_of(&self, task: &str) -> Option<TaskRunState> {
        self.tasks.get(task).map(|t| t.state)
    }

    /// Tasks currently in `state`, in plan order.
    pub fn tasks_in(&self, state: TaskRunState) -> Vec<TaskName> {
        self.order
            .iter()
            .filter(|n| self.state_of(n) == Some(state))
            .cloned()
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.state == TaskRunState::Running)
            .count()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_terminal())
    }

    /// Skip blocked tasks and hand out the first wave of ready tasks.
    pub fn start(&mut self) -> RunStep {
        let blocked: Vec<TaskName> = self
            .order
            .iter()
            .filter(|n| self.tasks.get(*n).is_some_and(|t| t.blocked))
            .cloned()
            .collect();

        let mut newly_skipped = Vec::new();
        for name in blocked {
            if self.state_of(&name) == Some(TaskRunState::Pending) {
                self.set_state(&name, TaskRunState::Skipped);
                newly_skipped.push(name.clone());
                newly_skipped.extend(self.skip_dependents(&name));
            }
        }

        let newly_ready = self.collect_ready();
        RunStep {
            newly_ready,
            newly_skipped,
            finished: self.is_finished(),
            ..RunStep::default()
        }
    }

    /// Record the outcome of a running task.
    pub fn complete(&mut self, task: &str, success: bool) -> RunStep {
        let mut newly_skipped = Vec::new();

        if self.state_of(task) != Some(TaskRunState::Running) {
            debug!(task = %task, "completion for a task that is not running; ignoring");
            return RunStep {
                finished: self.is_finished(),
                ..RunStep::default()
            };
        }

        if success {
            self.set_state(task, TaskRunState::Succeeded);
        } else {
            self.set_state(task, TaskRunState::Failed);
            newly_skipped = self.skip_dependents(task);
            if !newly_skipped.is_empty() {
                info!(task = %task, skipped = ?newly_skipped, "skipping dependents of failed task");
            }
        }

        let newly_ready = self.collect_ready();
        RunStep {
            newly_ready,
            newly_skipped,
            finished: self.is_finished(),
            ..RunStep::default()
        }
    }

    /// Record that a running task gave up because the run was cancelled
    /// before it could start working. Its pending dependents are cancelled
    /// with it.
    pub fn complete_cancelled(&mut self, task: &str) -> RunStep {
        if self.state_of(task) != Some(TaskRunState::Running) {
            return RunStep {
                finished: self.is_finished(),
                ..RunStep::default()
            };
        }
        self.set_state(task, TaskRunState::Cancelled);

        let mut newly_cancelled = Vec::new();
        let mut stack: Vec<TaskName> = self
            .tasks
            .get(task)
            .map(|t| t.in_run_dependents.clone())
            .unwrap_or_default();
        while let Some(name) = stack.pop() {
            if let Some(t) = self.tasks.get_mut(&name) {
                if t.state == TaskRunState::Pending {
                    t.state = TaskRunState::Cancelled;
                    stack.extend(t.in_run_dependents.iter().cloned());
                    newly_cancelled.push(name);
                }
            }
        }
        newly_cancelled.sort_by_key(|n| self.order.iter().position(|o| o == n));

        RunStep {
            newly_cancelled,
            finished: self.is_finished(),
            ..RunStep::default()
        }
    }

    /// Mark every still-pending task `Cancelled`. Running tasks are left to
    /// finish. Returns the cancelled tasks in plan order.
    pub fn cancel_pending(&mut self) -> Vec<TaskName> {
        let pending = self.tasks_in(TaskRunState::Pending);
        for name in &pending {
            self.set_state(name, TaskRunState::Cancelled);
        }
        pending
    }

    fn set_state(&mut self, task: &str, state: TaskRunState) {
        if let Some(t) = self.tasks.get_mut(task) {
            t.state = state;
        }
    }

    /// Transitively mark pending in-run dependents `Skipped`.
    fn skip_dependents(&mut self, task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self
            .tasks
            .get(task)
            .map(|t| t.in_run_dependents.clone())
            .unwrap_or_default();
        let mut skipped = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(t) = self.tasks.get_mut(&name) {
                if t.state == TaskRunState::Pending {
                    t.state = TaskRunState::Skipped;
                    debug!(task = %name, upstream = %task, "marked Skipped");
                    stack.extend(t.in_run_dependents.iter().cloned());
                    skipped.push(name);
                }
            }
        }

        skipped.sort_by_key(|n| self.order.iter().position(|o| o == n));
        skipped
    }

    /// Pending tasks whose in-run dependencies all succeeded become
    /// `Running`.
    fn collect_ready(&mut self) -> Vec<TaskName> {
        let ready: Vec<TaskName> = self
            .order
            .iter()
            .filter(|name| {
                self.tasks.get(*name).is_some_and(|t| {
                    t.state == TaskRunState::Pending
                        && t.in_run_deps
                            .iter()
                            .all(|d| self.state_of(d) == Some(TaskRunState::Succeeded))
                })
            })
            .cloned()
            .collect();

        for name in &ready {
            self.set_state(name, TaskRunState::Running);
        }
        ready
    }
}
