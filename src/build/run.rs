// src/build/run.rs

//! Build run records and the bounded run history.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::build::scheduler::TaskRunState;
use crate::dag::TaskGraph;
use crate::engine::TaskName;
use crate::errors::{AssetdagError, ProcessorError};

/// What caused a build run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTrigger {
    /// Every task, in full topological order.
    Full,
    /// Paths (relative to the project root) reported by the watcher.
    ChangeSet(Vec<PathBuf>),
    /// Tasks cancelled in an earlier run, without new changes.
    Carried(Vec<TaskName>),
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTrigger::Full => f.write_str("full"),
            RunTrigger::ChangeSet(paths) => write!(f, "changes ({} paths)", paths.len()),
            RunTrigger::Carried(tasks) => write!(f, "carried over ({} tasks)", tasks.len()),
        }
    }
}

/// Tasks selected for one run, in dependency order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub trigger: RunTrigger,
    pub tasks: Vec<TaskName>,
}

impl RunPlan {
    /// Plan every task of the graph.
    pub fn full(graph: &TaskGraph) -> Self {
        Self {
            trigger: RunTrigger::Full,
            tasks: graph.full_order().into_iter().map(|t| t.name.clone()).collect(),
        }
    }

    /// Plan the tasks affected by `paths` plus the `carried` tasks, together
    /// with their transitive dependents.
    pub fn for_changes(graph: &TaskGraph, paths: Vec<PathBuf>, carried: &[TaskName]) -> Self {
        let mut names: Vec<TaskName> = graph
            .resolve(&paths)
            .into_iter()
            .map(|t| t.name.clone())
            .collect();
        names.extend(
            graph
                .resolve_names(carried)
                .into_iter()
                .map(|t| t.name.clone()),
        );

        let trigger = if paths.is_empty() && !carried.is_empty() {
            RunTrigger::Carried(carried.to_vec())
        } else {
            RunTrigger::ChangeSet(paths)
        };

        Self {
            trigger,
            tasks: graph.order_names(names),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A task that failed in a run, with the processor's error as reported.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task: TaskName,
    pub error: Arc<ProcessorError>,
}

impl TaskFailure {
    pub fn new(task: impl Into<TaskName>, error: ProcessorError) -> Self {
        Self {
            task: task.into(),
            error: Arc::new(error),
        }
    }

    /// The failure as a crate error, for reporting with its cause chain.
    pub fn to_error(&self) -> AssetdagError {
        AssetdagError::Processor {
            task: self.task.clone(),
            source: self.error.clone(),
        }
    }
}

/// Record of one execution of the build engine.
#[derive(Debug, Clone)]
pub struct BuildRun {
    pub id: u64,
    pub triggered_by: RunTrigger,
    /// Planned tasks in dependency order.
    pub tasks_planned: Vec<TaskName>,
    /// Succeeded tasks in completion order.
    pub tasks_completed: Vec<TaskName>,
    pub tasks_failed: Vec<TaskFailure>,
    pub tasks_skipped: Vec<TaskName>,
    pub tasks_cancelled: Vec<TaskName>,
    pub produced_paths: BTreeMap<TaskName, Vec<PathBuf>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildRun {
    pub fn new(id: u64, plan: &RunPlan) -> Self {
        Self {
            id,
            triggered_by: plan.trigger.clone(),
            tasks_planned: plan.tasks.clone(),
            tasks_completed: Vec::new(),
            tasks_failed: Vec::new(),
            tasks_skipped: Vec::new(),
            tasks_cancelled: Vec::new(),
            produced_paths: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// True when every planned task succeeded. An empty run is a success.
    pub fn is_success(&self) -> bool {
        self.tasks_completed.len() == self.tasks_planned.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Final state of a planned task.
    pub fn status_of(&self, task: &str) -> Option<TaskRunState> {
        if self.tasks_completed.iter().any(|t| t == task) {
            Some(TaskRunState::Succeeded)
        } else if self.tasks_failed.iter().any(|f| f.task == task) {
            Some(TaskRunState::Failed)
        } else if self.tasks_skipped.iter().any(|t| t == task) {
            Some(TaskRunState::Skipped)
        } else if self.tasks_cancelled.iter().any(|t| t == task) {
            Some(TaskRunState::Cancelled)
        } else if self.tasks_planned.iter().any(|t| t == task) {
            Some(TaskRunState::Pending)
        } else {
            None
        }
    }

    pub fn failure_of(&self, task: &str) -> Option<&TaskFailure> {
        self.tasks_failed.iter().find(|f| f.task == task)
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

/// Ring buffer of the most recent build runs.
#[derive(Debug, Clone)]
pub struct RunHistory {
    capacity: usize,
    runs: VecDeque<BuildRun>,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            runs: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, run: BuildRun) {
        if self.runs.len() == self.capacity {
            self.runs.pop_front();
        }
        self.runs.push_back(run);
    }

    pub fn latest(&self) -> Option<&BuildRun> {
        self.runs.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &BuildRun> {
        self.runs.iter()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
