// src/engine/queue.rs

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::debug;

use crate::build::RunPlan;
use crate::dag::TaskGraph;
use crate::engine::TaskName;
use crate::watch::ChangeBatch;

/// Work that arrived while a build run was active.
///
/// Everything recorded between two runs collapses into a single pending
/// work item:
/// - a full build request absorbs any path changes,
/// - changed paths are unioned,
/// - tasks cancelled by an earlier run are carried along.
///
/// [`take_plan`](Self::take_plan) turns the item into one [`RunPlan`].
#[derive(Debug, Default)]
pub struct WorkQueue {
    full: bool,
    paths: BTreeSet<PathBuf>,
    carried: Vec<TaskName>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.paths.is_empty() && self.carried.is_empty()
    }

    pub fn has_full(&self) -> bool {
        self.full
    }

    pub fn record_full(&mut self) {
        debug!("queued full build");
        self.full = true;
    }

    pub fn record_paths<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let before = self.paths.len();
        self.paths.extend(paths);
        debug!(added = self.paths.len() - before, total = self.paths.len(), "queued changed paths");
    }

    pub fn record_batch(&mut self, batch: &ChangeBatch) {
        self.record_paths(batch.paths());
    }

    pub fn record_carried<I>(&mut self, tasks: I)
    where
        I: IntoIterator<Item = TaskName>,
    {
        for task in tasks {
            if !self.carried.contains(&task) {
                self.carried.push(task);
            }
        }
    }

    pub fn carried(&self) -> &[TaskName] {
        &self.carried
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    /// Drain the pending item into a plan. Returns `None` if nothing is
    /// queued or the queued changes affect no task.
    pub fn take_plan(&mut self, graph: &TaskGraph) -> Option<RunPlan> {
        if self.is_empty() {
            return None;
        }

        let full = std::mem::take(&mut self.full);
        let paths: Vec<PathBuf> = std::mem::take(&mut self.paths).into_iter().collect();
        let carried = std::mem::take(&mut self.carried);

        let plan = if full {
            RunPlan::full(graph)
        } else {
            RunPlan::for_changes(graph, paths, &carried)
        };

        if plan.is_empty() {
            debug!("queued work resolves to no tasks");
            None
        } else {
            Some(plan)
        }
    }
}
