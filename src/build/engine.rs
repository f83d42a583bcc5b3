// src/build/engine.rs

//! The build engine: executes one [`RunPlan`] at a time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::build::last_run::{LastRunStore, MemoryLastRunStore};
use crate::build::run::{BuildRun, RunHistory, RunPlan, TaskFailure};
use crate::build::scheduler::{RunScheduler, RunStep};
use crate::dag::{TaskGraph, collect_matching_files};
use crate::engine::TaskName;
use crate::errors::ProcessorError;
use crate::fs::FileSystem;
use crate::processor::{DataMap, DataProvider, EmptyDataProvider, ProcessOutput, ProcessRequest};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_HISTORY_LEN: usize = 16;

type TaskResult = (TaskName, Result<ProcessOutput, ProcessorError>);

/// Executes build runs against a fixed task graph.
///
/// - Ready tasks run concurrently, at most `concurrency` at a time.
/// - At most one run is in flight; further callers of [`run`](Self::run)
///   wait for it and then start in arrival order.
/// - Every succeeded task gets its `lastRun` stamped when the run ends.
pub struct BuildEngine {
    graph: Arc<TaskGraph>,
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    concurrency: usize,
    semaphore: Arc<Semaphore>,
    run_guard: tokio::sync::Mutex<()>,
    last_run: Mutex<Box<dyn LastRunStore>>,
    data: Arc<dyn DataProvider>,
    history: Mutex<RunHistory>,
    next_run_id: AtomicU64,
}

impl std::fmt::Debug for BuildEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildEngine")
            .field("root", &self.root)
            .field("tasks", &self.graph.len())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl BuildEngine {
    pub fn new(graph: Arc<TaskGraph>, root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            graph,
            root: root.into(),
            fs,
            concurrency: DEFAULT_CONCURRENCY,
            semaphore: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
            run_guard: tokio::sync::Mutex::new(()),
            last_run: Mutex::new(Box::new(MemoryLastRunStore::new())),
            data: Arc::new(EmptyDataProvider),
            history: Mutex::new(RunHistory::new(DEFAULT_HISTORY_LEN)),
            next_run_id: AtomicU64::new(0),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        self.concurrency = concurrency;
        self.semaphore = Arc::new(Semaphore::new(concurrency));
        self
    }

    pub fn with_last_run_store(self, store: Box<dyn LastRunStore>) -> Self {
        *lock(&self.last_run) = store;
        self
    }

    pub fn with_data_provider(mut self, data: Arc<dyn DataProvider>) -> Self {
        self.data = data;
        self
    }

    pub fn with_history_len(self, len: usize) -> Self {
        *lock(&self.history) = RunHistory::new(len);
        self
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Last successful completion of `task`, if any.
    pub fn last_run_of(&self, task: &str) -> Option<DateTime<Utc>> {
        lock(&self.last_run).load(task)
    }

    /// Snapshot of the recent runs, oldest first.
    pub fn history(&self) -> RunHistory {
        lock(&self.history).clone()
    }

    /// Drop `lastRun` markers of tasks that are no longer configured.
    pub fn prune_last_run(&self) {
        let names: Vec<&str> = self.graph.task_names().collect();
        if let Err(err) = lock(&self.last_run).prune(&names) {
            warn!(error = %err, "failed to prune lastRun markers");
        }
    }

    /// Remove configured output paths (relative to the project root).
    pub fn clean(&self, paths: &[PathBuf]) -> anyhow::Result<()> {
        for rel in paths {
            let path = self.root.join(rel);
            if self.fs.exists(&path) {
                self.fs
                    .remove_all(&path)
                    .with_context(|| format!("cleaning {:?}", path))?;
                info!(path = ?rel, "cleaned");
            }
        }
        Ok(())
    }

    /// Execute `plan` and return its record.
    ///
    /// Cancelling `cancel` lets running processors finish; tasks that have
    /// not started yet are reported as cancelled.
    pub async fn run(&self, plan: RunPlan, cancel: CancellationToken) -> BuildRun {
        let _guard = self.run_guard.lock().await;

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut run = BuildRun::new(run_id, &plan);
        info!(
            run_id,
            trigger = %plan.trigger,
            tasks = ?plan.tasks,
            "starting build run"
        );

        let data = Arc::new(self.load_data().await);
        let (mut scheduler, since) = {
            let store = lock(&self.last_run);
            let scheduler =
                RunScheduler::new(&self.graph, &plan.tasks, |t| store.load(t).is_some());
            let since: HashMap<TaskName, DateTime<Utc>> = scheduler
                .planned()
                .iter()
                .filter(|n| self.graph.get(n).is_some_and(|t| t.incremental))
                .filter_map(|n| store.load(n).map(|at| (n.clone(), at)))
                .collect();
            (scheduler, since)
        };
        // Planned names that are not in the graph are dropped by the scheduler.
        run.tasks_planned = scheduler.planned().to_vec();

        let mut join_set: JoinSet<TaskResult> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, TaskName> = HashMap::new();
        let mut cancel_seen = false;

        let step = scheduler.start();
        self.apply_step(&mut run, &step);
        for name in step.newly_ready {
            let since = since.get(&name).copied();
            self.spawn_task(&mut join_set, &mut running, name, run_id, since, &data, &cancel);
        }

        while !join_set.is_empty() {
            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    let cancelled = scheduler.cancel_pending();
                    info!(
                        run_id,
                        cancelled = ?cancelled,
                        running = scheduler.running_count(),
                        "build run cancelled; waiting for running tasks"
                    );
                    run.tasks_cancelled.extend(cancelled);
                }

                Some(joined) = join_set.join_next_with_id() => {
                    let (name, result) = match joined {
                        Ok((id, result)) => {
                            running.remove(&id);
                            result
                        }
                        Err(join_err) => {
                            let Some(name) = running.remove(&join_err.id()) else {
                                error!(run_id, error = %join_err, "lost track of a task");
                                continue;
                            };
                            let err = ProcessorError::Failed(format!(
                                "processor panicked: {join_err}"
                            ));
                            (name, Err(err))
                        }
                    };

                    let step = self.record_result(&mut scheduler, &mut run, name, result);
                    self.apply_step(&mut run, &step);
                    for name in step.newly_ready {
                        let since = since.get(&name).copied();
                        self.spawn_task(
                            &mut join_set,
                            &mut running,
                            name,
                            run_id,
                            since,
                            &data,
                            &cancel,
                        );
                    }
                }
            }
        }

        if !scheduler.is_finished() {
            // Nothing is running, so whatever is still pending can never start.
            let stranded = scheduler.cancel_pending();
            warn!(run_id, tasks = ?stranded, "tasks could not be scheduled");
            run.tasks_cancelled.extend(stranded);
        }

        if let Err(err) = lock(&self.last_run).save_all(&run.tasks_completed, run.started_at) {
            warn!(run_id, error = %err, "failed to store lastRun markers");
        }

        run.finished_at = Some(Utc::now());
        log_summary(&run);
        lock(&self.history).push(run.clone());
        run
    }

    /// Template data for one run. Reading it walks the file system, so it
    /// runs on the blocking pool.
    async fn load_data(&self) -> DataMap {
        let provider = self.data.clone();
        match tokio::task::spawn_blocking(move || provider.load()).await {
            Ok(Ok(data)) => data,
            Ok(Err(err)) => {
                warn!(error = %err, "failed to load template data; continuing without it");
                DataMap::new()
            }
            Err(err) => {
                warn!(error = %err, "template data loader panicked; continuing without it");
                DataMap::new()
            }
        }
    }

    fn record_result(
        &self,
        scheduler: &mut RunScheduler,
        run: &mut BuildRun,
        name: TaskName,
        result: Result<ProcessOutput, ProcessorError>,
    ) -> RunStep {
        match result {
            Ok(output) => {
                info!(
                    task = %name,
                    run_id = run.id,
                    produced = output.produced.len(),
                    "task succeeded"
                );
                let step = scheduler.complete(&name, true);
                run.produced_paths.insert(name.clone(), output.produced);
                run.tasks_completed.push(name);
                step
            }
            Err(ProcessorError::Cancelled) => {
                info!(task = %name, run_id = run.id, "task cancelled before it started");
                let step = scheduler.complete_cancelled(&name);
                run.tasks_cancelled.push(name);
                step
            }
            Err(err) => {
                error!(task = %name, run_id = run.id, error = %err, "task failed");
                let step = scheduler.complete(&name, false);
                run.tasks_failed.push(TaskFailure::new(name, err));
                step
            }
        }
    }

    fn apply_step(&self, run: &mut BuildRun, step: &RunStep) {
        for name in &step.newly_skipped {
            debug!(task = %name, run_id = run.id, "task skipped");
        }
        run.tasks_skipped.extend(step.newly_skipped.iter().cloned());
        run.tasks_cancelled.extend(step.newly_cancelled.iter().cloned());
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_task(
        &self,
        join_set: &mut JoinSet<TaskResult>,
        running: &mut HashMap<tokio::task::Id, TaskName>,
        name: TaskName,
        run_id: u64,
        since: Option<DateTime<Utc>>,
        data: &Arc<DataMap>,
        cancel: &CancellationToken,
    ) {
        let Some(task) = self.graph.get(&name) else {
            error!(task = %name, "scheduled task is not in the graph");
            return;
        };

        let processor = task.processor.clone();
        let patterns = task.sources.clone();
        let destination = task.destination.clone();
        let options = task.options.clone();
        let root = self.root.clone();
        let fs = self.fs.clone();
        let semaphore = self.semaphore.clone();
        let data = data.clone();
        let cancel = cancel.clone();
        let task_name = name.clone();

        let handle = join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (task_name, Err(ProcessorError::Cancelled)),
            };
            if cancel.is_cancelled() {
                return (task_name, Err(ProcessorError::Cancelled));
            }

            let collected = {
                let (fs, root, name, patterns) =
                    (fs.clone(), root.clone(), task_name.clone(), patterns.clone());
                tokio::task::spawn_blocking(move || {
                    collect_matching_files(fs.as_ref(), &root, &name, &patterns)
                })
                .await
            };
            let sources = match collected {
                Ok(Ok(sources)) => sources,
                Ok(Err(err)) => return (task_name, Err(ProcessorError::Other(err))),
                Err(err) => return (task_name, Err(ProcessorError::Other(err.into()))),
            };

            info!(
                task = %task_name,
                run_id,
                sources = sources.len(),
                since = ?since,
                "running task"
            );

            let request = ProcessRequest {
                task: task_name.clone(),
                run_id,
                root,
                sources,
                patterns,
                destination,
                options,
                since,
                data,
                cancel,
                fs,
            };
            let result = processor.process(request).await;
            (task_name, result)
        });

        running.insert(handle.id(), name);
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn log_summary(run: &BuildRun) {
    let elapsed_ms = run.duration().map(|d| d.num_milliseconds()).unwrap_or(0);
    if run.is_success() {
        info!(
            run_id = run.id,
            succeeded = run.tasks_completed.len(),
            elapsed_ms,
            "build run finished"
        );
    } else {
        warn!(
            run_id = run.id,
            succeeded = run.tasks_completed.len(),
            failed = run.tasks_failed.len(),
            skipped = run.tasks_skipped.len(),
            cancelled = run.tasks_cancelled.len(),
            elapsed_ms,
            "build run finished with problems"
        );
    }
}
