#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetdag::errors::ProcessorError;
use assetdag::processor::{ProcessFuture, ProcessOutput, ProcessRequest, Processor};
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

/// One recorded invocation of a [`FakeProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessCall {
    pub task: String,
    pub run_id: u64,
    pub sources: Vec<PathBuf>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Mutex<Vec<ProcessCall>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    finished: AtomicUsize,
}

/// In-memory processor for tests.
///
/// - Records every invocation (task, run id, sources, since hint).
/// - Fails for task names registered via [`fail`](Self::fail).
/// - Optionally sleeps, or blocks on a [`Gate`] until released.
/// - Tracks the highest number of concurrent invocations.
///
/// Writes nothing; reports the destination as its only output.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessor {
    inner: Arc<Inner>,
}

/// Holds gated invocations until permits are released.
#[derive(Debug, Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
}

impl Gate {
    /// Let `n` waiting (or future) invocations proceed.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    /// Let every invocation proceed from now on.
    pub fn open(&self) {
        self.permits.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc(&self) -> Arc<dyn Processor> {
        Arc::new(self.clone())
    }

    /// Make every invocation for `task` fail.
    pub fn fail(&self, task: &str) {
        self.inner.failing.lock().unwrap().insert(task.to_string());
    }

    /// Stop failing `task`.
    pub fn heal(&self, task: &str) {
        self.inner.failing.lock().unwrap().remove(task);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock().unwrap() = delay;
    }

    /// Block every invocation until the returned gate releases it.
    pub fn gate(&self) -> Gate {
        let permits = Arc::new(Semaphore::new(0));
        *self.inner.gate.lock().unwrap() = Some(permits.clone());
        Gate { permits }
    }

    pub fn calls(&self) -> Vec<ProcessCall> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Task names in the order their invocations started.
    pub fn called_tasks(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.task).collect()
    }

    /// Task names invoked during run `run_id`.
    pub fn tasks_in_run(&self, run_id: u64) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.run_id == run_id)
            .map(|c| c.task)
            .collect()
    }

    pub fn started(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    pub fn finished(&self) -> usize {
        self.inner.finished.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.inner.calls.lock().unwrap().clear();
    }
}

impl Processor for FakeProcessor {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let now = inner.active.fetch_add(1, Ordering::SeqCst) + 1;
            inner.max_active.fetch_max(now, Ordering::SeqCst);

            inner.calls.lock().unwrap().push(ProcessCall {
                task: request.task.clone(),
                run_id: request.run_id,
                sources: request.sources.clone(),
                since: request.since,
            });

            let gate = inner.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
            }

            let delay = *inner.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            inner.active.fetch_sub(1, Ordering::SeqCst);
            inner.finished.fetch_add(1, Ordering::SeqCst);

            if inner.failing.lock().unwrap().contains(&request.task) {
                return Err(ProcessorError::Failed(format!(
                    "fake failure in '{}'",
                    request.task
                )));
            }

            Ok(ProcessOutput {
                produced: vec![request.destination.path().to_path_buf()],
            })
        })
    }
}
