// src/watch/dispatcher.rs

//! File-system subscription, debouncing and change-to-task filtering.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::dag::{TaskGraph, collect_matching_files};
use crate::errors::{AssetdagError, Result};
use crate::fs::FileSystem;
use crate::path_utils::relative_str;
use crate::watch::changes::{ChangeBatch, ChangeEvent, ChangeKind};
use crate::watch::hash::FileCache;

/// A change as reported by the platform watcher, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// Absolute path.
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RawChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Translate a notify event into per-path changes. Access events and
/// anything notify cannot classify are dropped.
pub fn classify_event(event: &Event) -> Vec<RawChange> {
    let single = |kind: ChangeKind| {
        event
            .paths
            .iter()
            .map(|p| RawChange::new(p.clone(), kind))
            .collect::<Vec<_>>()
    };

    match event.kind {
        EventKind::Create(_) => single(ChangeKind::Created),
        EventKind::Remove(_) => single(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => single(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => single(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(event.paths.len());
            if let Some(from) = event.paths.first() {
                out.push(RawChange::new(from.clone(), ChangeKind::Deleted));
            }
            if let Some(to) = event.paths.get(1) {
                out.push(RawChange::new(to.clone(), ChangeKind::Created));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Deleted
                };
                RawChange::new(p.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) | EventKind::Any => single(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// Turns raw changes into root-relative events for paths some task cares
/// about, optionally dropping content-neutral modifications.
#[derive(Debug)]
pub struct ChangeFilter {
    root: PathBuf,
    graph: Arc<TaskGraph>,
    fs: Arc<dyn FileSystem>,
    hashes: FileCache,
}

impl ChangeFilter {
    pub fn new(root: impl Into<PathBuf>, graph: Arc<TaskGraph>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            graph,
            fs,
            hashes: FileCache::new(),
        }
    }

    /// Hash every existing source of the `use_hash` tasks so the first
    /// no-op save is already recognised.
    pub fn seed_hashes(&mut self) {
        for task in self.graph.tasks().filter(|t| t.use_hash) {
            let files = match collect_matching_files(
                self.fs.as_ref(),
                &self.root,
                &task.name,
                &task.sources,
            ) {
                Ok(files) => files,
                Err(err) => {
                    warn!(task = %task.name, error = %err, "failed to seed content hashes");
                    continue;
                }
            };
            for file in files {
                if let Err(err) = self.hashes.seed(self.fs.as_ref(), &file) {
                    debug!(path = ?file, error = %err, "failed to hash file");
                }
            }
        }
        debug!(files = self.hashes.len(), "seeded content hashes");
    }

    pub fn accept(&mut self, raw: RawChange) -> Option<ChangeEvent> {
        let rel = PathBuf::from(relative_str(&self.root, &raw.path)?);
        let matching = self.graph.matching_tasks(&rel);
        if matching.is_empty() {
            trace!(path = ?rel, "no task matches; ignoring");
            return None;
        }

        match raw.kind {
            ChangeKind::Deleted => self.hashes.invalidate(&raw.path),
            ChangeKind::Modified if matching.iter().all(|t| t.use_hash) => {
                if self.hashes.is_unchanged(self.fs.as_ref(), &raw.path) {
                    debug!(path = ?rel, "contents unchanged; ignoring");
                    return None;
                }
            }
            ChangeKind::Created | ChangeKind::Modified => {
                if matching.iter().any(|t| t.use_hash) {
                    // Keep the cache current for later comparisons.
                    let _ = self.hashes.is_unchanged(self.fs.as_ref(), &raw.path);
                }
            }
        }

        Some(ChangeEvent::new(rel, raw.kind))
    }
}

#[derive(Debug, Default)]
struct Mailbox {
    pending: Mutex<ChangeBatch>,
    closed: AtomicBool,
    notify: Notify,
}

impl Mailbox {
    fn take(&self) -> ChangeBatch {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *pending)
    }
}

/// Producer half of a batch mailbox.
///
/// Delivering never blocks: a batch the consumer has not picked up yet is
/// merged with the newly delivered one.
#[derive(Debug)]
pub struct BatchSender {
    inner: Arc<Mailbox>,
}

/// Consumer half of a batch mailbox.
#[derive(Debug)]
pub struct BatchReceiver {
    inner: Arc<Mailbox>,
}

pub fn batch_channel() -> (BatchSender, BatchReceiver) {
    let inner = Arc::new(Mailbox::default());
    (
        BatchSender {
            inner: inner.clone(),
        },
        BatchReceiver { inner },
    )
}

impl BatchSender {
    pub fn deliver(&self, batch: ChangeBatch) {
        if batch.is_empty() {
            return;
        }
        {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|p| p.into_inner());
            pending.merge(batch);
        }
        self.inner.notify.notify_one();
    }
}

impl Drop for BatchSender {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }
}

impl BatchReceiver {
    /// Wait for the next non-empty batch. Returns `None` once the sender is
    /// gone and nothing is left.
    pub async fn recv(&mut self) -> Option<ChangeBatch> {
        loop {
            let batch = self.inner.take();
            if !batch.is_empty() {
                return Some(batch);
            }
            if self.inner.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Take whatever is pending without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeBatch> {
        let batch = self.inner.take();
        (!batch.is_empty()).then_some(batch)
    }
}

/// Coalesce raw changes over fixed windows and deliver each closed window.
///
/// A window opens with the first accepted change and closes `window` later,
/// regardless of further activity. Runs until `cancel` fires or the raw
/// channel closes.
pub async fn run_debounce_loop(
    mut raw_rx: mpsc::UnboundedReceiver<RawChange>,
    sender: BatchSender,
    mut filter: ChangeFilter,
    window: Duration,
    cancel: CancellationToken,
) {
    let mut current = ChangeBatch::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("change dispatcher cancelled");
                break;
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                let batch = std::mem::take(&mut current);
                if !batch.is_empty() {
                    debug!(paths = ?batch.paths(), "delivering change batch");
                    sender.deliver(batch);
                }
            }

            raw = raw_rx.recv() => {
                let Some(raw) = raw else {
                    debug!("raw change channel closed");
                    break;
                };
                if let Some(event) = filter.accept(raw) {
                    trace!(path = ?event.path, kind = %event.kind, "accepted change");
                    current.push(event);
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + window);
                    }
                }
            }
        }
    }
}

/// Live subscription. Dropping it (or calling [`stop`](Self::stop)) ends
/// the watch.
pub struct ChangeDispatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

impl ChangeDispatcher {
    /// Subscribe to every watch root of `graph` under `root`.
    ///
    /// Fails with a watch error if a root is missing or cannot be watched.
    pub fn spawn(
        root: &Path,
        graph: Arc<TaskGraph>,
        fs: Arc<dyn FileSystem>,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> Result<(Self, BatchReceiver)> {
        // Canonicalize once so we have a stable base path.
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        let roots: Vec<PathBuf> = graph
            .watch_roots()
            .into_iter()
            .map(|r| if r == Path::new(".") { root.clone() } else { root.join(r) })
            .collect();

        for dir in &roots {
            if !dir.is_dir() {
                return Err(AssetdagError::WatchError(format!(
                    "watch root {:?} does not exist or is not a directory",
                    dir
                )));
            }
        }

        // Channel from the blocking notify callback into the async world.
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawChange>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in classify_event(&event) {
                        if raw_tx.send(change).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => warn!(error = %err, "file watch error"),
            },
            Config::default(),
        )?;

        for dir in &roots {
            watcher.watch(dir, RecursiveMode::Recursive).map_err(|err| {
                AssetdagError::WatchError(format!("cannot watch {:?}: {err}", dir))
            })?;
            info!(root = ?dir, "watching");
        }

        let mut filter = ChangeFilter::new(root.clone(), graph, fs);
        filter.seed_hashes();

        let (sender, receiver) = batch_channel();
        let task = tokio::spawn(run_debounce_loop(
            raw_rx,
            sender,
            filter,
            debounce,
            cancel.clone(),
        ));

        Ok((
            Self {
                _watcher: watcher,
                roots,
                cancel,
                task,
            },
            receiver,
        ))
    }

    /// Absolute directories being watched.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Cancel the subscription and wait for the debounce loop to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        let Self { _watcher, task, .. } = self;
        drop(_watcher);
        if let Err(err) = task.await {
            warn!(error = %err, "change dispatcher task ended abnormally");
        }
        info!("file watcher stopped");
    }
}
