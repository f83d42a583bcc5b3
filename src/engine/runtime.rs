// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::build::{BuildEngine, BuildRun};
use crate::errors::Result;
use crate::reload::ReloadNotifier;
use crate::watch::{BatchReceiver, ChangeBatch, ChangeDispatcher};

use super::core::OrchestratorCore;
use super::{CoreCommand, OrchestratorEvent, SessionSummary};

/// Drives the orchestrator core in response to events, and delegates the
/// actual work to the build engine, the change dispatcher and the reload
/// notifier.
///
/// This is a pure IO shell around [`OrchestratorCore`], which contains all
/// the orchestration semantics.
pub struct Orchestrator {
    core: OrchestratorCore,
    engine: Arc<BuildEngine>,
    notifier: Option<ReloadNotifier>,
    dispatcher: Option<ChangeDispatcher>,
    changes: Option<BatchReceiver>,
    event_tx: mpsc::Sender<OrchestratorEvent>,
    event_rx: mpsc::Receiver<OrchestratorEvent>,
    shutdown: CancellationToken,
    run_cancel: Option<CancellationToken>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("core", &self.core)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(core: OrchestratorCore, engine: Arc<BuildEngine>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        Self {
            core,
            engine,
            notifier: None,
            dispatcher: None,
            changes: None,
            event_tx,
            event_rx,
            shutdown: CancellationToken::new(),
            run_cancel: None,
        }
    }

    pub fn with_notifier(mut self, notifier: ReloadNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Live file-system subscription and its batches.
    pub fn with_dispatcher(mut self, dispatcher: ChangeDispatcher, changes: BatchReceiver) -> Self {
        self.dispatcher = Some(dispatcher);
        self.changes = Some(changes);
        self
    }

    /// A change source without a subscription behind it.
    pub fn with_change_source(mut self, changes: BatchReceiver) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Sender for injecting events (build requests, shutdown).
    pub fn sender(&self) -> mpsc::Sender<OrchestratorEvent> {
        self.event_tx.clone()
    }

    /// Cancelling this token is equivalent to sending `ShutdownRequested`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Main event loop.
    ///
    /// - Consumes events from the channel, the shutdown token and (when the
    ///   core accepts them) the change source.
    /// - Feeds them into the core.
    /// - Executes the commands returned by the core.
    pub async fn run(mut self) -> Result<SessionSummary> {
        info!(mode = ?self.core.mode(), "assetdag orchestrator started");
        let mut shutdown_seen = false;

        loop {
            let accepts_changes = self.core.accepts_changes() && self.changes.is_some();

            let next = tokio::select! {
                biased;

                _ = self.shutdown.cancelled(), if !shutdown_seen => {
                    shutdown_seen = true;
                    Next::Event(OrchestratorEvent::ShutdownRequested)
                }

                event = self.event_rx.recv() => match event {
                    Some(event) => Next::Event(event),
                    None => Next::EventsClosed,
                },

                batch = next_batch(&mut self.changes), if accepts_changes => match batch {
                    Some(batch) => Next::Event(OrchestratorEvent::ChangesObserved(batch)),
                    None => Next::ChangesClosed,
                },
            };

            let event = match next {
                Next::Event(event) => event,
                Next::EventsClosed => {
                    info!("event channel closed; exiting");
                    break;
                }
                Next::ChangesClosed => {
                    warn!("change source closed; no further rebuilds");
                    self.changes = None;
                    continue;
                }
            };

            debug!(event = %describe(&event), "orchestrator received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await;
            }

            if !step.keep_running {
                info!("core requested exit; stopping orchestrator");
                break;
            }
        }

        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.stop().await;
        }

        let summary = self.core.summary().clone();
        info!(
            runs = summary.runs,
            failed_runs = summary.failed_runs,
            "orchestrator exiting"
        );
        Ok(summary)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::StartRun(plan) => {
                let cancel = CancellationToken::new();
                self.run_cancel = Some(cancel.clone());

                let engine = self.engine.clone();
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let run = engine.run(plan, cancel).await;
                    if tx.send(OrchestratorEvent::RunFinished(run)).await.is_err() {
                        debug!("orchestrator gone before run finished");
                    }
                });
            }
            CoreCommand::NotifyReload(run) => self.notify(run).await,
            CoreCommand::CancelRun => {
                if let Some(cancel) = self.run_cancel.take() {
                    info!("cancelling in-flight build run");
                    cancel.cancel();
                }
            }
            CoreCommand::StopWatching => {
                self.changes = None;
                if let Some(dispatcher) = self.dispatcher.take() {
                    dispatcher.stop().await;
                }
            }
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
            }
        }
    }

    /// Broadcast on a blocking thread; sessions write to sockets.
    async fn notify(&self, run: BuildRun) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let graph = self.engine.graph().clone();
        let sent = tokio::task::spawn_blocking(move || notifier.notify(&graph, &run)).await;
        if let Err(err) = sent {
            warn!(error = %err, "reload broadcast panicked");
        }
    }
}

enum Next {
    Event(OrchestratorEvent),
    EventsClosed,
    ChangesClosed,
}

async fn next_batch(changes: &mut Option<BatchReceiver>) -> Option<ChangeBatch> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn describe(event: &OrchestratorEvent) -> String {
    match event {
        OrchestratorEvent::BuildRequested(req) => format!("BuildRequested({req:?})"),
        OrchestratorEvent::ChangesObserved(batch) => {
            format!("ChangesObserved({} paths)", batch.len())
        }
        OrchestratorEvent::RunFinished(run) => format!("RunFinished(#{})", run.id),
        OrchestratorEvent::ShutdownRequested => "ShutdownRequested".to_string(),
    }
}
