// src/lib.rs

pub mod build;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod path_utils;
pub mod processor;
pub mod reload;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::build::{BuildEngine, FileLastRunStore, LastRunStore, MemoryLastRunStore};
use crate::cli::{BuildArgs, CliArgs, Command, WatchArgs};
use crate::config::{ConfigFile, load_and_validate};
use crate::dag::TaskGraph;
use crate::errors::error_chain;
use crate::engine::{
    BuildRequest, Mode, Orchestrator, OrchestratorCore, OrchestratorEvent, SessionSummary,
};
use crate::fs::{FileSystem, RealFileSystem};
use crate::processor::{DataProvider, EmptyDataProvider, JsonDirDataProvider, ProcessorRegistry};
use crate::reload::{PreviewServer, ReloadNotifier, ReloadServer};
use crate::types::LastRunStorage;
use crate::watch::ChangeDispatcher;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and task graph construction
/// - the build engine
/// - (watch mode) the change dispatcher, the reload server and the preview
///   server
/// - the orchestrator and Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<SessionSummary> {
    let cfg = load_and_validate(&args.config)?;
    let root = cfg.project_root(&config_root_dir(&args.config));

    let registry = ProcessorRegistry::with_builtins();
    let graph = Arc::new(TaskGraph::from_config(&cfg, &registry)?);
    info!(tasks = graph.len(), root = ?root, "task graph loaded");

    match args.command {
        Command::Build(build) => run_build(&cfg, graph, root, build).await,
        Command::Watch(watch) => run_watch(&cfg, graph, root, watch).await,
    }
}

async fn run_build(
    cfg: &ConfigFile,
    graph: Arc<TaskGraph>,
    root: PathBuf,
    args: BuildArgs,
) -> Result<SessionSummary> {
    if args.dry_run {
        print_dry_run(&graph, &root);
        return Ok(SessionSummary::default());
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let engine = build_engine(cfg, graph.clone(), &root, fs, args.concurrency);

    if args.clean {
        engine.clean(&cfg.config.clean)?;
    }

    let engine = Arc::new(engine);
    let orchestrator = Orchestrator::new(OrchestratorCore::new(graph, Mode::Once), engine.clone());
    let summary = run_session(orchestrator).await?;

    if let Some(run) = engine.history().latest() {
        for failure in &run.tasks_failed {
            error!("{}", error_chain(&failure.to_error()));
        }
    }
    Ok(summary)
}

async fn run_watch(
    cfg: &ConfigFile,
    graph: Arc<TaskGraph>,
    root: PathBuf,
    args: WatchArgs,
) -> Result<SessionSummary> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let engine = build_engine(cfg, graph.clone(), &root, fs.clone(), args.concurrency);

    let mut orchestrator =
        Orchestrator::new(OrchestratorCore::new(graph.clone(), Mode::Watch), Arc::new(engine));

    // Keep the server alive for the whole session.
    let mut reload_server = None;
    if cfg.reload.enabled && !args.no_reload {
        let notifier = ReloadNotifier::new();
        let port = args.port.unwrap_or(cfg.reload.port);
        let server = ReloadServer::bind(&cfg.reload.host, port, notifier.clone())?;
        info!(addr = %server.local_addr(), "live reload enabled");
        reload_server = Some(server);
        orchestrator = orchestrator.with_notifier(notifier);
    }

    let mut preview = None;
    if cfg.serve.enabled && !args.no_serve {
        let script = reload_server
            .as_ref()
            .filter(|_| cfg.serve.inject_reload)
            .map(ReloadServer::client_script);
        let port = args.serve_port.unwrap_or(cfg.serve.port);
        let server =
            PreviewServer::start(&cfg.serve.host, port, root.join(&cfg.serve.dir), script).await?;
        preview = Some(server);
    } else if let Some(server) = &reload_server {
        info!("add this to your pages for live reload:\n{}", server.client_script());
    }

    let debounce = Duration::from_millis(cfg.config.debounce_ms);
    let (dispatcher, changes) = ChangeDispatcher::spawn(
        &root,
        graph,
        fs,
        debounce,
        orchestrator.shutdown_token().child_token(),
    )?;
    orchestrator = orchestrator.with_dispatcher(dispatcher, changes);

    let summary = run_session(orchestrator).await;

    if let Some(server) = preview {
        server.shutdown().await;
    }
    if let Some(server) = reload_server {
        if let Err(err) = tokio::task::spawn_blocking(move || server.shutdown()).await {
            warn!(error = %err, "reload server shutdown panicked");
        }
    }
    summary
}

/// Seed the initial full build, hook up Ctrl-C and drive the orchestrator.
async fn run_session(orchestrator: Orchestrator) -> Result<SessionSummary> {
    orchestrator
        .sender()
        .send(OrchestratorEvent::BuildRequested(BuildRequest::Full))
        .await?;

    // Ctrl-C → graceful shutdown.
    {
        let shutdown = orchestrator.shutdown_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            shutdown.cancel();
        });
    }

    Ok(orchestrator.run().await?)
}

/// Construct the build engine from `[config]`.
pub fn build_engine(
    cfg: &ConfigFile,
    graph: Arc<TaskGraph>,
    root: &Path,
    fs: Arc<dyn FileSystem>,
    concurrency: Option<usize>,
) -> BuildEngine {
    let store: Box<dyn LastRunStore> = match cfg.config.last_run_storage {
        LastRunStorage::File => Box::new(FileLastRunStore::open(root, fs.clone())),
        LastRunStorage::Memory => Box::new(MemoryLastRunStore::new()),
    };

    let data: Arc<dyn DataProvider> = match &cfg.config.data_dir {
        Some(dir) => Arc::new(JsonDirDataProvider::new(root.join(dir), fs.clone())),
        None => Arc::new(EmptyDataProvider),
    };

    let engine = BuildEngine::new(graph, root, fs)
        .with_concurrency(concurrency.unwrap_or(cfg.config.concurrency))
        .with_last_run_store(store)
        .with_data_provider(data)
        .with_history_len(cfg.config.history_len);
    engine.prune_last_run();
    engine
}

/// Figure out the directory the config's relative paths are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "site/assetdag.toml"),
///   we use that directory.
/// - If it's just a bare filename like "assetdag.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Simple dry-run output: tasks in build order, grouped by depth.
fn print_dry_run(graph: &TaskGraph, root: &Path) {
    println!("assetdag dry-run");
    println!("  root = {}", root.display());
    println!();

    for (depth, level) in graph.levels().iter().enumerate() {
        println!("level {depth}:");
        for task in level {
            println!("  - {} ({}, {})", task.name, task.class, task.processor_name);
            println!("      sources: {:?}", task.sources.include());
            if !task.sources.exclude().is_empty() {
                println!("      exclude: {:?}", task.sources.exclude());
            }
            println!("      destination: {}", task.destination.path().display());
            if !task.depends_on.is_empty() {
                println!("      after: {:?}", task.depends_on);
            }
            if task.incremental {
                println!("      incremental: true");
            }
            if task.use_hash {
                println!("      use_hash: true");
            }
        }
    }

    println!();
    println!("watch roots: {:?}", graph.watch_roots());
    debug!("dry-run complete (no execution)");
}
