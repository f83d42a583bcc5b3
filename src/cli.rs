// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `assetdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetdag",
    version,
    about = "Incremental, dependency-aware asset builds with live reload.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `assetdag.toml` in the current working directory.
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        default_value_os_t = default_config_path()
    )]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETDAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build every task once and exit.
    ///
    /// Exit status is 0 only if every planned task succeeded.
    Build(BuildArgs),

    /// Build, then rebuild affected tasks whenever sources change.
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Remove the `[config].clean` paths before building.
    #[arg(long)]
    pub clean: bool,

    /// Parse + validate, print the build order, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[config].concurrency`.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct WatchArgs {
    /// Do not start the live-reload server.
    #[arg(long)]
    pub no_reload: bool,

    /// Override `[reload].port`.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Do not serve the output directory over HTTP.
    #[arg(long)]
    pub no_serve: bool,

    /// Override `[serve].port`.
    #[arg(long, value_name = "PORT")]
    pub serve_port: Option<u16>,

    /// Override `[config].concurrency`.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
