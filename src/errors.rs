// src/errors.rs

//! Crate-wide error types.
//!
//! - [`AssetdagError`] covers configuration, watch and IO failures. Every
//!   graph construction failure is a configuration error and is fatal before
//!   any build starts.
//! - [`ProcessorError`] is the failure of a single task's transformation. It
//!   is attached to that task in the build run and never aborts siblings.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::engine::TaskName;

#[derive(Error, Debug)]
pub enum AssetdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate task name: '{0}'")]
    DuplicateName(TaskName),

    #[error("Cycle detected in task graph: '{task}' cannot depend on '{dependency}'")]
    Cycle {
        task: TaskName,
        dependency: TaskName,
    },

    #[error("Tasks '{existing}' and '{task}' both write to {destination:?}")]
    OverlappingDestination {
        task: TaskName,
        existing: TaskName,
        destination: PathBuf,
    },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        task: TaskName,
        dependency: TaskName,
    },

    #[error("Task '{task}' has an invalid source pattern '{pattern}': {source}")]
    InvalidPattern {
        task: TaskName,
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Task '{task}' uses unknown processor '{processor}'")]
    UnknownProcessor { task: TaskName, processor: String },

    /// A task failed during a build run. The cause is shared with the
    /// run's [`TaskFailure`](crate::build::TaskFailure) record.
    #[error("Task '{task}' failed")]
    Processor {
        task: TaskName,
        #[source]
        source: Arc<ProcessorError>,
    },

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AssetdagError {
    /// Whether this error belongs to the configuration family (bad task
    /// graph or bad config values). These are always reported before any
    /// build starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AssetdagError::ConfigError(_)
                | AssetdagError::DuplicateName(_)
                | AssetdagError::Cycle { .. }
                | AssetdagError::OverlappingDestination { .. }
                | AssetdagError::UnknownDependency { .. }
                | AssetdagError::InvalidPattern { .. }
                | AssetdagError::UnknownProcessor { .. }
                | AssetdagError::TomlError(_)
        )
    }

    /// Whether this error came from the file-system subscription.
    pub fn is_watch(&self) -> bool {
        matches!(self, AssetdagError::WatchError(_) | AssetdagError::Notify(_))
    }
}

/// Failure of a single processor invocation.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// The processor ran and reported a failure (e.g. a compiler error).
    #[error("{0}")]
    Failed(String),

    /// The options table did not contain what the processor needs.
    #[error("invalid processor options: {0}")]
    InvalidOptions(String),

    /// The run was cancelled before the processor reached a point where it
    /// could write outputs.
    #[error("cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// `err` followed by its chain of causes, separated by `: `.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AssetdagError>;
