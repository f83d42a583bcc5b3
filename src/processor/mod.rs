// src/processor/mod.rs

//! Processor capability and the built-in implementations.
//!
//! A processor turns the source files of one task into output files. The
//! build engine only ever talks to the [`Processor`] trait, so the actual
//! tooling (template engines, bundlers, image optimisers) stays pluggable:
//!
//! - [`copy`] mirrors sources under a destination directory.
//! - [`concat`] joins sources into a single destination file.
//! - [`command`] shells out to an external tool.
//! - [`data`] loads the template data handed to every processor.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::dag::{Destination, SourcePatterns};
use crate::engine::TaskName;
use crate::errors::ProcessorError;
use crate::fs::FileSystem;

pub mod command;
pub mod concat;
pub mod copy;
pub mod data;

pub use command::CommandProcessor;
pub use concat::ConcatProcessor;
pub use copy::CopyProcessor;
pub use data::{DataMap, DataProvider, EmptyDataProvider, JsonDirDataProvider};

/// Everything a processor gets to see for one invocation.
#[derive(Clone)]
pub struct ProcessRequest {
    pub task: TaskName,
    pub run_id: u64,
    /// Project root; `destination` and `patterns` are relative to it.
    pub root: PathBuf,
    /// Absolute paths of every file currently matching the task's patterns,
    /// sorted.
    pub sources: Vec<PathBuf>,
    pub patterns: SourcePatterns,
    pub destination: Destination,
    pub options: toml::Table,
    /// Last successful completion of this task, for incremental tasks.
    pub since: Option<DateTime<Utc>>,
    pub data: Arc<DataMap>,
    pub cancel: CancellationToken,
    pub fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for ProcessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRequest")
            .field("task", &self.task)
            .field("run_id", &self.run_id)
            .field("sources", &self.sources.len())
            .field("destination", &self.destination)
            .field("since", &self.since)
            .finish_non_exhaustive()
    }
}

impl ProcessRequest {
    /// Absolute destination path.
    pub fn destination_path(&self) -> PathBuf {
        self.destination.resolve(&self.root)
    }

    /// `path` relative to the project root, or unchanged if it lies outside.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn check_cancelled(&self) -> Result<(), ProcessorError> {
        if self.cancel.is_cancelled() {
            Err(ProcessorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a successful invocation wrote, relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub produced: Vec<PathBuf>,
}

pub type ProcessFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProcessOutput, ProcessorError>> + Send + 'a>>;

/// A transformation of source files into output files.
///
/// Implementations must be idempotent and must not leave a partially
/// written destination behind on error. They may check `request.cancel`
/// between units of work but must not stop in the middle of a write.
pub trait Processor: Send + Sync {
    fn process(&self, request: ProcessRequest) -> ProcessFuture<'_>;
}

/// Maps processor names used in `[[task]].processor` to implementations.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.processors.keys().collect();
        names.sort();
        f.debug_struct("ProcessorRegistry")
            .field("processors", &names)
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `copy`, `concat` and `command`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("copy", Arc::new(CopyProcessor));
        registry.register("concat", Arc::new(ConcatProcessor));
        registry.register("command", Arc::new(CommandProcessor));
        registry
    }

    /// Register (or replace) a processor under `name`.
    pub fn register(&mut self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        self.processors.insert(name.into(), processor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }
}
