// src/dag/task.rs

//! Static task definition.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dag::patterns::SourcePatterns;
use crate::engine::TaskName;
use crate::path_utils::normalize_lexically;
use crate::processor::Processor;
use crate::types::{AssetClass, DestinationKind};

/// Output location of a task, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Dir(PathBuf),
    File(PathBuf),
}

impl Destination {
    pub fn new(path: impl AsRef<Path>, kind: DestinationKind) -> Self {
        let path = normalize_lexically(path.as_ref());
        match kind {
            DestinationKind::Dir => Destination::Dir(path),
            DestinationKind::File => Destination::File(path),
            DestinationKind::Auto => {
                if path.extension().is_some() {
                    Destination::File(path)
                } else {
                    Destination::Dir(path)
                }
            }
        }
    }

    pub fn dir(path: impl AsRef<Path>) -> Self {
        Self::new(path, DestinationKind::Dir)
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(path, DestinationKind::File)
    }

    /// The normalised destination path.
    pub fn path(&self) -> &Path {
        match self {
            Destination::Dir(p) | Destination::File(p) => p,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Destination::File(_))
    }

    /// Absolute location under `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(self.path())
    }

    /// Whether two destinations would be written by the same path.
    pub fn overlaps(&self, other: &Destination) -> bool {
        self.path() == other.path()
    }
}

/// A named, pattern-scoped build step with declared dependencies.
#[derive(Clone)]
pub struct Task {
    pub name: TaskName,
    pub class: AssetClass,
    pub sources: SourcePatterns,
    pub destination: Destination,
    /// Direct dependencies (`after = [...]`).
    pub depends_on: Vec<TaskName>,
    pub processor_name: String,
    pub processor: Arc<dyn Processor>,
    pub options: toml::Table,
    /// Pass `lastRun` to the processor as a "since" hint.
    pub incremental: bool,
    /// Ignore change events that leave file contents untouched.
    pub use_hash: bool,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("sources", &self.sources)
            .field("destination", &self.destination)
            .field("depends_on", &self.depends_on)
            .field("processor", &self.processor_name)
            .field("incremental", &self.incremental)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new(
        name: impl Into<TaskName>,
        class: AssetClass,
        sources: SourcePatterns,
        destination: Destination,
        processor_name: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        Self {
            name: name.into(),
            class,
            sources,
            destination,
            depends_on: Vec::new(),
            processor_name: processor_name.into(),
            processor,
            options: toml::Table::new(),
            incremental: false,
            use_hash: false,
        }
    }

    pub fn after(mut self, dep: impl Into<TaskName>) -> Self {
        let dep = dep.into();
        if !self.depends_on.contains(&dep) {
            self.depends_on.push(dep);
        }
        self
    }

    pub fn with_options(mut self, options: toml::Table) -> Self {
        self.options = options;
        self
    }

    pub fn incremental(mut self, val: bool) -> Self {
        self.incremental = val;
        self
    }

    pub fn use_hash(mut self, val: bool) -> Self {
        self.use_hash = val;
        self
    }
}
