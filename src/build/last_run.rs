// src/build/last_run.rs

//! Storage for each task's last successful completion time.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::engine::TaskName;
use crate::fs::FileSystem;

/// Relative path (from the project root) to the last-run file.
pub const LAST_RUN_FILE_PATH: &str = ".assetdag/last-run.json";

/// Abstract storage for `lastRun` markers.
pub trait LastRunStore: Send + Sync + Debug {
    fn load(&self, task: &str) -> Option<DateTime<Utc>>;
    fn save(&mut self, task: &str, at: DateTime<Utc>) -> Result<()>;

    /// Stamp several tasks with the same time.
    fn save_all(&mut self, tasks: &[TaskName], at: DateTime<Utc>) -> Result<()> {
        for task in tasks {
            self.save(task, at)?;
        }
        Ok(())
    }

    /// Remove markers for tasks that are not in `active_tasks`.
    fn prune(&mut self, active_tasks: &[&str]) -> Result<()>;
}

/// Keeps markers for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryLastRunStore {
    map: HashMap<TaskName, DateTime<Utc>>,
}

impl MemoryLastRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LastRunStore for MemoryLastRunStore {
    fn load(&self, task: &str) -> Option<DateTime<Utc>> {
        self.map.get(task).copied()
    }

    fn save(&mut self, task: &str, at: DateTime<Utc>) -> Result<()> {
        self.map.insert(task.to_string(), at);
        debug!(task = %task, at = %at, "stored lastRun (memory)");
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<()> {
        let initial_len = self.map.len();
        self.map.retain(|k, _| active_tasks.contains(&k.as_str()));
        if self.map.len() < initial_len {
            info!(
                removed = initial_len - self.map.len(),
                "pruned stale lastRun markers (memory)"
            );
        }
        Ok(())
    }
}

/// Persists markers as a JSON object in `<root>/.assetdag/last-run.json`.
///
/// The file is advisory. An unreadable or corrupt file is treated as empty,
/// which only means incremental tasks redo all their work once.
#[derive(Debug)]
pub struct FileLastRunStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    map: BTreeMap<TaskName, DateTime<Utc>>,
}

impl FileLastRunStore {
    pub fn open(root: &Path, fs: Arc<dyn FileSystem>) -> Self {
        let path = root.join(LAST_RUN_FILE_PATH);
        let map = match load_markers(fs.as_ref(), &path) {
            Ok(map) => map,
            Err(err) => {
                warn!(path = ?path, error = %err, "ignoring unreadable last-run file");
                BTreeMap::new()
            }
        };
        debug!(path = ?path, tasks = map.len(), "opened last-run store");
        Self { path, fs, map }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.map).context("serialising lastRun markers")?;
        self.fs
            .write_atomic(&self.path, &json)
            .with_context(|| format!("writing last-run file {:?}", self.path))
    }
}

impl LastRunStore for FileLastRunStore {
    fn load(&self, task: &str) -> Option<DateTime<Utc>> {
        self.map.get(task).copied()
    }

    fn save(&mut self, task: &str, at: DateTime<Utc>) -> Result<()> {
        self.map.insert(task.to_string(), at);
        self.persist()?;
        debug!(task = %task, at = %at, "stored lastRun (file)");
        Ok(())
    }

    fn save_all(&mut self, tasks: &[TaskName], at: DateTime<Utc>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        for task in tasks {
            self.map.insert(task.clone(), at);
        }
        self.persist()?;
        debug!(tasks = tasks.len(), at = %at, "stored lastRun (file)");
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<()> {
        let initial_len = self.map.len();
        self.map.retain(|k, _| active_tasks.contains(&k.as_str()));
        if self.map.len() < initial_len {
            self.persist()?;
            info!(
                removed = initial_len - self.map.len(),
                "pruned stale lastRun markers (file)"
            );
        }
        Ok(())
    }
}

fn load_markers(fs: &dyn FileSystem, path: &Path) -> Result<BTreeMap<TaskName, DateTime<Utc>>> {
    if !fs.exists(path) {
        return Ok(BTreeMap::new());
    }
    let contents = fs.read_to_string(path)?;
    serde_json::from_str(&contents).with_context(|| format!("parsing last-run file {:?}", path))
}
