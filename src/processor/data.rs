// src/processor/data.rs

//! Template data providers.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::fs::FileSystem;

/// Name → value mapping handed to every processor of a run.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Loads the data mapping. Called once at the start of every build run.
pub trait DataProvider: Send + Sync + Debug {
    fn load(&self) -> Result<DataMap>;
}

/// Provider used when no `data_dir` is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyDataProvider;

impl DataProvider for EmptyDataProvider {
    fn load(&self) -> Result<DataMap> {
        Ok(DataMap::new())
    }
}

/// Reads every `*.json` file of a directory; the file stem becomes the key.
///
/// `data/site.json` containing `{"title": "x"}` yields `{"site": {"title": "x"}}`.
/// Subdirectories and other extensions are ignored.
#[derive(Debug, Clone)]
pub struct JsonDirDataProvider {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl JsonDirDataProvider {
    pub fn new(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }
}

impl DataProvider for JsonDirDataProvider {
    fn load(&self) -> Result<DataMap> {
        let mut entries = self
            .fs
            .read_dir(&self.dir)
            .with_context(|| format!("reading data directory {:?}", self.dir))?;
        entries.sort();

        let mut data = DataMap::new();
        for path in entries {
            if !self.fs.is_file(&path) || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = self.fs.read_to_string(&path)?;
            let value: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("parsing data file {:?}", path))?;
            data.insert(stem.to_string(), value);
        }

        debug!(dir = ?self.dir, keys = data.len(), "loaded template data");
        Ok(data)
    }
}
