#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use assetdag::config::{
    ConfigFile, ConfigSection, DefaultSection, RawConfigFile, ReloadSection, ServeSection,
    TaskConfig,
};
use assetdag::dag::{Destination, SourcePatterns, Task, TaskGraph};
use assetdag::errors::Result;
use assetdag::processor::Processor;
use assetdag::types::{AssetClass, DestinationKind};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                reload: ReloadSection::default(),
                serve: ServeSection::default(),
                task: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.config.task.push(task);
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.config.config.concurrency = n;
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.config.config.debounce_ms = ms;
        self
    }

    pub fn with_default_exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn with_default_use_hash(mut self, val: bool) -> Self {
        self.config.default.use_hash = Some(val);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(name: &str, class: AssetClass, processor: &str) -> Self {
        Self {
            task: TaskConfig {
                name: name.to_string(),
                class,
                processor: processor.to_string(),
                sources: Vec::new(),
                exclude: None,
                append_default_exclude: false,
                destination: PathBuf::from(format!("public/{name}")),
                destination_kind: DestinationKind::Auto,
                after: Vec::new(),
                incremental: false,
                use_hash: None,
                options: toml::Table::new(),
            },
        }
    }

    pub fn source(mut self, pattern: &str) -> Self {
        self.task.sources.push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.task
            .exclude
            .get_or_insert_with(Vec::new)
            .push(pattern.to_string());
        self
    }

    pub fn append_default_exclude(mut self, val: bool) -> Self {
        self.task.append_default_exclude = val;
        self
    }

    pub fn destination(mut self, path: &str) -> Self {
        self.task.destination = PathBuf::from(path);
        self
    }

    pub fn destination_kind(mut self, kind: DestinationKind) -> Self {
        self.task.destination_kind = kind;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn incremental(mut self, val: bool) -> Self {
        self.task.incremental = val;
        self
    }

    pub fn use_hash(mut self, val: bool) -> Self {
        self.task.use_hash = Some(val);
        self
    }

    pub fn option(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.task.options.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// A task with default options built straight from patterns.
pub fn task(
    name: &str,
    class: AssetClass,
    sources: &[&str],
    destination: &str,
    after: &[&str],
    processor: Arc<dyn Processor>,
) -> Task {
    let include: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
    let patterns =
        SourcePatterns::compile(name, &include, &[]).expect("test patterns must compile");
    let mut task = Task::new(
        name,
        class,
        patterns,
        Destination::new(destination, DestinationKind::Auto),
        "fake",
        processor,
    );
    for dep in after {
        task = task.after(*dep);
    }
    task
}

/// Build a graph from tasks in declaration order.
pub fn graph(tasks: Vec<Task>) -> TaskGraph {
    let mut builder = TaskGraph::builder();
    for t in tasks {
        builder.add_task(t).expect("test task must be accepted");
    }
    builder.build().expect("test graph must build")
}
