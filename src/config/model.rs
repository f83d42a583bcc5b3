use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::{AssetClass, DestinationKind, LastRunStorage};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// concurrency = 4
/// debounce_ms = 200
///
/// [default]
/// exclude = ["**/_*"]
///
/// [reload]
/// port = 35729
///
/// [serve]
/// dir = "public"
///
/// [[task]]
/// name = "styles"
/// class = "style"
/// processor = "concat"
/// sources = ["src/assets/sass/**/*.css"]
/// destination = "public/assets/css/common.css"
/// ```
///
/// Tasks are an array of tables so that declaration order survives
/// deserialisation; it is the tie-break for independent tasks.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub default: DefaultSection,

    #[serde(default)]
    pub reload: ReloadSection,

    #[serde(default)]
    pub serve: ServeSection,

    #[serde(default)]
    pub task: Vec<TaskConfig>,
}

/// A validated configuration. Obtain one through
/// [`load_and_validate`](crate::config::load_and_validate) or
/// `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub reload: ReloadSection,
    pub serve: ServeSection,
    pub task: Vec<TaskConfig>,
}

impl ConfigFile {
    /// Assemble a config without validating it. Only the validation layer
    /// should call this.
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        default: DefaultSection,
        reload: ReloadSection,
        serve: ServeSection,
        task: Vec<TaskConfig>,
    ) -> Self {
        Self {
            config,
            default,
            reload,
            serve,
            task,
        }
    }

    pub fn default_section(&self) -> &DefaultSection {
        &self.default
    }

    pub fn tasks(&self) -> &[TaskConfig] {
        &self.task
    }

    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.task.iter().find(|t| t.name == name)
    }

    /// Project root: `[config].root` resolved against the directory that
    /// holds the config file.
    pub fn project_root(&self, config_dir: &Path) -> PathBuf {
        match &self.config.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => config_dir.join(root),
            None => config_dir.to_path_buf(),
        }
    }
}

/// `[config]` section: engine-wide behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Project root relative to the config file. All source patterns and
    /// destinations are relative to it.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Maximum number of processors running at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Debounce window for file-system events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub last_run_storage: LastRunStorage,

    /// Directory of `*.json` files exposed to processors as template data.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Output paths removed by `build --clean` before a full build.
    #[serde(default)]
    pub clean: Vec<PathBuf>,

    /// How many finished build runs to keep for diagnostics.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

fn default_concurrency() -> usize {
    4
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_history_len() -> usize {
    16
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            root: None,
            concurrency: default_concurrency(),
            debounce_ms: default_debounce_ms(),
            last_run_storage: LastRunStorage::default(),
            data_dir: None,
            clean: Vec::new(),
            history_len: default_history_len(),
        }
    }
}

/// `[default]` section: values tasks inherit unless they override them.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Default `exclude` patterns applied to tasks that do not override them.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Default `use_hash` behaviour; if `None`, the global default is `false`.
    #[serde(default)]
    pub use_hash: Option<bool>,
}

/// `[reload]` section: live-preview transport.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadSection {
    #[serde(default = "default_reload_enabled")]
    pub enabled: bool,

    #[serde(default = "default_reload_host")]
    pub host: String,

    /// Port for the WebSocket server. `0` picks a free port.
    #[serde(default = "default_reload_port")]
    pub port: u16,
}

fn default_reload_enabled() -> bool {
    true
}

fn default_reload_host() -> String {
    "127.0.0.1".to_string()
}

fn default_reload_port() -> u16 {
    35729
}

impl Default for ReloadSection {
    fn default() -> Self {
        Self {
            enabled: default_reload_enabled(),
            host: default_reload_host(),
            port: default_reload_port(),
        }
    }
}

/// `[serve]` section: static preview server for the output tree (watch mode).
#[derive(Debug, Clone, Deserialize)]
pub struct ServeSection {
    #[serde(default = "default_serve_enabled")]
    pub enabled: bool,

    #[serde(default = "default_reload_host")]
    pub host: String,

    /// `0` picks a free port.
    #[serde(default = "default_serve_port")]
    pub port: u16,

    /// Directory to serve, relative to the project root.
    #[serde(default = "default_serve_dir")]
    pub dir: PathBuf,

    /// Add the live-reload client script to every served HTML page.
    #[serde(default = "default_serve_inject")]
    pub inject_reload: bool,
}

fn default_serve_enabled() -> bool {
    true
}

fn default_serve_port() -> u16 {
    8080
}

fn default_serve_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_serve_inject() -> bool {
    true
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            enabled: default_serve_enabled(),
            host: default_reload_host(),
            port: default_serve_port(),
            dir: default_serve_dir(),
            inject_reload: default_serve_inject(),
        }
    }
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    /// Asset class produced by this task.
    pub class: AssetClass,

    /// Registered processor name (`copy`, `concat`, `command`, ...).
    pub processor: String,

    /// Include globs, relative to the project root.
    pub sources: Vec<String>,

    /// Optional task-local exclude globs. If `None`, `default.exclude` applies.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// If true, `default.exclude` is appended to `exclude`.
    #[serde(default)]
    pub append_default_exclude: bool,

    /// Output file or directory, relative to the project root.
    pub destination: PathBuf,

    #[serde(default)]
    pub destination_kind: DestinationKind,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Hand the task's `lastRun` to the processor as a "since" hint.
    #[serde(default)]
    pub incremental: bool,

    /// Drop change events whose file contents did not change. Falls back to
    /// `default.use_hash`.
    #[serde(default)]
    pub use_hash: Option<bool>,

    /// Opaque options passed to the processor.
    #[serde(default)]
    pub options: toml::Table,
}

impl TaskConfig {
    /// Effective `use_hash` given a default from `[default]`.
    pub fn effective_use_hash(&self, default_use_hash: bool) -> bool {
        self.use_hash.unwrap_or(default_use_hash)
    }

    /// Effective exclude patterns after applying the `[default]` section.
    pub fn effective_exclude(&self, defaults: &DefaultSection) -> Vec<String> {
        match (&self.exclude, self.append_default_exclude) {
            (Some(list), true) => {
                let mut combined = list.clone();
                combined.extend(defaults.exclude.iter().cloned());
                combined
            }
            (Some(list), false) => list.clone(),
            (None, _) => defaults.exclude.clone(),
        }
    }
}
