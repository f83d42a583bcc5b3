use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AssetdagError, Result};

/// Accepted range for `[config].debounce_ms`.
pub const DEBOUNCE_MS_RANGE: std::ops::RangeInclusive<u64> = 10..=5000;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AssetdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.config,
            raw.default,
            raw.reload,
            raw.serve,
            raw.task,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_fields(cfg)?;
    validate_task_dependencies(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(AssetdagError::ConfigError(
            "config must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.concurrency == 0 {
        return Err(AssetdagError::ConfigError(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if !DEBOUNCE_MS_RANGE.contains(&cfg.config.debounce_ms) {
        return Err(AssetdagError::ConfigError(format!(
            "[config].debounce_ms must be between {} and {} (got {})",
            DEBOUNCE_MS_RANGE.start(),
            DEBOUNCE_MS_RANGE.end(),
            cfg.config.debounce_ms
        )));
    }

    if cfg.serve.dir.as_os_str().is_empty() {
        return Err(AssetdagError::ConfigError("[serve].dir must not be empty".to_string()));
    }

    if cfg.config.history_len == 0 {
        return Err(AssetdagError::ConfigError(
            "[config].history_len must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_task_fields(cfg: &RawConfigFile) -> Result<()> {
    for task in cfg.task.iter() {
        if task.name.trim().is_empty() {
            return Err(AssetdagError::ConfigError(
                "every [[task]] needs a non-empty `name`".to_string(),
            ));
        }
        if task.sources.is_empty() {
            return Err(AssetdagError::ConfigError(format!(
                "task '{}' must declare at least one entry in `sources`",
                task.name
            )));
        }
        if task.destination.as_os_str().is_empty() {
            return Err(AssetdagError::ConfigError(format!(
                "task '{}' has an empty `destination`",
                task.name
            )));
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    let names: HashSet<&str> = cfg.task.iter().map(|t| t.name.as_str()).collect();

    for task in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == &task.name {
                return Err(AssetdagError::Cycle {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                });
            }
            if !names.contains(dep.as_str()) {
                return Err(AssetdagError::UnknownDependency {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}
