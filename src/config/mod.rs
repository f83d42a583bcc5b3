// src/config/mod.rs

//! Configuration loading and validation for assetdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate structural invariants (`validate.rs`). Graph-level invariants
//!   (cycles, duplicate names, overlapping destinations) are checked when the
//!   [`TaskGraph`](crate::dag::TaskGraph) is built from the config.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, ConfigSection, DefaultSection, RawConfigFile, ReloadSection, ServeSection,
    TaskConfig,
};
