// src/build/mod.rs

//! Build execution.
//!
//! - [`scheduler`] is the pure per-run state machine.
//! - [`engine`] drives processors under a concurrency cap.
//! - [`run`] holds build run records and the run history.
//! - [`last_run`] stores each task's last successful completion.

pub mod engine;
pub mod last_run;
pub mod run;
pub mod scheduler;

pub use engine::BuildEngine;
pub use last_run::{FileLastRunStore, LastRunStore, MemoryLastRunStore};
pub use run::{BuildRun, RunHistory, RunPlan, RunTrigger, TaskFailure};
pub use scheduler::{RunScheduler, RunStep, TaskRunState};
