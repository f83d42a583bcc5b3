// src/dag/mod.rs

//! Static task graph.
//!
//! - [`task`] defines a single task and its destination.
//! - [`patterns`] compiles a task's include/exclude globs.
//! - [`graph`] builds the validated, immutable [`TaskGraph`] and answers
//!   "which tasks must run for these changes" queries.

pub mod graph;
pub mod patterns;
pub mod task;

pub use graph::{TaskGraph, TaskGraphBuilder};
pub use patterns::{SourcePatterns, collect_matching_files};
pub use task::{Destination, Task};
