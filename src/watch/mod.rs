// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Subscribing to the static roots of every task's source patterns
//!   (`notify`, one recursive watch per root).
//! - Coalescing bursts of raw events into debounced [`ChangeBatch`]es.
//! - Discarding paths no task matches and, for `use_hash` tasks, saves
//!   that did not change the file contents.
//!
//! It does **not** decide what to build; the orchestrator resolves each
//! batch against the task graph.

pub mod changes;
pub mod dispatcher;
pub mod hash;

pub use changes::{ChangeBatch, ChangeEvent, ChangeKind, coalesce};
pub use dispatcher::{
    BatchReceiver, BatchSender, ChangeDispatcher, ChangeFilter, RawChange, batch_channel,
    classify_event, run_debounce_loop,
};
pub use hash::{FileCache, compute_file_hash};
