// src/watch/changes.rs

//! Change events and debounced change batches.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        })
    }
}

/// Combine two observations of the same path, `earlier` first.
///
/// Returns `None` when the two cancel out (a file created and deleted again
/// within the same batch never existed as far as the build is concerned).
pub fn coalesce(earlier: ChangeKind, later: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::*;
    match (earlier, later) {
        (Deleted, Created) => Some(Modified),
        (Created, Modified) => Some(Created),
        (Modified, Deleted) => Some(Deleted),
        (Created, Deleted) => None,
        (_, later) => Some(later),
    }
}

/// One observed change, with `path` relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Utc::now(),
        }
    }
}

/// Set of change events keyed by path; at most one event per path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    events: BTreeMap<PathBuf, ChangeEvent>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event, coalescing it with an earlier one for the same path.
    pub fn push(&mut self, event: ChangeEvent) {
        match self.events.remove(&event.path) {
            None => {
                self.events.insert(event.path.clone(), event);
            }
            Some(earlier) => {
                if let Some(kind) = coalesce(earlier.kind, event.kind) {
                    self.events.insert(
                        event.path.clone(),
                        ChangeEvent {
                            kind,
                            ..event
                        },
                    );
                }
            }
        }
    }

    /// Fold a later batch into this one.
    pub fn merge(&mut self, later: ChangeBatch) {
        for event in later.events.into_values() {
            self.push(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&ChangeEvent> {
        self.events.get(path.as_ref())
    }

    pub fn kind_of(&self, path: impl AsRef<Path>) -> Option<ChangeKind> {
        self.get(path).map(|e| e.kind)
    }

    /// Changed paths in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.events.keys().cloned().collect()
    }

    pub fn events(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.values()
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&ChangeEvent) -> bool,
    {
        self.events.retain(|_, e| keep(e));
    }
}

impl FromIterator<ChangeEvent> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = ChangeEvent>>(iter: I) -> Self {
        let mut batch = ChangeBatch::new();
        for event in iter {
            batch.push(event);
        }
        batch
    }
}
