// src/reload/notifier.rs

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::build::BuildRun;
use crate::dag::TaskGraph;
use crate::reload::ReloadMessage;

/// One connected preview client.
pub trait PreviewSession: Send {
    /// Human-readable identifier for logs.
    fn describe(&self) -> String;

    fn send(&mut self, message: &ReloadMessage) -> anyhow::Result<()>;
}

/// Set of connected preview sessions. Clones share the same set.
///
/// Delivery is best-effort: a session whose send fails is dropped, and a
/// broadcast never reports an error to the caller. Sends are blocking, so
/// async callers should go through `spawn_blocking`.
#[derive(Clone, Default)]
pub struct ReloadNotifier {
    sessions: Arc<Mutex<Vec<Box<dyn PreviewSession>>>>,
}

impl std::fmt::Debug for ReloadNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadNotifier")
            .field("sessions", &self.session_count())
            .finish()
    }
}

impl ReloadNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, session: Box<dyn PreviewSession>) {
        info!(session = %session.describe(), "preview client connected");
        self.lock().push(session);
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// Broadcast the message derived from `run`, if any. Returns it together
    /// with the number of sessions that received it.
    pub fn notify(&self, graph: &TaskGraph, run: &BuildRun) -> Option<(ReloadMessage, usize)> {
        let Some(message) = ReloadMessage::from_run(graph, run) else {
            debug!(run_id = run.id, "no task succeeded; nothing to reload");
            return None;
        };
        let delivered = self.broadcast(&message);
        Some((message, delivered))
    }

    /// Send `message` to every session and prune the ones that fail.
    /// Returns how many sessions received it.
    pub fn broadcast(&self, message: &ReloadMessage) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();

        sessions.retain_mut(|session| match session.send(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(session = %session.describe(), error = %err, "dropping preview client");
                false
            }
        });

        let delivered = sessions.len();
        info!(
            classes = ?message.asset_classes,
            full_reload = message.full_reload,
            delivered,
            pruned = before - delivered,
            "reload broadcast"
        );
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn PreviewSession>>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }
}
