// src/reload/mod.rs

//! Live-preview notifications.
//!
//! After a build run the orchestrator derives a [`ReloadMessage`] from the
//! tasks that succeeded and hands it to the [`ReloadNotifier`], which fans it
//! out to every connected preview session. In watch mode a
//! [`PreviewServer`] can also serve the output tree with the client script
//! added to every page.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::build::BuildRun;
use crate::dag::TaskGraph;
use crate::types::AssetClass;

pub mod notifier;
pub mod preview;
pub mod websocket;

pub use notifier::{PreviewSession, ReloadNotifier};
pub use preview::{PreviewServer, inject_client_script};
pub use websocket::{ReloadServer, WsSession, client_script};

/// What changed in the output tree, as far as a browser is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadMessage {
    pub asset_classes: BTreeSet<AssetClass>,
    /// `false` only when every changed class is a stylesheet, which clients
    /// can swap in place.
    pub full_reload: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "assetClasses")]
    asset_classes: &'a BTreeSet<AssetClass>,
    #[serde(rename = "fullReload")]
    full_reload: bool,
}

impl ReloadMessage {
    pub fn new(asset_classes: impl IntoIterator<Item = AssetClass>) -> Self {
        let asset_classes: BTreeSet<AssetClass> = asset_classes.into_iter().collect();
        let full_reload = asset_classes.iter().any(|c| *c != AssetClass::Style);
        Self {
            asset_classes,
            full_reload,
        }
    }

    /// Message for the tasks that succeeded in `run`, or `None` if none did.
    pub fn from_run(graph: &TaskGraph, run: &BuildRun) -> Option<Self> {
        let classes: BTreeSet<AssetClass> = run
            .tasks_completed
            .iter()
            .filter_map(|name| graph.get(name))
            .map(|task| task.class)
            .collect();

        if classes.is_empty() {
            None
        } else {
            Some(Self::new(classes))
        }
    }

    /// `{"type":"reload","assetClasses":[...],"fullReload":bool}`
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&WireMessage {
            kind: "reload",
            asset_classes: &self.asset_classes,
            full_reload: self.full_reload,
        })
    }
}
