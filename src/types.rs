use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Asset class a task produces.
///
/// The reload notifier uses this to decide between injecting stylesheets in
/// place (style-only changes) and asking clients for a full page reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Markup,
    Style,
    Script,
    Image,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Markup => "markup",
            AssetClass::Style => "style",
            AssetClass::Script => "script",
            AssetClass::Image => "image",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markup" | "html" => Ok(AssetClass::Markup),
            "style" | "css" => Ok(AssetClass::Style),
            "script" | "js" => Ok(AssetClass::Script),
            "image" | "img" => Ok(AssetClass::Image),
            other => Err(format!(
                "invalid asset class: {other} \
                 (expected \"markup\", \"style\", \"script\" or \"image\")"
            )),
        }
    }
}

/// Where `lastRun` markers are kept between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastRunStorage {
    /// Store markers in `.assetdag/last-run.json` under the project root.
    /// The file is advisory: losing it only forces extra work.
    File,
    /// Keep markers in memory for the lifetime of the process.
    Memory,
}

impl Default for LastRunStorage {
    fn default() -> Self {
        LastRunStorage::Memory
    }
}

/// How a task's `destination` should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// A path with an extension is a file, anything else a directory.
    Auto,
    Dir,
    File,
}

impl Default for DestinationKind {
    fn default() -> Self {
        DestinationKind::Auto
    }
}
